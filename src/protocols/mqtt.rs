use async_trait::async_trait;
use color_eyre::Result;
use eyre::eyre;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::{sync::broadcast, task};
use uuid::Uuid;

use crate::{
    cache::AccessoryCache,
    desk::{
        bridge::{AccessoryBridge, AccessoryRequest, AccessoryState, BridgeRequest, PresetState},
        identity::{AccessoryHandle, MANUFACTURER, MODEL},
    },
    settings::{MqttSettings, Settings},
};

#[derive(Clone)]
pub struct MqttClient {
    pub client: AsyncClient,
    pub requests: broadcast::Sender<BridgeRequest>,
}

pub fn mk_mqtt_client(settings: &Settings) -> MqttClient {
    let mut options = MqttOptions::new(
        settings.mqtt.id.clone(),
        settings.mqtt.host.clone(),
        settings.mqtt.port,
    );
    options.set_keep_alive(Duration::from_secs(5));
    let (client, mut eventloop) = AsyncClient::new(options, 10);

    let (requests, _) = broadcast::channel(16);

    {
        let client = client.clone();
        let requests = requests.clone();
        let set_topic = settings.mqtt.set_topic.clone();

        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => {
                        let result =
                            handle_incoming_mqtt_event(event, &client, &set_topic, &requests).await;

                        if let Err(e) = result {
                            log::error!("Error while processing MQTT message: {:?}", e);
                        }
                    }
                    Err(e) => {
                        log::error!("MQTT connection error, retrying in 5 seconds: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });
    }

    MqttClient { client, requests }
}

async fn handle_incoming_mqtt_event(
    event: rumqttc::Event,
    client: &AsyncClient,
    set_topic: &str,
    requests: &broadcast::Sender<BridgeRequest>,
) -> Result<()> {
    match event {
        rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
            // Only the poll loop drains the request queue, so never wait on it from here
            let client = client.clone();
            let topic = set_topic.replace("{id}", "+");

            task::spawn(async move {
                if let Err(e) = client.subscribe(&topic, QoS::AtMostOnce).await {
                    log::error!("Failed to subscribe to {}: {:?}", topic, e);
                }
            });
        }
        rumqttc::Event::Incoming(rumqttc::Packet::Publish(msg)) => {
            let id = topic_id(set_topic, &msg.topic)
                .ok_or_else(|| eyre!("Unexpected topic {}", msg.topic))?;
            let accessory = Uuid::parse_str(id)?;

            let de = &mut serde_json::Deserializer::from_slice(&msg.payload);
            let request: AccessoryRequest = serde_path_to_error::deserialize(de)?;

            if requests.send(BridgeRequest { accessory, request }).is_err() {
                log::warn!("Dropping request for {}, no desk is connected", accessory);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Pulls the `{id}` part back out of a topic built from `template`.
fn topic_id<'a>(template: &str, topic: &'a str) -> Option<&'a str> {
    let (prefix, suffix) = template.split_once("{id}")?;
    let id = topic.strip_prefix(prefix)?.strip_suffix(suffix)?;

    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(id)
    }
}

#[derive(Serialize, Debug)]
struct AccessoryRegistration<'a> {
    id: &'a Uuid,
    name: &'a str,
    manufacturer: &'a str,
    model: &'a str,
    serial_number: Option<&'a str>,
    context: &'a Value,
}

/// Exposes desk accessories as retained MQTT documents and keeps the
/// accessory cache on disk in step with what has been registered.
pub struct MqttBridge {
    mqtt_client: MqttClient,
    settings: MqttSettings,
    cache: AccessoryCache,
}

impl MqttBridge {
    pub fn new(settings: &Settings, mqtt_client: &MqttClient, cache: AccessoryCache) -> MqttBridge {
        MqttBridge {
            mqtt_client: mqtt_client.clone(),
            settings: settings.mqtt.clone(),
            cache,
        }
    }

    async fn publish<T: Serialize>(&self, topic: String, payload: &T) -> Result<()> {
        let json = serde_json::to_string(payload)?;

        self.mqtt_client
            .client
            .publish(topic, QoS::AtLeastOnce, true, json)
            .await?;

        Ok(())
    }

    async fn publish_accessory(&self, handle: &AccessoryHandle) -> Result<()> {
        let registration = AccessoryRegistration {
            id: &handle.uuid,
            name: &handle.display_name,
            manufacturer: MANUFACTURER,
            model: MODEL,
            serial_number: handle.context.get("uniqueID").and_then(Value::as_str),
            context: &handle.context,
        };

        let topic = self
            .settings
            .config_topic
            .replace("{id}", &handle.uuid.to_string());

        self.publish(topic, &registration).await?;
        self.cache.upsert(handle).await
    }
}

#[async_trait]
impl AccessoryBridge for MqttBridge {
    async fn register_accessory(&self, handle: &AccessoryHandle) -> Result<()> {
        self.publish_accessory(handle).await
    }

    async fn update_accessory(&self, handle: &AccessoryHandle) -> Result<()> {
        self.publish_accessory(handle).await
    }

    async fn publish_state(&self, state: &AccessoryState) -> Result<()> {
        let topic = self.settings.state_topic.replace("{id}", &state.id);
        self.publish(topic, state).await
    }

    async fn publish_preset(&self, preset: &PresetState) -> Result<()> {
        let topic = format!(
            "{}/preset/{}",
            self.settings
                .state_topic
                .replace("{id}", &preset.accessory.to_string()),
            preset.preset
        );
        self.publish(topic, preset).await
    }
}
