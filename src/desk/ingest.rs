use std::sync::{Arc, Mutex};

use color_eyre::Result;
use eyre::eyre;
use serde_json::Value;
use uuid::Uuid;

use super::{
    bridge::{AccessoryBridge, AccessoryRequest, BridgeRequest},
    facade::AccessoryFacade,
    identity::{IdentityResolver, Outcome},
    packet::{IntroductionPacket, Packet},
    session::{Applied, SessionState},
};
use crate::{protocols::http::HyperHttpClient, settings::DeviceSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

enum Phase<B> {
    /// Waiting for the introduction ping.
    Discovering,
    Streaming(AccessoryFacade<B>),
    /// The desk asked us to hang up. Terminal.
    Closed,
}

/// Folds the events of one stream connection into a [`SessionState`] and
/// pushes the results through the accessory facade once the desk has
/// introduced itself.
pub struct StreamIngestor<B> {
    device: DeviceSettings,
    resolver: Arc<Mutex<IdentityResolver>>,
    bridge: Arc<B>,
    http_client: HyperHttpClient,
    debug: bool,
    session: SessionState,
    phase: Phase<B>,
    bound: Option<Uuid>,
}

impl<B> StreamIngestor<B> {
    #[cfg(test)]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn accessory(&self) -> Option<Uuid> {
        self.bound
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, Phase::Closed)
    }

    fn release(&mut self) {
        let Some(uuid) = self.bound.take() else {
            return;
        };

        match self.resolver.lock() {
            Ok(mut resolver) => {
                resolver.release(&uuid);
            }
            Err(_) => log::error!("Identity resolver lock poisoned, {} stays bound", uuid),
        }
    }
}

impl<B> Drop for StreamIngestor<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: AccessoryBridge> StreamIngestor<B> {
    pub fn new(
        device: DeviceSettings,
        resolver: Arc<Mutex<IdentityResolver>>,
        bridge: Arc<B>,
        http_client: HyperHttpClient,
        debug: bool,
    ) -> StreamIngestor<B> {
        StreamIngestor {
            device,
            resolver,
            bridge,
            http_client,
            debug,
            session: SessionState::default(),
            phase: Phase::Discovering,
            bound: None,
        }
    }

    #[cfg(test)]
    pub fn facade(&self) -> Option<&AccessoryFacade<B>> {
        match &self.phase {
            Phase::Streaming(facade) => Some(facade),
            _ => None,
        }
    }

    /// Handles one named event. Nothing here is fatal to the connection
    /// except an empty `ping`, which closes it for good.
    pub async fn handle_event(&mut self, event_type: &str, data: &str) -> Flow {
        if self.is_closed() {
            return Flow::Close;
        }

        match event_type {
            "ping" if data.is_empty() => {
                log::debug!("Empty ping, teardown for {}", self.device.host);
                self.close().await;
                return Flow::Close;
            }
            "ping" => self.handle_ping(data).await,
            "state" => self.handle_state(data).await,
            "log" => self.handle_log(data).await,
            other => log::debug!("Ignoring {:?} event from {}", other, self.device.host),
        }

        Flow::Continue
    }

    /// Ends the connection. The accessory goes out one last time with
    /// `connected: false` and its identity binding is released.
    pub async fn close(&mut self) {
        if let Phase::Streaming(mut facade) = std::mem::replace(&mut self.phase, Phase::Closed) {
            self.session.mark_disconnected();
            if let Err(e) = facade.publish(&self.session).await {
                log::error!("{:?}", e);
            }
        }

        self.release();
    }

    pub async fn handle_request(&mut self, request: &BridgeRequest) {
        let Phase::Streaming(facade) = &mut self.phase else {
            return;
        };

        if request.accessory != facade.identity().uuid {
            return;
        }

        let result = match &request.request {
            AccessoryRequest::SetTargetPosition { value } => {
                facade.set_target_position(*value);
                Ok(())
            }
            AccessoryRequest::SetPreset { preset, on } => facade.set_preset(*preset, *on).await,
            AccessoryRequest::Refresh => facade.refresh(&self.session).await,
        };

        if let Err(e) = result {
            log::error!("Failed to handle {:?}: {:?}", request.request, e);
        }
    }

    async fn handle_ping(&mut self, data: &str) {
        match self.phase {
            Phase::Discovering => self.discover(data).await,
            Phase::Streaming(_) => {
                self.session.mark_connected();
                self.publish().await;
            }
            Phase::Closed => {}
        }
    }

    async fn discover(&mut self, data: &str) {
        let Some(value) = self.decode("ping", data) else {
            return;
        };

        let Packet::Introduction(intro) = Packet::classify(&value) else {
            log::error!("Unknown ping message from {}: {}", self.device.host, value);
            return;
        };

        log::debug!(
            "{} introduced itself as {} ({}, ota {}, lang {})",
            self.device.host,
            intro.title,
            intro.comment.as_deref().unwrap_or("no comment"),
            intro.ota,
            intro.lang
        );

        if let Err(e) = self.bind(intro).await {
            log::error!("Failed to set up accessory for {}: {:?}", self.device.host, e);
            self.release();
        }
    }

    async fn bind(&mut self, intro: IntroductionPacket) -> Result<()> {
        let resolution = {
            let mut resolver = self
                .resolver
                .lock()
                .map_err(|_| eyre!("Identity resolver lock poisoned"))?;
            resolver.resolve(&intro, &self.device)?
        };
        self.bound = Some(resolution.identity.uuid);

        let handle = &resolution.handle;
        let registration = match resolution.outcome {
            Outcome::Created => {
                log::info!(
                    "Adding new accessory: {} {} ({})",
                    handle.display_name,
                    handle.uuid,
                    resolution.identity.unique_id
                );
                self.bridge.register_accessory(handle).await
            }
            Outcome::Repaired => {
                log::info!("Repairing cached accessory: {} {}", handle.display_name, handle.uuid);
                self.bridge.update_accessory(handle).await
            }
            Outcome::Restored => {
                log::info!(
                    "Restoring existing accessory from cache: {} {}",
                    handle.display_name,
                    handle.uuid
                );
                if resolution.identity.events_url != self.device.events_url() {
                    log::warn!(
                        "Cached accessory {} expects events at {}, connected via {}",
                        handle.uuid,
                        resolution.identity.events_url,
                        self.device.events_url()
                    );
                }
                Ok(())
            }
        };

        if let Err(e) = registration {
            log::error!("Failed to persist accessory {}: {:?}", handle.uuid, e);
        }

        let facade = AccessoryFacade::new(
            resolution.identity,
            self.bridge.clone(),
            self.http_client.clone(),
        )?;

        if let Err(e) = facade.publish_presets().await {
            log::error!("{:?}", e);
        }

        self.session.mark_connected();
        self.phase = Phase::Streaming(facade);
        self.publish().await;

        Ok(())
    }

    async fn handle_state(&mut self, data: &str) {
        if !matches!(self.phase, Phase::Streaming(_)) {
            log::debug!("Dropping state event from {} while discovering", self.device.host);
            return;
        }

        let Some(value) = self.decode("state", data) else {
            return;
        };

        if self.debug {
            log::debug!("STATE: {}", value);
        }

        let applied = match Packet::classify_state(&value) {
            Packet::Number(number) => {
                log::trace!("{} = {} ({})", number.id, number.value, number.state);
                let applied = self.session.apply_number(&number);
                if applied == Applied::Unhandled {
                    log::warn!("Unhandled number: {:?}", number);
                }
                applied
            }
            Packet::Sensor(sensor) => {
                log::trace!(
                    "{} ({}) = {} ({})",
                    sensor.id,
                    sensor.name.as_deref().unwrap_or("unnamed"),
                    sensor.value,
                    sensor.state.as_deref().unwrap_or("no state")
                );
                self.session.apply_sensor(&sensor)
            }
            Packet::Button(button) => {
                log::trace!("Button {} {:?}", button.id, button.name);
                Applied::Ignored
            }
            Packet::Select(select) => {
                log::trace!("Select {} {:?}", select.id, select.name);
                Applied::Ignored
            }
            Packet::Introduction(_) | Packet::Unrecognized => {
                log::warn!("Unknown state packet: {}", value);
                Applied::Ignored
            }
        };

        if applied == Applied::Updated {
            self.publish().await;
        }
    }

    async fn handle_log(&mut self, data: &str) {
        if !matches!(self.phase, Phase::Streaming(_)) {
            log::debug!("Dropping log event from {} while discovering", self.device.host);
            return;
        }

        let Some(value) = self.decode("log", data) else {
            return;
        };

        self.session.mark_connected();
        log::debug!("LOG: {}", value);
        self.publish().await;
    }

    async fn publish(&mut self) {
        if let Phase::Streaming(facade) = &mut self.phase {
            if let Err(e) = facade.publish(&self.session).await {
                log::error!("{:?}", e);
            }
        }
    }

    fn decode(&self, event_type: &str, data: &str) -> Option<Value> {
        match serde_json::from_str(data) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(
                    "Dropping {} event from {} with invalid JSON ({}): {}",
                    event_type,
                    self.device.host,
                    e,
                    data
                );
                None
            }
        }
    }
}
