use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use eventsource_client as es;
use futures::{Stream, StreamExt};
use rand::Rng;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{
    bridge::{AccessoryBridge, BridgeRequest},
    identity::IdentityResolver,
    ingest::{Flow, StreamIngestor},
};
use crate::{
    protocols::{eventsource::mk_eventsource_stream, http::HyperHttpClient},
    settings::{DeviceSettings, Settings},
};

/// How a connection ended, as far as the supervisor cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ended {
    /// The desk hung up or the stream failed. Open a new one.
    Reconnect,
    /// Nothing left to serve requests for, the process is going down.
    Shutdown,
}

/// Runs one desk: a connection at a time, each with a fresh session,
/// reopened after `retry_after` seconds until the bridge goes away.
pub fn start_desk_loop<B: AccessoryBridge>(
    settings: &Settings,
    device: &DeviceSettings,
    resolver: &Arc<Mutex<IdentityResolver>>,
    bridge: &Arc<B>,
    http_client: &HyperHttpClient,
    requests: &broadcast::Sender<BridgeRequest>,
) {
    let retry_after = settings.retry_after(device);
    let debug = settings.debug();
    let device = device.clone();
    let resolver = resolver.clone();
    let bridge = bridge.clone();
    let http_client = http_client.clone();
    let requests = requests.clone();

    tokio::spawn(async move {
        let events_url = device.events_url();

        loop {
            let eventsource_stream = match mk_eventsource_stream(&events_url, &http_client) {
                Ok(eventsource_stream) => eventsource_stream,
                Err(e) => {
                    log::error!("Giving up on {}: {:?}", device.host, e);
                    break;
                }
            };

            let ingestor = StreamIngestor::new(
                device.clone(),
                resolver.clone(),
                bridge.clone(),
                http_client.clone(),
                debug,
            );

            log::info!("Listening for events from {}", events_url);

            let ended =
                run_connection(ingestor, &device, eventsource_stream, requests.subscribe()).await;

            if ended == Ended::Shutdown {
                log::info!("Not reconnecting to {}, shutting down", device.host);
                break;
            }

            let delay = reconnect_delay(retry_after);
            log::info!("Reconnecting to {} in {:?}", device.host, delay);
            tokio::time::sleep(delay).await;
        }
    });
}

/// `retry_after` seconds plus up to a second of jitter.
fn reconnect_delay(retry_after: u64) -> Duration {
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
    Duration::from_secs(retry_after) + jitter
}

/// Drives one connection until it ends, then closes the ingestor.
pub async fn run_connection<B, S>(
    mut ingestor: StreamIngestor<B>,
    device: &DeviceSettings,
    mut eventsource_stream: S,
    mut requests: broadcast::Receiver<BridgeRequest>,
) -> Ended
where
    B: AccessoryBridge,
    S: Stream<Item = Result<es::SSE, es::Error>> + Unpin,
{
    let ended = loop {
        tokio::select! {
            e = eventsource_stream.next() => match e {
                Some(Ok(es::SSE::Event(e))) => {
                    let accessory = ingestor.accessory();
                    if ingestor.handle_event(&e.event_type, &e.data).await == Flow::Close {
                        log::info!(
                            "Desk at {} closed its event stream (accessory {:?})",
                            device.host,
                            accessory
                        );
                        break Ended::Reconnect;
                    }
                }
                Some(Ok(es::SSE::Comment(_))) => {}
                Some(Err(e)) => {
                    log::error!("Error while receiving events from {}: {:?}", device.host, e);
                    break Ended::Reconnect;
                }
                None => {
                    log::error!("End of event stream from {}", device.host);
                    break Ended::Reconnect;
                }
            },
            request = requests.recv() => match request {
                Ok(request) => ingestor.handle_request(&request).await,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Skipped {} bridge requests for {}", skipped, device.host);
                }
                Err(RecvError::Closed) => {
                    log::error!("Bridge request channel closed, dropping connection to {}", device.host);
                    break Ended::Shutdown;
                }
            },
        }
    };

    ingestor.close().await;
    ended
}
