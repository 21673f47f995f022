use color_eyre::Result;
use es::Client;
use eventsource_client as es;
use eyre::eyre;
use futures::Stream;
use std::pin::Pin;

use crate::protocols::http::HyperHttpClient;

pub type EventSourceStream = dyn Stream<Item = Result<eventsource_client::SSE, eventsource_client::Error>>
    + std::marker::Send
    + std::marker::Sync;

pub type PinnedEventSourceStream = Pin<Box<EventSourceStream>>;

/// Opens a single connection to a desk's event stream. Reconnecting is left
/// to the caller so that one stream always means one connection.
pub fn mk_eventsource_stream(
    events_url: &str,
    client: &HyperHttpClient,
) -> Result<PinnedEventSourceStream> {
    let eventsource_client = es::ClientBuilder::for_url(events_url)
        .map_err(|e| {
            eyre!(
                "Failed to build event stream client for {}. Check your device host config. {:?}",
                events_url,
                e
            )
        })?
        .header("Accept", "text/event-stream")
        .map_err(|e| eyre!("Failed to set Accept header. {:?}", e))?
        .reconnect(es::ReconnectOptions::reconnect(false).build())
        .build_with_http_client(client.clone());

    Ok(eventsource_client.stream())
}
