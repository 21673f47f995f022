use std::sync::{Arc, Mutex};

use cache::AccessoryCache;
use color_eyre::Result;
use desk::{device::start_desk_loop, identity::IdentityResolver};
use protocols::http::mk_hyper_http_client;
use protocols::mqtt::{mk_mqtt_client, MqttBridge};

use crate::settings::read_settings;

mod cache;
mod desk;
mod protocols;
mod settings;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let settings = read_settings()?;

    if settings.devices.is_empty() {
        log::error!(
            "You did not specify a devices array and discovery is unsupported! \
             No desk accessories will be provided"
        );
    }

    let cache = AccessoryCache::load(settings.cache_path()).await?;
    let cached = cache.accessories().await;
    for handle in &cached {
        log::info!("Loading accessory from cache: {}", handle.display_name);
    }

    let resolver = Arc::new(Mutex::new(IdentityResolver::new(cached)));
    let mqtt_client = mk_mqtt_client(&settings);
    let http_client = mk_hyper_http_client();
    let bridge = Arc::new(MqttBridge::new(&settings, &mqtt_client, cache));

    for device in &settings.devices {
        start_desk_loop(
            &settings,
            device,
            &resolver,
            &bridge,
            &http_client,
            &mqtt_client.requests,
        );
    }

    tokio::signal::ctrl_c().await?;

    Ok(())
}
