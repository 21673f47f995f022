use serde::Deserialize;

pub const DEFAULT_PRESET_COUNT: u8 = 4;
const DEFAULT_CACHE_PATH: &str = "accessories.json";
/// Seconds before a dropped desk stream is reopened.
pub const DEFAULT_RETRY_AFTER: u64 = 1;

#[derive(Clone, Deserialize, Debug)]
pub struct DeviceSettings {
    pub host: String,
    pub display_name: Option<String>,
    pub retry_after: Option<u64>,
    pub presets: Option<u8>,
}

impl DeviceSettings {
    pub fn events_url(&self) -> String {
        format!("http://{}/events", self.host)
    }

    pub fn preset_count(&self) -> u8 {
        self.presets.unwrap_or(DEFAULT_PRESET_COUNT)
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct MqttSettings {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub state_topic: String,
    pub set_topic: String,
    pub config_topic: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Settings {
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
    pub retry_after: Option<u64>,
    pub debug: Option<bool>,
    pub cache_path: Option<String>,
}

impl Settings {
    /// Reconnect delay for a device in seconds. The device value wins over
    /// the global one.
    pub fn retry_after(&self, device: &DeviceSettings) -> u64 {
        device
            .retry_after
            .or(self.retry_after)
            .unwrap_or(DEFAULT_RETRY_AFTER)
    }

    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    pub fn cache_path(&self) -> &str {
        self.cache_path.as_deref().unwrap_or(DEFAULT_CACHE_PATH)
    }
}

pub fn read_settings() -> Result<Settings, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name("Settings"))
        .add_source(config::Environment::with_prefix("UPSY_DESK").separator("__"))
        .build()?
        .try_deserialize::<Settings>()
}
