use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

/// Every Upsy Desky firmware introduces itself with a title starting with this.
pub const DEVICE_FAMILY_PREFIX: &str = "upsy";

const NUMBER_PREFIX: &str = "number-";
const SENSOR_PREFIX: &str = "sensor-";
const BUTTON_PREFIX: &str = "button-";
const SELECT_PREFIX: &str = "select-";

/// First `ping` payload of a fresh stream, describing the firmware.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IntroductionPacket {
    pub title: String,
    pub comment: Option<String>,
    pub ota: bool,
    pub lang: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NumberPacket {
    pub id: String,
    pub value: f64,
    pub state: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub step: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SensorPacket {
    pub id: String,
    pub name: Option<String>,
    pub value: f64,
    pub state: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ButtonPacket {
    pub id: String,
    pub name: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SelectPacket {
    pub id: String,
    pub name: Option<f64>,
}

/// Structural constraints serde can't express on its own.
trait Shape: DeserializeOwned {
    const NAME: &'static str;

    fn accepts(&self) -> bool;
}

impl Shape for IntroductionPacket {
    const NAME: &'static str = "introduction";

    fn accepts(&self) -> bool {
        self.title.starts_with(DEVICE_FAMILY_PREFIX)
    }
}

impl Shape for NumberPacket {
    const NAME: &'static str = "number";

    fn accepts(&self) -> bool {
        self.id.starts_with(NUMBER_PREFIX)
    }
}

impl Shape for SensorPacket {
    const NAME: &'static str = "sensor";

    fn accepts(&self) -> bool {
        self.id.starts_with(SENSOR_PREFIX)
    }
}

impl Shape for ButtonPacket {
    const NAME: &'static str = "button";

    fn accepts(&self) -> bool {
        self.id.starts_with(BUTTON_PREFIX)
    }
}

impl Shape for SelectPacket {
    const NAME: &'static str = "select";

    fn accepts(&self) -> bool {
        self.id.starts_with(SELECT_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Introduction(IntroductionPacket),
    Number(NumberPacket),
    Sensor(SensorPacket),
    Button(ButtonPacket),
    Select(SelectPacket),
    Unrecognized,
}

fn try_shape<T: Shape>(value: &Value) -> Option<T> {
    match serde_path_to_error::deserialize::<_, T>(value) {
        Ok(packet) if packet.accepts() => Some(packet),
        Ok(_) => {
            log::trace!("Payload has the fields of a {} packet but the wrong prefix", T::NAME);
            None
        }
        Err(e) => {
            log::trace!("Payload is not a {} packet: {} at {}", T::NAME, e.inner(), e.path());
            None
        }
    }
}

impl Packet {
    /// Matches a decoded payload against every known shape, in priority order.
    pub fn classify(value: &Value) -> Packet {
        if let Some(packet) = try_shape(value) {
            return Packet::Introduction(packet);
        }

        Packet::classify_state(value)
    }

    /// Same as [`Packet::classify`] but without the introduction shape, for `state` events.
    pub fn classify_state(value: &Value) -> Packet {
        if let Some(packet) = try_shape(value) {
            return Packet::Number(packet);
        }
        if let Some(packet) = try_shape(value) {
            return Packet::Sensor(packet);
        }
        if let Some(packet) = try_shape(value) {
            return Packet::Button(packet);
        }
        if let Some(packet) = try_shape(value) {
            return Packet::Select(packet);
        }

        Packet::Unrecognized
    }
}
