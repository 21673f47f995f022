use super::{
    packet::{NumberPacket, SensorPacket},
    position::{calculate_position, position_state, PositionState, RangeError},
};

pub const CURRENT_HEIGHT_SENSOR: &str = "sensor-upsy_desky_desk_height";
pub const TARGET_HEIGHT_NUMBER: &str = "number-upsy_desky_target_desk_height";
pub const MAX_HEIGHT_NUMBER: &str = "number-upsy_desky_max_target_height";
pub const MIN_HEIGHT_NUMBER: &str = "number-upsy_desky_min_target_height";

/// Outcome of folding one packet into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The packet targeted a known role and was written to the session.
    Updated,
    /// A number packet with an id we don't know what to do with.
    Unhandled,
    /// Expected noise, nothing to do.
    Ignored,
}

/// Live per-connection view of the desk, built from partial `state` updates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionState {
    connected: bool,
    current_height: f64,
    target_height: f64,
    max_height: f64,
    min_height: f64,
    height_step: f64,
}

impl SessionState {
    pub fn apply_number(&mut self, packet: &NumberPacket) -> Applied {
        match packet.id.as_str() {
            TARGET_HEIGHT_NUMBER => {
                self.target_height = packet.value;
                if let Some(min_value) = packet.min_value {
                    self.min_height = min_value;
                }
                if let Some(max_value) = packet.max_value {
                    self.max_height = max_value;
                }
                if let Some(step) = packet.step {
                    self.height_step = step;
                }
            }
            MAX_HEIGHT_NUMBER => self.max_height = packet.value,
            MIN_HEIGHT_NUMBER => self.min_height = packet.value,
            _ => return Applied::Unhandled,
        }

        self.connected = true;
        Applied::Updated
    }

    pub fn apply_sensor(&mut self, packet: &SensorPacket) -> Applied {
        if packet.id != CURRENT_HEIGHT_SENSOR {
            return Applied::Ignored;
        }

        self.current_height = packet.value;
        self.connected = true;
        Applied::Updated
    }

    /// Liveness only: the desk said something, so it is reachable.
    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn current_height(&self) -> f64 {
        self.current_height
    }

    pub fn target_height(&self) -> f64 {
        self.target_height
    }

    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    pub fn min_height(&self) -> f64 {
        self.min_height
    }

    pub fn height_step(&self) -> f64 {
        self.height_step
    }

    pub fn current_position(&self) -> Result<u8, RangeError> {
        calculate_position(self.current_height, self.min_height, self.max_height)
    }

    pub fn target_position(&self) -> Result<u8, RangeError> {
        calculate_position(self.target_height, self.min_height, self.max_height)
    }

    pub fn position_state(&self) -> PositionState {
        position_state(self.current_height, self.target_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(id: &str, value: f64) -> NumberPacket {
        NumberPacket {
            id: id.to_string(),
            value,
            state: format!("{value} cm"),
            min_value: None,
            max_value: None,
            step: None,
        }
    }

    fn sensor(id: &str, value: f64) -> SensorPacket {
        SensorPacket {
            id: id.to_string(),
            name: None,
            value,
            state: None,
        }
    }

    #[test]
    fn starts_disconnected_and_zeroed() {
        let session = SessionState::default();
        assert!(!session.connected());
        assert_eq!(session.current_height(), 0.0);
        assert_eq!(session.current_position(), Err(RangeError::Uncalibrated));
    }

    #[test]
    fn target_number_carries_range() {
        let mut session = SessionState::default();
        let packet = NumberPacket {
            min_value: Some(10.0),
            max_value: Some(90.0),
            step: Some(0.5),
            ..number(TARGET_HEIGHT_NUMBER, 50.0)
        };

        assert_eq!(session.apply_number(&packet), Applied::Updated);
        assert!(session.connected());
        assert_eq!(session.target_height(), 50.0);
        assert_eq!(session.min_height(), 10.0);
        assert_eq!(session.max_height(), 90.0);
        assert_eq!(session.height_step(), 0.5);
        assert_eq!(session.target_position(), Ok(50));
    }

    #[test]
    fn target_number_without_range_keeps_bounds() {
        let mut session = SessionState::default();
        session.apply_number(&number(MIN_HEIGHT_NUMBER, 60.0));
        session.apply_number(&number(MAX_HEIGHT_NUMBER, 120.0));
        session.apply_number(&number(TARGET_HEIGHT_NUMBER, 90.0));

        assert_eq!(session.min_height(), 60.0);
        assert_eq!(session.max_height(), 120.0);
        assert_eq!(session.target_position(), Ok(50));
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let packet = NumberPacket {
            min_value: Some(10.0),
            max_value: Some(90.0),
            ..number(TARGET_HEIGHT_NUMBER, 50.0)
        };

        let mut once = SessionState::default();
        once.apply_number(&packet);

        let mut twice = once;
        twice.apply_number(&packet);

        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_number_is_unhandled() {
        let mut session = SessionState::default();
        assert_eq!(
            session.apply_number(&number("number-upsy_desky_preset_height", 80.0)),
            Applied::Unhandled
        );
        assert_eq!(session, SessionState::default());
    }

    #[test]
    fn height_sensor_sets_current_height() {
        let mut session = SessionState::default();
        assert_eq!(
            session.apply_sensor(&sensor(CURRENT_HEIGHT_SENSOR, 73.4)),
            Applied::Updated
        );
        assert_eq!(session.current_height(), 73.4);
        assert!(session.connected());
    }

    #[test]
    fn other_sensors_are_ignored() {
        let mut session = SessionState::default();
        assert_eq!(
            session.apply_sensor(&sensor("sensor-wifi_signal", -61.0)),
            Applied::Ignored
        );
        assert_eq!(session, SessionState::default());
    }

    #[test]
    fn position_state_compares_heights() {
        let mut session = SessionState::default();
        session.apply_sensor(&sensor(CURRENT_HEIGHT_SENSOR, 70.0));
        session.apply_number(&number(TARGET_HEIGHT_NUMBER, 100.0));
        assert_eq!(session.position_state(), PositionState::Increasing);

        session.apply_sensor(&sensor(CURRENT_HEIGHT_SENSOR, 100.0));
        assert_eq!(session.position_state(), PositionState::Stopped);
    }

    #[test]
    fn disconnect_keeps_heights() {
        let mut session = SessionState::default();
        session.apply_sensor(&sensor(CURRENT_HEIGHT_SENSOR, 70.0));

        session.mark_disconnected();

        assert!(!session.connected());
        assert_eq!(session.current_height(), 70.0);
    }
}
