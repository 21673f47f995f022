use std::sync::Arc;

use color_eyre::Result;
use eyre::eyre;
use hyper::Uri;
use thiserror::Error;

use super::{
    bridge::{AccessoryBridge, AccessoryState, AccessoryStateBuilder, PresetState},
    identity::DeviceIdentity,
    position::{PositionState, RangeError},
    session::SessionState,
};
use crate::protocols::http::{mk_post_request, HyperHttpClient};

const PRESET_PATH_PREFIX: &str = "/button/upsy_desky_preset_";
const PRESET_PATH_SUFFIX: &str = "/press";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeError {
    #[error("device unreachable: {0}")]
    Unreachable(#[from] RangeError),
}

/// Device path that triggers a stored preset, e.g. `/button/upsy_desky_preset_02/press`.
pub fn preset_uri(host: &str, preset: u8) -> Result<Uri> {
    let uri = format!(
        "http://{}{}{:02}{}",
        host, PRESET_PATH_PREFIX, preset, PRESET_PATH_SUFFIX
    );

    uri.parse()
        .map_err(|e| eyre!("Invalid preset URI {}: {}", uri, e))
}

/// Translates session state into accessory characteristics for the bridge,
/// and bridge requests into device actions.
pub struct AccessoryFacade<B> {
    identity: DeviceIdentity,
    bridge: Arc<B>,
    http_client: HyperHttpClient,
    published: AccessoryState,
}

impl<B: AccessoryBridge> AccessoryFacade<B> {
    pub fn new(
        identity: DeviceIdentity,
        bridge: Arc<B>,
        http_client: HyperHttpClient,
    ) -> Result<AccessoryFacade<B>> {
        let published = AccessoryStateBuilder::default()
            .id(identity.uuid.to_string())
            .name(identity.display_name.clone())
            .build()?;

        Ok(AccessoryFacade {
            identity,
            bridge,
            http_client,
            published,
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn get_current_position(&self, session: &SessionState) -> Result<u8, FacadeError> {
        let position = session.current_position()?;
        log::debug!("Get CurrentPosition -> {}", position);
        Ok(position)
    }

    pub fn get_target_position(&self, session: &SessionState) -> Result<u8, FacadeError> {
        let position = session.target_position()?;
        log::debug!("Get TargetPosition -> {}", position);
        Ok(position)
    }

    pub fn get_position_state(&self, session: &SessionState) -> PositionState {
        session.position_state()
    }

    pub fn set_target_position(&self, value: f64) {
        // Only logged, the firmware exposes no set-point endpoint.
        log::info!(
            "Set TargetPosition -> {} for {} (not sent to the desk)",
            value,
            self.identity.display_name
        );
    }

    /// Preset switches are momentary and their state never shows up on the
    /// event stream, so they always read as off.
    pub fn get_preset(&self, preset: u8) -> Result<bool> {
        self.check_preset(preset)?;
        log::debug!("Preset get -> {}", preset);
        Ok(false)
    }

    pub async fn set_preset(&self, preset: u8, on: bool) -> Result<()> {
        self.check_preset(preset)?;

        self.bridge
            .publish_preset(&self.preset_state(preset, on))
            .await?;

        if !on {
            return Ok(());
        }

        log::info!("Preset {} pressed on {}", preset, self.identity.display_name);

        let uri = preset_uri(&self.identity.host, preset)?;
        let bridge = self.bridge.clone();
        let http_client = self.http_client.clone();
        let off = self.preset_state(preset, false);

        tokio::spawn(async move {
            if let Err(e) = mk_post_request(&http_client, &uri).await {
                log::error!("Failed to trigger preset {}: {:?}", off.preset, e);
            }

            if let Err(e) = bridge.publish_preset(&off).await {
                log::error!("{:?}", e);
            }
        });

        Ok(())
    }

    /// Announces every preset switch as off.
    pub async fn publish_presets(&self) -> Result<()> {
        for preset in 1..=self.identity.preset_count {
            let on = self.get_preset(preset)?;
            self.bridge
                .publish_preset(&self.preset_state(preset, on))
                .await?;
        }

        Ok(())
    }

    /// Pushes characteristics that changed since the last push. Positions
    /// that can't be computed keep their previous value.
    pub async fn publish(&mut self, session: &SessionState) -> Result<()> {
        let next = self.next_state(session);

        if next == self.published {
            return Ok(());
        }

        self.push(next, session).await
    }

    /// Pushes every characteristic regardless of what was last sent.
    pub async fn refresh(&mut self, session: &SessionState) -> Result<()> {
        let next = self.next_state(session);
        self.push(next, session).await
    }

    fn next_state(&self, session: &SessionState) -> AccessoryState {
        let mut next = self.published.clone();
        next.connected = session.connected();

        match self.get_current_position(session) {
            Ok(position) => next.current_position = Some(position),
            Err(e) => log::debug!("Not publishing current position: {}", e),
        }

        match self.get_target_position(session) {
            Ok(position) => next.target_position = Some(position),
            Err(e) => log::debug!("Not publishing target position: {}", e),
        }

        next.position_state = Some(self.get_position_state(session));

        next
    }

    async fn push(&mut self, next: AccessoryState, session: &SessionState) -> Result<()> {
        self.bridge.publish_state(&next).await?;

        log::debug!(
            "Characteristics {:?} {:?} {:?}",
            next.current_position,
            next.target_position,
            next.position_state
        );
        log::debug!(
            "Internals connected={} current={} target={} max={} min={} step={}",
            session.connected(),
            session.current_height(),
            session.target_height(),
            session.max_height(),
            session.min_height(),
            session.height_step()
        );

        self.published = next;
        Ok(())
    }

    fn check_preset(&self, preset: u8) -> Result<()> {
        if preset == 0 || preset > self.identity.preset_count {
            return Err(eyre!(
                "{} has no preset {} (presets 1-{})",
                self.identity.display_name,
                preset,
                self.identity.preset_count
            ));
        }

        Ok(())
    }

    fn preset_state(&self, preset: u8, on: bool) -> PresetState {
        PresetState {
            accessory: self.identity.uuid,
            preset,
            on,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        desk::{
            bridge::test_support::{Recorded, RecordingBridge},
            packet::{NumberPacket, SensorPacket},
            session::{CURRENT_HEIGHT_SENSOR, TARGET_HEIGHT_NUMBER},
        },
        protocols::http::mk_hyper_http_client,
    };

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            uuid: Uuid::nil(),
            unique_id: "upsy-desky-4f2a10".to_string(),
            display_name: "Office desk".to_string(),
            host: "10.0.0.5".to_string(),
            events_url: "http://10.0.0.5/events".to_string(),
            preset_count: 4,
        }
    }

    fn facade(bridge: &Arc<RecordingBridge>) -> AccessoryFacade<RecordingBridge> {
        AccessoryFacade::new(identity(), bridge.clone(), mk_hyper_http_client()).unwrap()
    }

    fn session(current: f64, target: f64, min: f64, max: f64) -> SessionState {
        let mut session = SessionState::default();
        session.apply_sensor(&SensorPacket {
            id: CURRENT_HEIGHT_SENSOR.to_string(),
            name: None,
            value: current,
            state: None,
        });
        session.apply_number(&NumberPacket {
            id: TARGET_HEIGHT_NUMBER.to_string(),
            value: target,
            state: "ok".to_string(),
            min_value: Some(min),
            max_value: Some(max),
            step: None,
        });
        session
    }

    #[test]
    fn preset_uri_is_zero_padded() {
        assert_eq!(
            preset_uri("10.0.0.5", 2).unwrap().to_string(),
            "http://10.0.0.5/button/upsy_desky_preset_02/press"
        );
        assert_eq!(
            preset_uri("desk.local:8080", 12).unwrap().to_string(),
            "http://desk.local:8080/button/upsy_desky_preset_12/press"
        );
    }

    #[tokio::test]
    async fn positions_clamp_to_range() {
        let bridge = Arc::new(RecordingBridge::default());
        let facade = facade(&bridge);

        assert_eq!(facade.get_current_position(&session(5.0, 50.0, 10.0, 90.0)), Ok(0));
        assert_eq!(facade.get_current_position(&session(95.0, 50.0, 10.0, 90.0)), Ok(100));
        assert_eq!(facade.get_target_position(&session(5.0, 50.0, 10.0, 90.0)), Ok(50));
    }

    #[tokio::test]
    async fn uncalibrated_range_is_unreachable() {
        let bridge = Arc::new(RecordingBridge::default());
        let facade = facade(&bridge);

        assert_eq!(
            facade.get_current_position(&session(50.0, 50.0, 0.0, 0.0)),
            Err(FacadeError::Unreachable(RangeError::Uncalibrated))
        );
    }

    #[tokio::test]
    async fn position_state_is_derived_from_heights() {
        let bridge = Arc::new(RecordingBridge::default());
        let facade = facade(&bridge);

        assert_eq!(
            facade.get_position_state(&session(20.0, 60.0, 10.0, 90.0)),
            PositionState::Increasing
        );
        assert_eq!(
            facade.get_position_state(&session(80.0, 60.0, 10.0, 90.0)),
            PositionState::Decreasing
        );
        assert_eq!(
            facade.get_position_state(&session(60.0, 60.0, 10.0, 90.0)),
            PositionState::Stopped
        );
    }

    #[tokio::test]
    async fn publishes_only_on_change() {
        let bridge = Arc::new(RecordingBridge::default());
        let mut facade = facade(&bridge);
        let state = session(50.0, 50.0, 10.0, 90.0);

        facade.publish(&state).await.unwrap();
        facade.publish(&state).await.unwrap();

        let states = bridge.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].current_position, Some(50));
        assert_eq!(states[0].target_position, Some(50));
        assert_eq!(states[0].position_state, Some(PositionState::Stopped));
        assert!(states[0].connected);

        facade.refresh(&state).await.unwrap();
        assert_eq!(bridge.states().len(), 2);
    }

    #[tokio::test]
    async fn invalid_positions_are_never_pushed() {
        let bridge = Arc::new(RecordingBridge::default());
        let mut facade = facade(&bridge);

        facade.publish(&session(50.0, 60.0, 0.0, 0.0)).await.unwrap();
        let states = bridge.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].current_position, None);
        assert_eq!(states[0].target_position, None);

        // A later broken range keeps the last good values.
        facade.publish(&session(50.0, 50.0, 10.0, 90.0)).await.unwrap();
        facade.publish(&session(70.0, 50.0, 95.0, 90.0)).await.unwrap();
        let last = bridge.states().pop().unwrap();
        assert_eq!(last.current_position, Some(50));
        assert_eq!(last.target_position, Some(50));
        assert_eq!(last.position_state, Some(PositionState::Decreasing));
    }

    #[tokio::test]
    async fn presets_read_off_and_reject_unknown_index() {
        let bridge = Arc::new(RecordingBridge::default());
        let facade = facade(&bridge);

        assert!(!facade.get_preset(1).unwrap());
        assert!(facade.get_preset(0).is_err());
        assert!(facade.get_preset(5).is_err());
        assert!(facade.set_preset(5, true).await.is_err());
    }

    #[tokio::test]
    async fn publish_presets_announces_all_off() {
        let bridge = Arc::new(RecordingBridge::default());
        let facade = facade(&bridge);

        facade.publish_presets().await.unwrap();

        let recorded = bridge.take();
        assert_eq!(recorded.len(), 4);
        assert_eq!(
            recorded[3],
            Recorded::Preset(PresetState {
                accessory: Uuid::nil(),
                preset: 4,
                on: false
            })
        );
    }

    #[tokio::test]
    async fn switching_preset_off_only_updates_display() {
        let bridge = Arc::new(RecordingBridge::default());
        let facade = facade(&bridge);

        facade.set_preset(3, false).await.unwrap();

        assert_eq!(
            bridge.take(),
            vec![Recorded::Preset(PresetState {
                accessory: Uuid::nil(),
                preset: 3,
                on: false
            })]
        );
    }
}
