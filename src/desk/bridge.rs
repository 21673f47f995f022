use async_trait::async_trait;
use color_eyre::Result;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{identity::AccessoryHandle, position::PositionState};

/// Outward view of one desk accessory. Position fields stay `None` until
/// the desk has reported a usable height range.
#[derive(Builder, Clone, Debug, Default, PartialEq, Serialize)]
#[builder(setter(into, strip_option), default)]
pub struct AccessoryState {
    pub id: String,
    pub name: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_position: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_state: Option<PositionState>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PresetState {
    #[serde(skip)]
    pub accessory: Uuid,
    #[serde(skip)]
    pub preset: u8,
    pub on: bool,
}

/// Requests the bridge runtime makes of an accessory.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AccessoryRequest {
    SetTargetPosition { value: f64 },
    SetPreset { preset: u8, on: bool },
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeRequest {
    pub accessory: Uuid,
    pub request: AccessoryRequest,
}

/// The smart-home side of the bridge: where accessories get registered and
/// where observed values get pushed.
#[async_trait]
pub trait AccessoryBridge: Send + Sync + 'static {
    /// Announce an accessory the runtime has never seen.
    async fn register_accessory(&self, handle: &AccessoryHandle) -> Result<()>;

    /// Persist a changed context for an accessory the runtime already knows.
    async fn update_accessory(&self, handle: &AccessoryHandle) -> Result<()>;

    async fn publish_state(&self, state: &AccessoryState) -> Result<()>;

    async fn publish_preset(&self, preset: &PresetState) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn requests_are_tagged_by_action() {
        let request: AccessoryRequest =
            serde_json::from_value(json!({ "action": "set_target_position", "value": 40 })).unwrap();
        assert_eq!(request, AccessoryRequest::SetTargetPosition { value: 40.0 });

        let request: AccessoryRequest =
            serde_json::from_value(json!({ "action": "set_preset", "preset": 2, "on": true })).unwrap();
        assert_eq!(request, AccessoryRequest::SetPreset { preset: 2, on: true });

        let request: AccessoryRequest = serde_json::from_value(json!({ "action": "refresh" })).unwrap();
        assert_eq!(request, AccessoryRequest::Refresh);
    }

    #[test]
    fn state_omits_unknown_positions() {
        let state = AccessoryStateBuilder::default()
            .id("b7e1")
            .name("Office desk")
            .connected(true)
            .build()
            .unwrap();

        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({ "id": "b7e1", "name": "Office desk", "connected": true })
        );
    }

    #[test]
    fn position_state_serializes_snake_case() {
        let state = AccessoryStateBuilder::default()
            .id("b7e1")
            .current_position(40u8)
            .position_state(PositionState::Increasing)
            .build()
            .unwrap();

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["position_state"], json!("increasing"));
        assert_eq!(value["current_position"], json!(40));
    }
}
