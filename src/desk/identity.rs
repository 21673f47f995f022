use std::collections::{HashMap, HashSet};

use hyper::Uri;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::packet::IntroductionPacket;
use crate::settings::{DeviceSettings, DEFAULT_PRESET_COUNT};

pub const MANUFACTURER: &str = "TJHorner";
pub const MODEL: &str = "Upsy-Desk";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("accessory {0} is already bound to a live connection")]
    AlreadyBound(Uuid),

    #[error("invalid accessory context: {0}")]
    InvalidContext(String),
}

/// Stable accessory id. Derived from the firmware title only, so a desk
/// that moves to another address keeps its identity.
pub fn stable_id(title: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, title.as_bytes())
}

/// Persisted per-accessory context. Unknown keys are carried along untouched.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryContext {
    pub display_name: String,
    pub host: String,
    pub events_url: String,
    #[serde(rename = "uniqueID")]
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets: Option<u8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccessoryContext {
    pub fn validate(value: &Value) -> Result<AccessoryContext, ResolveError> {
        let context: AccessoryContext = serde_path_to_error::deserialize(value)
            .map_err(|e| ResolveError::InvalidContext(format!("{} at {}", e.inner(), e.path())))?;

        let events_url: Uri = context.events_url.parse().map_err(|e| {
            ResolveError::InvalidContext(format!("eventsUrl {:?}: {}", context.events_url, e))
        })?;

        if events_url.scheme().is_none() || events_url.authority().is_none() {
            return Err(ResolveError::InvalidContext(format!(
                "eventsUrl {:?} is not an absolute URL",
                context.events_url
            )));
        }

        Ok(context)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub uuid: Uuid,
    pub unique_id: String,
    pub display_name: String,
    pub host: String,
    pub events_url: String,
    pub preset_count: u8,
}

impl DeviceIdentity {
    fn from_context(uuid: Uuid, context: &AccessoryContext) -> DeviceIdentity {
        DeviceIdentity {
            uuid,
            unique_id: context.unique_id.clone(),
            display_name: context.display_name.clone(),
            host: context.host.clone(),
            events_url: context.events_url.clone(),
            preset_count: context.presets.unwrap_or(DEFAULT_PRESET_COUNT),
        }
    }
}

/// An accessory as the bridge runtime knows it, context possibly stale.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AccessoryHandle {
    pub uuid: Uuid,
    pub display_name: String,
    pub context: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Never seen before, must be registered with the bridge.
    Created,
    /// Known and its context is still valid.
    Restored,
    /// Known but its context failed validation and was rebuilt; must be persisted.
    Repaired,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub identity: DeviceIdentity,
    pub handle: AccessoryHandle,
    pub outcome: Outcome,
}

/// Id-indexed set of every accessory the bridge knows about. Also tracks
/// which of them currently have a facade on a live connection.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    accessories: HashMap<Uuid, AccessoryHandle>,
    bound: HashSet<Uuid>,
}

impl IdentityResolver {
    pub fn new(cached: impl IntoIterator<Item = AccessoryHandle>) -> IdentityResolver {
        let accessories = cached
            .into_iter()
            .map(|handle| (handle.uuid, handle))
            .collect();

        IdentityResolver {
            accessories,
            bound: HashSet::new(),
        }
    }

    pub fn resolve(
        &mut self,
        intro: &IntroductionPacket,
        device: &DeviceSettings,
    ) -> Result<Resolution, ResolveError> {
        let uuid = stable_id(&intro.title);

        if self.bound.contains(&uuid) {
            return Err(ResolveError::AlreadyBound(uuid));
        }

        let fresh = AccessoryContext {
            display_name: device
                .display_name
                .clone()
                .unwrap_or_else(|| intro.title.clone()),
            host: device.host.clone(),
            events_url: device.events_url(),
            unique_id: intro.title.clone(),
            presets: device.presets,
            extra: Map::new(),
        };
        let fresh_value = serde_json::to_value(&fresh)
            .map_err(|e| ResolveError::InvalidContext(e.to_string()))?;
        AccessoryContext::validate(&fresh_value)?;

        let (handle, outcome) = match self.accessories.get_mut(&uuid) {
            Some(existing) => match AccessoryContext::validate(&existing.context) {
                Ok(_) => (existing.clone(), Outcome::Restored),
                Err(e) => {
                    log::debug!("Cached accessory {} is invalid, updating: {}", uuid, e);
                    existing.context = fresh_value;
                    (existing.clone(), Outcome::Repaired)
                }
            },
            None => {
                let handle = AccessoryHandle {
                    uuid,
                    display_name: fresh.display_name.clone(),
                    context: fresh_value,
                };
                self.accessories.insert(uuid, handle.clone());
                (handle, Outcome::Created)
            }
        };

        let context = AccessoryContext::validate(&handle.context)?;
        let identity = DeviceIdentity::from_context(uuid, &context);

        self.bound.insert(uuid);

        Ok(Resolution {
            identity,
            handle,
            outcome,
        })
    }

    /// Frees the accessory for the next connection once its facade is gone.
    pub fn release(&mut self, uuid: &Uuid) -> bool {
        self.bound.remove(uuid)
    }

    #[cfg(test)]
    pub fn is_bound(&self, uuid: &Uuid) -> bool {
        self.bound.contains(uuid)
    }
}
