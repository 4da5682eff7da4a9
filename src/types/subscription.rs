//! Data request types: targets, delivery periods and subscriptions

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DefinitionId, RequestId};

/// Simulation object a request is issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The user's own aircraft (`SIMCONNECT_OBJECT_ID_USER`).
    pub const USER: ObjectId = ObjectId(0);
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ObjectId::USER { f.write_str("user") } else { write!(f, "object#{}", self.0) }
    }
}

/// Object type filter for radius-based single requests.
/// Maps to `SIMCONNECT_SIMOBJECT_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimObjectType {
    #[default]
    User,
    All,
    Aircraft,
    Helicopter,
    Boat,
    Ground,
}

impl SimObjectType {
    pub const fn wire_value(&self) -> u32 {
        match self {
            SimObjectType::User => 0,
            SimObjectType::All => 1,
            SimObjectType::Aircraft => 2,
            SimObjectType::Helicopter => 3,
            SimObjectType::Boat => 4,
            SimObjectType::Ground => 5,
        }
    }
}

/// How often the simulation pushes a continuous subscription.
/// Maps to `SIMCONNECT_PERIOD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Single response
    Once,
    /// Every rendered frame
    #[default]
    VisualFrame,
    /// Every simulation frame, whether rendered or not
    SimFrame,
    /// Once per second
    Second,
}

impl Period {
    pub const fn wire_value(&self) -> u32 {
        match self {
            Period::Once => 1,
            Period::VisualFrame => 2,
            Period::SimFrame => 3,
            Period::Second => 4,
        }
    }
}

/// Flags for continuous requests (`SIMCONNECT_DATA_REQUEST_FLAG`).
///
/// Tagged delivery changes the payload layout and is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RequestFlags {
    /// Only send a frame when the value changed since the last one.
    #[serde(default)]
    pub changed_only: bool,
}

impl RequestFlags {
    pub const fn wire_value(&self) -> u32 {
        if self.changed_only { 1 } else { 0 }
    }
}

/// Delivery model of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One response; the control loop re-issues the request on every poll tick.
    Poll {
        #[serde(default)]
        radius_meters: u32,
    },
    /// One response, never re-issued.
    Once {
        #[serde(default)]
        radius_meters: u32,
    },
    /// Pushed by the simulation every `period` until the connection closes.
    Continuous {
        #[serde(default)]
        period: Period,
        #[serde(default)]
        flags: RequestFlags,
    },
}

impl Default for DeliveryMode {
    fn default() -> Self {
        DeliveryMode::Continuous { period: Period::VisualFrame, flags: RequestFlags::default() }
    }
}

impl DeliveryMode {
    /// Whether the request has to be sent again to get the next sample.
    pub fn needs_polling(&self) -> bool {
        matches!(self, DeliveryMode::Poll { .. })
    }
}

/// A data request bound to a definition and a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub request: RequestId,
    pub definition: DefinitionId,
    pub target: ObjectId,
    pub delivery: DeliveryMode,
}
