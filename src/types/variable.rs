//! Simulation variable definitions

use serde::{Deserialize, Serialize};

use super::DefinitionId;

/// Datum types a variable can be registered with.
/// Maps to the protocol's `SIMCONNECT_DATATYPE` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 32-bit signed integer (`SIMCONNECT_DATATYPE_INT32`)
    Int32,
    /// 64-bit signed integer (`SIMCONNECT_DATATYPE_INT64`)
    Int64,
    /// 32-bit float (`SIMCONNECT_DATATYPE_FLOAT32`)
    Float32,
    /// 64-bit float (`SIMCONNECT_DATATYPE_FLOAT64`)
    #[default]
    Float64,
}

impl DataType {
    /// Size of one datum on the wire.
    pub const fn size(&self) -> usize {
        match self {
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// Protocol enum value passed to `AddToDataDefinition`.
    pub const fn wire_value(&self) -> u32 {
        match self {
            DataType::Int32 => 1,
            DataType::Int64 => 2,
            DataType::Float32 => 3,
            DataType::Float64 => 4,
        }
    }

    /// Decode one little-endian datum into an `f64`.
    ///
    /// `bytes` must be exactly [`size`](Self::size) long.
    pub(crate) fn read_f64(&self, bytes: &[u8]) -> Option<f64> {
        let value = match self {
            DataType::Int32 => i32::from_le_bytes(bytes.try_into().ok()?) as f64,
            DataType::Int64 => i64::from_le_bytes(bytes.try_into().ok()?) as f64,
            DataType::Float32 => f32::from_le_bytes(bytes.try_into().ok()?) as f64,
            DataType::Float64 => f64::from_le_bytes(bytes.try_into().ok()?),
        };
        Some(value)
    }
}

/// A registered variable: name and unit bound to a definition id.
///
/// Created once per registration and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub definition: DefinitionId,
    /// Protocol variable name, e.g. `COM STANDBY FREQUENCY:1`
    pub name: String,
    /// Unit the simulation converts the value into, e.g. `MHz`
    pub unit: String,
    pub data_type: DataType,
}
