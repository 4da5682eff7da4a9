//! Core types for the SimConnect bridge.
//!
//! ## Architecture
//!
//! The types map directly onto protocol concepts:
//! - [`DefinitionId`], [`RequestId`], [`EventId`], [`GroupId`] are namespace-scoped
//!   `u32` handles issued by an [`IdAllocator`]
//! - [`VariableDescriptor`] ties a variable name and unit to its definition
//! - [`Subscription`] binds a definition to a target and a [`DeliveryMode`]
//! - [`DecodedSample`] / [`SampleReport`] carry values out of the decoder
//! - [`Frequency`] and [`FrequencyEncoding`] produce command payloads
//!
//! ## Usage Example
//!
//! ```rust
//! use simbridge::types::{Frequency, FrequencyEncoding, IdAllocator};
//!
//! let mut ids = IdAllocator::new();
//! let definition = ids.allocate_definition();
//! assert_eq!(definition.raw(), 1);
//!
//! let standby = Frequency::parse_mhz("122.800").unwrap();
//! assert_eq!(FrequencyEncoding::RawHz.encode(standby).unwrap(), 122_800_000);
//! assert_eq!(FrequencyEncoding::Bcd16.encode(standby).unwrap(), 0x0800_0122);
//! ```

mod exception;
mod frequency;
mod ids;
mod sample;
mod subscription;
mod update_rate;
mod variable;

pub use exception::ExceptionCode;
pub use frequency::{Frequency, FrequencyEncoding};
pub use ids::{DefinitionId, EventId, GroupId, IdAllocator, Namespace, RequestId, UNUSED};
pub use sample::{DecodedSample, SampleReport};
pub use subscription::{DeliveryMode, ObjectId, Period, RequestFlags, SimObjectType, Subscription};
pub use update_rate::UpdateRate;
pub use variable::{DataType, VariableDescriptor};
