//! Transport implementations
//!
//! - [`scripted`]: in-memory queue driven by the caller, available everywhere
//! - the live SimConnect transport lives in [`crate::windows`]

pub mod scripted;

pub use scripted::{ScriptedHandle, ScriptedTransport, TransportCall};
