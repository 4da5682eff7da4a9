//! Error types for the SimConnect bridge.
//!
//! All errors implement `std::error::Error` and carry enough structured
//! context to decide whether the session can keep running.
//!
//! ## Error Categories
//!
//! - **Setup Errors**: the vendor library or the connection could not be opened
//! - **Transport Errors**: reading the dispatch queue failed with a real error code
//! - **Request Errors**: a single definition, request or event call was refused
//! - **Protocol Exceptions**: the simulation rejected a single request
//! - **Encoding Errors**: user input could not be turned into a wire value
//! - **Transmit Errors**: an event transmission call failed
//! - **Parse Errors**: an inbound frame was malformed
//!
//! Only setup and dispatch queue failures stop the system; everything else is
//! reported and the control loop proceeds.
//!
//! ```rust
//! use simbridge::BridgeError;
//!
//! let error = BridgeError::transport(-1);
//! assert!(error.is_fatal());
//!
//! let error = BridgeError::encoding_rejected("12a.5", "not a decimal number");
//! assert!(!error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{DefinitionId, EventId, ExceptionCode};

#[cfg(windows)]
use windows_core as core;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Failed to set up SimConnect: {reason}")]
    Setup {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport failure during {operation} (code {code:#010x})")]
    Transport { operation: &'static str, code: i32 },

    #[error("{operation} call failed (code {code:#010x})")]
    Request { operation: &'static str, code: i32 },

    #[error("Simulation rejected request {send_id}: {code}")]
    ProtocolException { code: ExceptionCode, send_id: u32, index: u32 },

    #[error("Invalid frequency '{input}': {reason}")]
    EncodingRejected { input: String, reason: String },

    #[error("Failed to transmit event {event}: {reason}")]
    Transmit { event: EventId, reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Definition {0} is not registered in this session")]
    UnknownDefinition(DefinitionId),

    #[error("Event {0} has not been bound to a simulation event")]
    UnboundEvent(EventId),

    #[error("Session is closed")]
    Closed,

    #[error("Configuration error: {reason}")]
    Config {
        reason: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Driver channel closed: {context}")]
    ChannelClosed { context: String },

    #[error("Windows API error: {operation}")]
    #[cfg(windows)]
    WindowsApi {
        operation: String,
        #[source]
        source: core::Error,
    },
}

impl BridgeError {
    /// Returns whether this error must stop the control loop.
    ///
    /// Setup failures abort before the loop starts and dispatch queue failures
    /// terminate the read side. A refused request is reported and skipped.
    pub fn is_fatal(&self) -> bool {
        match self {
            BridgeError::Setup { .. } => true,
            BridgeError::Transport { .. } => true,
            BridgeError::Request { .. } => false,
            BridgeError::ProtocolException { .. } => false,
            BridgeError::EncodingRejected { .. } => false,
            BridgeError::Transmit { .. } => false,
            BridgeError::Parse { .. } => false,
            BridgeError::UnknownDefinition(_) => false,
            BridgeError::UnboundEvent(_) => false,
            BridgeError::Closed => true,
            BridgeError::Config { .. } => true,
            BridgeError::UnsupportedPlatform { .. } => true,
            BridgeError::ChannelClosed { .. } => true,
            #[cfg(windows)]
            BridgeError::WindowsApi { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::Setup { .. } => vec![
                "Ensure the simulator is running",
                "Check that SimConnect.dll is on the search path",
                "Pass the SDK library directory as the first argument",
            ],
            BridgeError::Transport { .. } => vec![
                "Reconnect once the simulator is available again",
                "Check the simulator's SimConnect configuration",
            ],
            BridgeError::Request { .. } => vec![
                "Check the variable, unit or event name",
                "Reissue the request",
            ],
            BridgeError::ProtocolException { .. } => vec![
                "Check the variable or event name spelling",
                "Verify the unit is valid for the variable",
                "Reissue the request after correcting it",
            ],
            BridgeError::EncodingRejected { .. } => vec![
                "Enter the frequency in MHz, e.g. 123.450",
                "Use at most three fractional digits",
            ],
            BridgeError::Transmit { .. } => {
                vec!["Verify the connection is still open", "Reissue the command"]
            }
            BridgeError::Parse { .. } => vec![
                "Check the simulator and SDK versions match",
                "Verify registered data types match the values requested",
            ],
            BridgeError::UnknownDefinition(_) => {
                vec!["Register the variable on this session before subscribing"]
            }
            BridgeError::UnboundEvent(_) => {
                vec!["Bind the event to a simulation event and group before transmitting"]
            }
            BridgeError::Closed => vec!["Open a new session"],
            BridgeError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Remove duplicate variable entries",
                "Use non-zero intervals and capacities",
            ],
            BridgeError::UnsupportedPlatform { .. } => vec![
                "Run the live bridge on Windows",
                "Use the scripted transport for cross-platform testing",
            ],
            BridgeError::ChannelClosed { .. } => {
                vec!["The control loop has stopped; reconnect to continue"]
            }
            #[cfg(windows)]
            BridgeError::WindowsApi { .. } => vec![
                "Check Windows API permissions",
                "Verify the SimConnect library matches the process architecture",
            ],
        }
    }

    /// Helper constructor for setup failures.
    pub fn setup_failed(reason: impl Into<String>) -> Self {
        BridgeError::Setup { reason: reason.into(), source: None }
    }

    /// Helper constructor for setup failures with source.
    pub fn setup_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::Setup { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for dispatch queue failures.
    pub fn transport(code: i32) -> Self {
        BridgeError::Transport { operation: "GetNextDispatch", code }
    }

    /// Helper constructor for a refused definition, request or event call.
    pub fn request_failed(operation: &'static str, code: i32) -> Self {
        BridgeError::Request { operation, code }
    }

    /// Helper constructor for rejected user input.
    pub fn encoding_rejected(input: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::EncodingRejected { input: input.into(), reason: reason.into() }
    }

    /// Helper constructor for malformed frames.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        BridgeError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        BridgeError::Config { reason: reason.into(), path: None, source: None }
    }

    /// Helper constructor for channel failures between handle and driver.
    pub fn channel_closed(context: impl Into<String>) -> Self {
        BridgeError::ChannelClosed { context: context.into() }
    }

    /// Helper constructor for Windows API errors.
    #[cfg(windows)]
    pub fn windows_api_error(operation: impl Into<String>, source: core::Error) -> Self {
        BridgeError::WindowsApi { operation: operation.into(), source }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        BridgeError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<serde_yaml_ng::Error> for BridgeError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        BridgeError::Config {
            reason: format!("invalid YAML: {}", err),
            path: None,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(windows)]
impl From<core::Error> for BridgeError {
    fn from(err: core::Error) -> Self {
        BridgeError::WindowsApi {
            operation: "Unknown Windows operation".to_string(),
            source: err,
        }
    }
}
