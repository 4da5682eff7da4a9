//! Type-safe Rust bridge to the SimConnect variable and event protocol.
//!
//! SimBridge subscribes to named simulation variables, decodes the values the
//! simulation pushes through its dispatch queue, suppresses repeats, and
//! sends radio frequency commands back in the encoding each event expects.
//!
//! # Features
//!
//! - **Explicit sessions**: registry, subscriptions and change cache live in
//!   one [`Session`] per connection, never in globals
//! - **Bounds-checked decoding**: every frame is validated against its
//!   declared size before any field is read
//! - **Two frequency encodings**: raw Hz and packed BCD16
//! - **Async control loop**: a single driver task owns the transport; callers
//!   get streams and a command handle
//! - **Scripted transport**: the whole stack runs without a simulator
//!
//! ## Example (scripted transport)
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use simbridge::protocol::FrameBuilder;
//! use simbridge::transports::ScriptedTransport;
//! use simbridge::{BridgeConfig, RequestId, SimBridge, UpdateRate};
//!
//! #[tokio::main]
//! async fn main() -> simbridge::Result<()> {
//!     let (transport, script) = ScriptedTransport::new();
//!     let connection = SimBridge::with_transport(transport, &BridgeConfig::default()).await?;
//!
//!     let standby = connection.variables()[1].definition;
//!     let mut samples = connection.samples_for("COM STANDBY FREQUENCY:1", UpdateRate::Native);
//!     script.push_frame(FrameBuilder::object_data(RequestId::new(2), standby, 122.8));
//!
//!     if let Some(report) = samples.next().await {
//!         println!("{}: {} {}", report.name(), report.value(), report.unit());
//!     }
//!     connection.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod driver;
mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stream;
pub mod subscription;
pub mod transport;
pub mod transports;
pub mod types;

// Platform-specific modules
#[cfg(windows)]
pub mod windows;

pub use error::*;
pub use types::*;

pub use cache::ChangeCache;
pub use command::{CommandEncoder, EventBinding, FrequencyCommand};
pub use config::{BridgeConfig, VariableConfig};
pub use connection::BridgeConnection;
pub use dispatch::{DispatchDecoder, DispatchEvent};
pub use driver::{BridgeEvent, DisconnectReason, Driver, DriverExit, DriverSettings};
pub use registry::VariableRegistry;
pub use session::{Session, SessionState};
pub use subscription::SubscriptionManager;
pub use transport::Transport;

#[cfg(windows)]
pub use crate::windows::SimConnectTransport;

/// Entry point for bridge connections.
///
/// # Examples
///
/// ## Live simulator (Windows)
/// ```rust,no_run
/// use simbridge::{BridgeConfig, SimBridge};
///
/// #[tokio::main]
/// async fn main() -> simbridge::Result<()> {
///     let connection = SimBridge::connect(&BridgeConfig::default()).await?;
///     connection.wait_connected().await?;
///     Ok(())
/// }
/// ```
pub struct SimBridge;

impl SimBridge {
    /// Open SimConnect with the configured client name and start the bridge.
    ///
    /// # Platform
    ///
    /// Only available on Windows. Elsewhere this returns
    /// [`BridgeError::UnsupportedPlatform`].
    ///
    /// # Errors
    ///
    /// Returns a setup error if:
    /// - `SimConnect.dll` cannot be loaded from `library_path` or the search path
    /// - The simulator is not running
    /// - Registering the configured variables or the standby event fails
    pub async fn connect(config: &BridgeConfig) -> Result<BridgeConnection> {
        #[cfg(windows)]
        {
            config.validate()?;
            let transport =
                SimConnectTransport::open(&config.client_name, config.library_path.as_deref())?;
            BridgeConnection::start(transport, config).await
        }

        #[cfg(not(windows))]
        {
            let _ = config;
            Err(BridgeError::unsupported_platform("Live SimConnect", "Windows"))
        }
    }

    /// Start the bridge over any transport, e.g. a
    /// [`ScriptedTransport`](transports::ScriptedTransport).
    pub async fn with_transport<T: Transport>(
        transport: T,
        config: &BridgeConfig,
    ) -> Result<BridgeConnection> {
        BridgeConnection::start(transport, config).await
    }
}
