//! Live SimConnect access (Windows only)
//!
//! The vendor library is loaded at runtime instead of being linked, so the
//! crate builds without the SDK installed and the library location can be
//! chosen per run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use simbridge::windows::SimConnectTransport;
//! use simbridge::transport::Transport;
//!
//! let mut transport = SimConnectTransport::open("COM Example", None)?;
//! while let Some(frame) = transport.get_next_dispatch().await? {
//!     // decode frame
//! }
//! transport.close().await?;
//! ```

mod simconnect;

pub use simconnect::{LIBRARY_NAME, SimConnectTransport};
