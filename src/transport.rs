//! Transport trait for SimConnect connections

use crate::Result;
use crate::types::{
    DataType, DefinitionId, EventId, GroupId, ObjectId, Period, RequestFlags, RequestId,
    SimObjectType,
};

/// Notification group priorities (`SIMCONNECT_GROUP_PRIORITY_*`).
pub mod group_priority {
    pub const HIGHEST: u32 = 1;
    pub const HIGHEST_MASKABLE: u32 = 10_000_000;
    pub const STANDARD: u32 = 1_900_000_000;
    pub const DEFAULT: u32 = 2_000_000_000;
    pub const LOWEST: u32 = 4_000_000_000;
}

/// Flags for `transmit_client_event` (`SIMCONNECT_EVENT_FLAG_*`).
pub mod event_flags {
    pub const DEFAULT: u32 = 0x0000_0000;
    /// The group argument is a priority rather than a group id
    pub const GROUP_ID_IS_PRIORITY: u32 = 0x0000_0010;
}

/// Capability interface over an open SimConnect connection.
///
/// Implementations only move calls and frames; they hold no bridge state.
/// Request methods are fire-and-forget: the simulation reports rejections
/// later as exception frames in the dispatch queue.
///
/// - Live: [`SimConnectTransport`](crate::windows::SimConnectTransport) on Windows
/// - Scripted: [`ScriptedTransport`](crate::transports::ScriptedTransport) anywhere
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Append a datum to a data definition (`SimConnect_AddToDataDefinition`).
    async fn add_to_data_definition(
        &mut self,
        definition: DefinitionId,
        name: &str,
        unit: &str,
        data_type: DataType,
    ) -> Result<()>;

    /// Request data for a specific object (`SimConnect_RequestDataOnSimObject`).
    async fn request_data_on_sim_object(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        object: ObjectId,
        period: Period,
        flags: RequestFlags,
    ) -> Result<()>;

    /// Request data for every object of a type within a radius
    /// (`SimConnect_RequestDataOnSimObjectType`).
    async fn request_data_on_sim_object_type(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        radius_meters: u32,
        object_type: SimObjectType,
    ) -> Result<()>;

    /// Bind a client event id to a named simulation event.
    async fn map_client_event_to_sim_event(&mut self, event: EventId, sim_event: &str)
    -> Result<()>;

    async fn add_client_event_to_notification_group(
        &mut self,
        group: GroupId,
        event: EventId,
        maskable: bool,
    ) -> Result<()>;

    async fn set_notification_group_priority(&mut self, group: GroupId, priority: u32)
    -> Result<()>;

    /// Send an event with a 32-bit payload.
    ///
    /// `group` is a group id, or a priority when `flags` contains
    /// [`event_flags::GROUP_ID_IS_PRIORITY`].
    async fn transmit_client_event(
        &mut self,
        object: ObjectId,
        event: EventId,
        data: u32,
        group: u32,
        flags: u32,
    ) -> Result<()>;

    /// Pop the next frame from the dispatch queue.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - a frame was waiting
    /// - `Ok(None)` - nothing available right now (not an error)
    /// - `Err(e)` - the queue read failed; the read side is unusable
    async fn get_next_dispatch(&mut self) -> Result<Option<Vec<u8>>>;

    /// Close the connection. Called exactly once by the owning session.
    async fn close(&mut self) -> Result<()>;
}
