//! Scripted transport for tests, demos and benchmarks
//!
//! Serves frames pushed through a [`ScriptedHandle`] and records every call
//! the bridge makes, so sessions and the driver can run without a simulator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

use crate::transport::Transport;
use crate::types::{
    DataType, DefinitionId, EventId, GroupId, ObjectId, Period, RequestFlags, RequestId,
    SimObjectType,
};
use crate::{BridgeError, Result};

/// A call recorded by the scripted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    AddToDataDefinition {
        definition: DefinitionId,
        name: String,
        unit: String,
        data_type: DataType,
    },
    RequestDataOnSimObject {
        request: RequestId,
        definition: DefinitionId,
        object: ObjectId,
        period: Period,
        flags: RequestFlags,
    },
    RequestDataOnSimObjectType {
        request: RequestId,
        definition: DefinitionId,
        radius_meters: u32,
        object_type: SimObjectType,
    },
    MapClientEventToSimEvent { event: EventId, sim_event: String },
    AddClientEventToNotificationGroup { group: GroupId, event: EventId, maskable: bool },
    SetNotificationGroupPriority { group: GroupId, priority: u32 },
    TransmitClientEvent { object: ObjectId, event: EventId, data: u32, group: u32, flags: u32 },
    Close,
}

#[derive(Debug)]
enum Queued {
    Frame(Vec<u8>),
    Error(i32),
}

#[derive(Debug, Default)]
struct ScriptState {
    queue: VecDeque<Queued>,
    calls: Vec<TransportCall>,
    fail_next: Option<i32>,
    closed: bool,
}

/// In-memory transport; pair it with the [`ScriptedHandle`] returned by [`new`](Self::new).
#[derive(Debug)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

/// Caller side of a [`ScriptedTransport`]: queue frames, inspect calls.
#[derive(Debug, Clone)]
pub struct ScriptedHandle {
    state: Arc<Mutex<ScriptState>>,
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedTransport {
    pub fn new() -> (Self, ScriptedHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (Self { state: Arc::clone(&state) }, ScriptedHandle { state })
    }

    fn record(&self, operation: &'static str, call: TransportCall) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(BridgeError::Closed);
        }
        if let Some(code) = state.fail_next.take() {
            trace!(operation, code, "Scripted call failure");
            return Err(BridgeError::request_failed(operation, code));
        }
        trace!(?call, "Scripted call");
        state.calls.push(call);
        Ok(())
    }
}

impl ScriptedHandle {
    /// Queue a frame for `get_next_dispatch`.
    pub fn push_frame(&self, frame: Vec<u8>) {
        lock(&self.state).queue.push_back(Queued::Frame(frame));
    }

    pub fn push_frames<I: IntoIterator<Item = Vec<u8>>>(&self, frames: I) {
        let mut state = lock(&self.state);
        state.queue.extend(frames.into_iter().map(Queued::Frame));
    }

    /// Queue a failed queue read with the given result code.
    pub fn push_dispatch_error(&self, code: i32) {
        lock(&self.state).queue.push_back(Queued::Error(code));
    }

    /// Make the next non-dispatch call fail with `code`.
    pub fn fail_next_call(&self, code: i32) {
        lock(&self.state).fail_next = Some(code);
    }

    /// All calls recorded so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.state).calls.clone()
    }

    pub fn close_count(&self) -> usize {
        lock(&self.state).calls.iter().filter(|c| **c == TransportCall::Close).count()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Frames and errors not yet consumed.
    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn add_to_data_definition(
        &mut self,
        definition: DefinitionId,
        name: &str,
        unit: &str,
        data_type: DataType,
    ) -> Result<()> {
        self.record(
            "AddToDataDefinition",
            TransportCall::AddToDataDefinition {
                definition,
                name: name.to_string(),
                unit: unit.to_string(),
                data_type,
            },
        )
    }

    async fn request_data_on_sim_object(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        object: ObjectId,
        period: Period,
        flags: RequestFlags,
    ) -> Result<()> {
        self.record(
            "RequestDataOnSimObject",
            TransportCall::RequestDataOnSimObject { request, definition, object, period, flags },
        )
    }

    async fn request_data_on_sim_object_type(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        radius_meters: u32,
        object_type: SimObjectType,
    ) -> Result<()> {
        self.record(
            "RequestDataOnSimObjectType",
            TransportCall::RequestDataOnSimObjectType {
                request,
                definition,
                radius_meters,
                object_type,
            },
        )
    }

    async fn map_client_event_to_sim_event(
        &mut self,
        event: EventId,
        sim_event: &str,
    ) -> Result<()> {
        self.record(
            "MapClientEventToSimEvent",
            TransportCall::MapClientEventToSimEvent { event, sim_event: sim_event.to_string() },
        )
    }

    async fn add_client_event_to_notification_group(
        &mut self,
        group: GroupId,
        event: EventId,
        maskable: bool,
    ) -> Result<()> {
        self.record(
            "AddClientEventToNotificationGroup",
            TransportCall::AddClientEventToNotificationGroup { group, event, maskable },
        )
    }

    async fn set_notification_group_priority(
        &mut self,
        group: GroupId,
        priority: u32,
    ) -> Result<()> {
        self.record(
            "SetNotificationGroupPriority",
            TransportCall::SetNotificationGroupPriority { group, priority },
        )
    }

    async fn transmit_client_event(
        &mut self,
        object: ObjectId,
        event: EventId,
        data: u32,
        group: u32,
        flags: u32,
    ) -> Result<()> {
        self.record(
            "TransmitClientEvent",
            TransportCall::TransmitClientEvent { object, event, data, group, flags },
        )
    }

    async fn get_next_dispatch(&mut self) -> Result<Option<Vec<u8>>> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(BridgeError::Closed);
        }
        match state.queue.pop_front() {
            Some(Queued::Frame(frame)) => Ok(Some(frame)),
            Some(Queued::Error(code)) => Err(BridgeError::transport(code)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(TransportCall::Close);
        state.closed = true;
        Ok(())
    }
}
