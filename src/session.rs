//! Per-connection session context
//!
//! A [`Session`] owns everything that lives exactly as long as one
//! connection: the transport, the id allocator, the variable registry, the
//! subscriptions, the change cache and the event bindings. Nothing here is
//! global, so two sessions never share state and tests can build as many as
//! they like.
//!
//! A session is driven from a single task. The [`Driver`](crate::driver::Driver)
//! does that for running connections; tests call the methods directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::ChangeCache;
use crate::command::{CommandEncoder, EventBinding, FrequencyCommand};
use crate::dispatch::{DispatchDecoder, DispatchEvent};
use crate::registry::VariableRegistry;
use crate::subscription::SubscriptionManager;
use crate::transport::Transport;
use crate::types::{
    DataType, DefinitionId, DeliveryMode, EventId, Frequency, FrequencyEncoding, IdAllocator,
    ObjectId, Period, Subscription, VariableDescriptor,
};
use crate::{BridgeError, Result};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transport open, waiting for the open frame
    #[default]
    Connecting,
    Connected,
    /// Quit received, fatal error seen or closed by the caller
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Connected => f.write_str("connected"),
            SessionState::Closed => f.write_str("closed"),
        }
    }
}

pub struct Session<T: Transport> {
    transport: T,
    ids: IdAllocator,
    registry: VariableRegistry,
    subscriptions: SubscriptionManager,
    cache: ChangeCache,
    decoder: DispatchDecoder,
    commands: CommandEncoder,
    state: SessionState,
    transport_closed: bool,
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("variables", &self.registry.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("bindings", &self.commands.len())
            .field("transport_closed", &self.transport_closed)
            .finish()
    }
}

impl<T: Transport> Session<T> {
    /// Wrap an opened transport. The session starts out `Connecting`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            ids: IdAllocator::new(),
            registry: VariableRegistry::new(),
            subscriptions: SubscriptionManager::new(),
            cache: ChangeCache::new(),
            decoder: DispatchDecoder::new(),
            commands: CommandEncoder::new(),
            state: SessionState::Connecting,
            transport_closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn cache(&self) -> &ChangeCache {
        &self.cache
    }

    pub fn commands(&self) -> &CommandEncoder {
        &self.commands
    }

    pub fn decoder(&self) -> &DispatchDecoder {
        &self.decoder
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() { Err(BridgeError::Closed) } else { Ok(()) }
    }

    /// Define a variable and remember it for decoding.
    ///
    /// Unknown names are not detected here; the simulation answers with an
    /// exception frame later. Registering the same name twice yields two
    /// independent definitions.
    pub async fn register_variable(
        &mut self,
        name: &str,
        unit: &str,
        data_type: DataType,
    ) -> Result<Arc<VariableDescriptor>> {
        self.ensure_open()?;

        let definition = self.ids.allocate_definition();
        self.transport.add_to_data_definition(definition, name, unit, data_type).await?;

        debug!(%definition, name, unit, ?data_type, "Variable registered");
        Ok(self.registry.insert(definition, name, unit, data_type))
    }

    /// Subscribe to a registered definition with any delivery mode.
    pub async fn subscribe(
        &mut self,
        definition: DefinitionId,
        target: ObjectId,
        delivery: DeliveryMode,
    ) -> Result<Subscription> {
        self.ensure_open()?;
        if !self.registry.contains(definition) {
            return Err(BridgeError::UnknownDefinition(definition));
        }

        let request = self.ids.allocate_request();
        self.subscriptions
            .subscribe(&mut self.transport, request, definition, target, delivery)
            .await
    }

    /// Single delivery; call [`poll`](Self::poll) or request again for more.
    pub async fn request_once(
        &mut self,
        definition: DefinitionId,
        target: ObjectId,
        radius_meters: u32,
    ) -> Result<Subscription> {
        self.subscribe(definition, target, DeliveryMode::Once { radius_meters }).await
    }

    pub async fn request_continuous(
        &mut self,
        definition: DefinitionId,
        target: ObjectId,
        period: Period,
    ) -> Result<Subscription> {
        let delivery = DeliveryMode::Continuous { period, flags: Default::default() };
        self.subscribe(definition, target, delivery).await
    }

    /// Re-issue polled subscriptions. Returns how many requests were sent.
    pub async fn poll(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.subscriptions.poll_due(&mut self.transport).await
    }

    /// Pull and decode one frame from the dispatch queue.
    ///
    /// - `Ok(None)`: the queue is empty, try again next tick
    /// - `Ok(Some(event))`: one decoded frame; malformed frames come back as
    ///   [`DispatchEvent::Malformed`] and do not stop the session
    /// - `Err(e)`: the queue read failed; the session is closed for reading
    pub async fn next_event(&mut self) -> Result<Option<DispatchEvent>> {
        self.ensure_open()?;

        let frame = match self.transport.get_next_dispatch().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => {
                error!(error = %e, "Dispatch queue read failed");
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        let event = match self.decoder.decode(&frame, &self.registry, &mut self.cache) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, bytes = frame.len(), "Skipping malformed frame");
                DispatchEvent::Malformed { reason: e.to_string() }
            }
        };

        match &event {
            DispatchEvent::Connected if self.state == SessionState::Connecting => {
                info!("Session connected");
                self.state = SessionState::Connected;
            }
            DispatchEvent::Quit => {
                info!("Simulation closed the session");
                self.state = SessionState::Closed;
            }
            _ => {}
        }

        Ok(Some(event))
    }

    /// Bind a simulation event for frequency commands.
    pub async fn bind_event(
        &mut self,
        sim_event: &str,
        encoding: FrequencyEncoding,
        priority: u32,
    ) -> Result<EventBinding> {
        self.ensure_open()?;
        self.commands.bind(&mut self.transport, &mut self.ids, sim_event, encoding, priority).await
    }

    pub async fn transmit_frequency(
        &mut self,
        event: EventId,
        frequency: Frequency,
    ) -> Result<FrequencyCommand> {
        self.ensure_open()?;
        self.commands.transmit_frequency(&mut self.transport, event, frequency).await
    }

    /// Close the transport and drop all per-connection state.
    ///
    /// The transport is closed at most once; later calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        if self.transport_closed {
            return Ok(());
        }
        self.transport_closed = true;

        self.registry.clear();
        self.subscriptions.clear();
        self.cache.clear();
        self.commands.clear();

        debug!(frames = self.decoder.frames_decoded(), "Closing transport");
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuilder, recv_id};
    use crate::transport::group_priority;
    use crate::transports::{ScriptedHandle, ScriptedTransport, TransportCall};
    use crate::types::{ExceptionCode, RequestId};

    fn session() -> (Session<ScriptedTransport>, ScriptedHandle) {
        let (transport, handle) = ScriptedTransport::new();
        (Session::new(transport), handle)
    }

    async fn register(
        session: &mut Session<ScriptedTransport>,
        name: &str,
    ) -> Arc<VariableDescriptor> {
        session.register_variable(name, "MHz", DataType::Float64).await.unwrap()
    }

    async fn bind(session: &mut Session<ScriptedTransport>, sim_event: &str) -> EventBinding {
        session
            .bind_event(sim_event, FrequencyEncoding::RawHz, group_priority::HIGHEST)
            .await
            .unwrap()
    }

    async fn drain(session: &mut Session<ScriptedTransport>) -> Vec<DispatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = session.next_event().await.unwrap() {
            events.push(event);
            if session.is_closed() {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn open_frame_connects() {
        let (mut session, handle) = session();
        handle.push_frame(FrameBuilder::open());

        assert_eq!(session.state(), SessionState::Connecting);
        drain(&mut session).await;
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn registration_defines_and_remembers() {
        let (mut session, handle) = session();

        let com1 = register(&mut session, "COM ACTIVE FREQUENCY:1").await;
        let com2 = register(&mut session, "COM ACTIVE FREQUENCY:2").await;

        assert_ne!(com1.definition, com2.definition);
        let registered = session.registry().lookup(com1.definition).unwrap();
        assert_eq!(registered.name, "COM ACTIVE FREQUENCY:1");
        assert_eq!(
            handle.calls()[0],
            TransportCall::AddToDataDefinition {
                definition: com1.definition,
                name: "COM ACTIVE FREQUENCY:1".to_string(),
                unit: "MHz".to_string(),
                data_type: DataType::Float64,
            }
        );
    }

    #[tokio::test]
    async fn subscribing_unknown_definition_fails() {
        let (mut session, handle) = session();

        let err = session
            .request_continuous(DefinitionId::new(5), ObjectId::USER, Period::VisualFrame)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::UnknownDefinition(_)));
        assert!(handle.calls().is_empty());
    }

    #[tokio::test]
    async fn duplicate_samples_are_suppressed() {
        let (mut session, handle) = session();
        let var = register(&mut session, "COM STANDBY FREQUENCY:1").await;
        let sub = session
            .request_continuous(var.definition, ObjectId::USER, Period::VisualFrame)
            .await
            .unwrap();

        handle.push_frames([
            FrameBuilder::open(),
            FrameBuilder::object_data(sub.request, var.definition, 122.8),
            FrameBuilder::object_data(sub.request, var.definition, 122.8),
            FrameBuilder::object_data(sub.request, var.definition, 123.45),
        ]);

        let reports: Vec<_> = drain(&mut session)
            .await
            .into_iter()
            .filter_map(|e| match e {
                DispatchEvent::Sample(report) => Some(report),
                _ => None,
            })
            .collect();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].value(), 122.8);
        assert_eq!(reports[1].value(), 123.45);
        assert!(reports[1].sequence > reports[0].sequence);
    }

    #[tokio::test]
    async fn exceptions_and_unknown_tags_keep_the_session_open() {
        let (mut session, handle) = session();
        handle.push_frames([
            FrameBuilder::open(),
            FrameBuilder::exception(7, 4, 1),
            FrameBuilder::raw(recv_id::EVENT, &[0u8; 8]),
            FrameBuilder::raw(0xFFFF, &[]),
        ]);

        let events = drain(&mut session).await;

        assert_eq!(events.len(), 4);
        assert!(matches!(
            events[1],
            DispatchEvent::Exception { code: ExceptionCode::NameUnrecognized, .. }
        ));
        assert!(!session.is_closed());
        assert!(session.cache().is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let (mut session, handle) = session();
        let mut truncated = FrameBuilder::exception(1, 2, 3);
        truncated.truncate(16);
        handle.push_frames([truncated, FrameBuilder::open()]);

        let events = drain(&mut session).await;
        assert!(matches!(events[0], DispatchEvent::Malformed { .. }));
        assert!(matches!(events[1], DispatchEvent::Connected));
    }

    #[tokio::test]
    async fn quit_closes_and_rejects_further_requests() {
        let (mut session, handle) = session();
        let var = register(&mut session, "COM STANDBY FREQUENCY:1").await;
        handle.push_frames([FrameBuilder::open(), FrameBuilder::quit(), FrameBuilder::open()]);

        let events = drain(&mut session).await;
        assert!(events.last().is_some_and(DispatchEvent::is_terminal));
        assert_eq!(handle.pending(), 1);

        let err = session.request_once(var.definition, ObjectId::USER, 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::Closed));
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let (mut session, handle) = session();
        handle.push_dispatch_error(-1);

        let err = session.next_event().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn close_happens_once_and_clears_state() {
        let (mut session, handle) = session();
        register(&mut session, "COM STANDBY FREQUENCY:1").await;
        bind(&mut session, "COM_STBY_RADIO_SET_HZ").await;

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(handle.close_count(), 1);
        assert!(session.registry().is_empty());
        assert!(session.commands().is_empty());
    }

    #[tokio::test]
    async fn polled_subscriptions_reuse_request_ids() {
        let (mut session, handle) = session();
        let var = register(&mut session, "COM ACTIVE FREQUENCY:1").await;
        let sub = session
            .subscribe(var.definition, ObjectId::USER, DeliveryMode::Poll { radius_meters: 0 })
            .await
            .unwrap();

        assert_eq!(session.poll().await.unwrap(), 1);

        let requests: Vec<RequestId> = handle
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::RequestDataOnSimObjectType { request, .. } => Some(request),
                _ => None,
            })
            .collect();
        assert_eq!(requests, vec![sub.request, sub.request]);
    }

    #[tokio::test]
    async fn group_ids_are_allocated_not_zero() {
        let (mut session, _handle) = session();
        let first = bind(&mut session, "COM_STBY_RADIO_SET_HZ").await;
        let second = bind(&mut session, "COM2_STBY_RADIO_SET_HZ").await;

        assert_ne!(first.group.raw(), 0);
        assert_ne!(first.group, second.group);
        assert_ne!(first.event, second.event);
    }
}
