//! Driver runs the control loop of one session
//!
//! The driver task is the only owner of the [`Session`] and therefore of the
//! transport. Everything else talks to it through channels:
//! - commands come in over an mpsc queue, each with a oneshot reply
//! - decoded events go out on a broadcast channel
//! - the connection state is published on a watch channel
//!
//! Two timers pace the loop: the receive ticker drains the dispatch queue and
//! the request ticker re-issues polled subscriptions. Cancellation is checked
//! between steps, never in the middle of one.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::command::{EventBinding, FrequencyCommand};
use crate::config::BridgeConfig;
use crate::dispatch::DispatchEvent;
use crate::session::{Session, SessionState};
use crate::transport::Transport;
use crate::types::{
    DataType, DefinitionId, DeliveryMode, EventId, ExceptionCode, Frequency, FrequencyEncoding,
    ObjectId, SampleReport, Subscription, VariableDescriptor,
};
use crate::{BridgeError, Result};

const COMMAND_QUEUE: usize = 32;

/// Something the caller can observe while the bridge runs.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Connected,
    Sample(SampleReport),
    Exception { code: ExceptionCode, send_id: u32, index: u32 },
    /// Last event of a session
    Disconnected(DisconnectReason),
}

/// Why the control loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The simulation sent its quit frame
    Quit,
    /// The caller asked for shutdown
    Shutdown,
    /// Reading the dispatch queue failed
    TransportFailure(String),
}

/// Summary returned by the driver task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverExit {
    pub reason: DisconnectReason,
    pub frames: u64,
    pub samples: u64,
}

/// Requests served by the driver on behalf of a connection handle.
#[derive(Debug)]
pub(crate) enum Command {
    Register {
        name: String,
        unit: String,
        data_type: DataType,
        reply: oneshot::Sender<Result<Arc<VariableDescriptor>>>,
    },
    Subscribe {
        definition: DefinitionId,
        target: ObjectId,
        delivery: DeliveryMode,
        reply: oneshot::Sender<Result<Subscription>>,
    },
    BindEvent {
        sim_event: String,
        encoding: FrequencyEncoding,
        priority: u32,
        reply: oneshot::Sender<Result<EventBinding>>,
    },
    Transmit {
        event: EventId,
        frequency: Frequency,
        reply: oneshot::Sender<Result<FrequencyCommand>>,
    },
}

/// Loop pacing, usually taken from [`BridgeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub receive_interval: Duration,
    pub request_interval: Duration,
    pub max_dispatch_per_tick: usize,
    pub event_capacity: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for DriverSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            receive_interval: config.receive_interval(),
            request_interval: config.request_interval(),
            max_dispatch_per_tick: config.max_dispatch_per_tick.max(1),
            event_capacity: config.event_capacity.max(1),
        }
    }
}

/// Result of spawning the driver task
pub struct DriverChannels {
    pub(crate) commands: mpsc::Sender<Command>,
    /// Created before the loop starts, so it sees every event of the session
    pub events: broadcast::Receiver<BridgeEvent>,
    pub state: watch::Receiver<SessionState>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<DriverExit>>,
}

pub struct Driver;

impl Driver {
    /// Spawn the control loop for an already set up session.
    pub fn spawn<T: Transport>(session: Session<T>, settings: DriverSettings) -> DriverChannels {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = broadcast::channel(settings.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(session.state());
        let cancel = CancellationToken::new();

        let worker = Worker {
            session,
            settings,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
            cancel: cancel.clone(),
            samples: 0,
            frames: 0,
        };
        let task = tokio::spawn(worker.run());

        DriverChannels { commands: command_tx, events: event_rx, state: state_rx, cancel, task }
    }
}

struct Worker<T: Transport> {
    session: Session<T>,
    settings: DriverSettings,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<BridgeEvent>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    samples: u64,
    frames: u64,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self) -> Result<DriverExit> {
        info!("Driver task started");

        let mut receive = interval(self.settings.receive_interval);
        receive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut request = interval(self.settings.request_interval);
        request.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome: Result<DisconnectReason> = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Driver cancelled");
                    break Ok(DisconnectReason::Shutdown);
                }
                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }
                _ = request.tick() => {
                    if let Err(e) = self.poll().await {
                        break Err(e);
                    }
                }
                _ = receive.tick() => {
                    match self.drain().await {
                        Ok(Some(reason)) => break Ok(reason),
                        Ok(None) => {}
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        // only this task touches the transport, so this is the single close
        if let Err(e) = self.session.close().await {
            warn!("Failed to close transport: {}", e);
        }
        self.state.send_replace(SessionState::Closed);

        let reason = match &outcome {
            Ok(reason) => reason.clone(),
            Err(e) => DisconnectReason::TransportFailure(e.to_string()),
        };
        let _ = self.events.send(BridgeEvent::Disconnected(reason.clone()));

        info!(
            "Driver task ended ({:?}, {} frames, {} samples)",
            reason, self.frames, self.samples
        );

        outcome.map(|reason| DriverExit { reason, frames: self.frames, samples: self.samples })
    }

    /// Re-issue polled subscriptions. Refused requests are logged by the
    /// subscription manager; only fatal errors stop the loop.
    async fn poll(&mut self) -> Result<()> {
        if !self.session.subscriptions().has_polled() {
            return Ok(());
        }
        match self.session.poll().await {
            Ok(issued) => {
                trace!("Polled {} subscriptions", issued);
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                error!("Poll failed: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!("Poll failed: {}", e);
                Ok(())
            }
        }
    }

    /// Decode up to `max_dispatch_per_tick` frames.
    async fn drain(&mut self) -> Result<Option<DisconnectReason>> {
        for _ in 0..self.settings.max_dispatch_per_tick {
            let Some(event) = self.session.next_event().await? else {
                return Ok(None);
            };
            self.frames += 1;

            match event {
                DispatchEvent::Connected => {
                    self.state.send_replace(self.session.state());
                    let _ = self.events.send(BridgeEvent::Connected);
                }
                DispatchEvent::Quit => return Ok(Some(DisconnectReason::Quit)),
                DispatchEvent::Exception { code, send_id, index } => {
                    let _ = self.events.send(BridgeEvent::Exception { code, send_id, index });
                }
                DispatchEvent::Sample(report) => {
                    self.samples += 1;
                    if self.events.send(BridgeEvent::Sample(report)).is_err() {
                        trace!("No event subscribers");
                    }
                }
                DispatchEvent::Unchanged { .. }
                | DispatchEvent::Unregistered { .. }
                | DispatchEvent::Ignored { .. }
                | DispatchEvent::Malformed { .. } => {}
            }
        }
        Ok(None)
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register { name, unit, data_type, reply } => {
                let result = self.session.register_variable(&name, &unit, data_type).await;
                respond(reply, result, "register");
            }
            Command::Subscribe { definition, target, delivery, reply } => {
                let result = self.session.subscribe(definition, target, delivery).await;
                respond(reply, result, "subscribe");
            }
            Command::BindEvent { sim_event, encoding, priority, reply } => {
                let result = self.session.bind_event(&sim_event, encoding, priority).await;
                respond(reply, result, "bind_event");
            }
            Command::Transmit { event, frequency, reply } => {
                let result = self.session.transmit_frequency(event, frequency).await;
                respond(reply, result, "transmit");
            }
        }
    }
}

fn respond<R>(reply: oneshot::Sender<Result<R>>, result: Result<R>, command: &'static str) {
    if let Err(e) = &result {
        debug!(command, error = %e, "Command failed");
    }
    if reply.send(result).is_err() {
        debug!(command, "Command caller went away before the reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameBuilder;
    use crate::transports::{ScriptedHandle, ScriptedTransport, TransportCall};

    const WAIT: Duration = Duration::from_secs(2);

    fn settings() -> DriverSettings {
        DriverSettings {
            receive_interval: Duration::from_millis(1),
            request_interval: Duration::from_millis(10),
            max_dispatch_per_tick: 8,
            event_capacity: 64,
        }
    }

    fn spawn() -> (DriverChannels, ScriptedHandle) {
        let (transport, handle) = ScriptedTransport::new();
        (Driver::spawn(Session::new(transport), settings()), handle)
    }

    #[tokio::test]
    async fn quit_ends_the_loop_and_closes_once() {
        let (channels, handle) = spawn();
        let mut events = channels.events;
        handle.push_frames([FrameBuilder::open(), FrameBuilder::quit()]);

        let exit = channels.task.await.unwrap().unwrap();

        assert_eq!(exit.reason, DisconnectReason::Quit);
        assert_eq!(exit.frames, 2);
        assert_eq!(handle.close_count(), 1);
        assert_eq!(*channels.state.borrow(), SessionState::Closed);
        assert!(matches!(events.recv().await.unwrap(), BridgeEvent::Connected));
        assert!(matches!(
            events.recv().await.unwrap(),
            BridgeEvent::Disconnected(DisconnectReason::Quit)
        ));
    }

    #[tokio::test]
    async fn cancellation_closes_transport() {
        let (channels, handle) = spawn();
        channels.cancel.cancel();

        let exit = channels.task.await.unwrap().unwrap();
        assert_eq!(exit.reason, DisconnectReason::Shutdown);
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_returned() {
        let (channels, handle) = spawn();
        handle.push_dispatch_error(-2);

        let err = channels.task.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Transport { code: -2, .. }));
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn refused_poll_keeps_the_loop_running() {
        let (transport, handle) = ScriptedTransport::new();
        let mut session = Session::new(transport);
        let variable = session
            .register_variable("COM STANDBY FREQUENCY:1", "MHz", DataType::Float64)
            .await
            .unwrap();
        session
            .subscribe(variable.definition, ObjectId::USER, DeliveryMode::Poll { radius_meters: 0 })
            .await
            .unwrap();
        handle.push_frame(FrameBuilder::open());

        let channels = Driver::spawn(session, settings());
        let mut state = channels.state.clone();
        tokio::time::timeout(WAIT, state.wait_for(|s| *s == SessionState::Connected))
            .await
            .unwrap()
            .unwrap();

        let polls = |handle: &ScriptedHandle| {
            handle
                .calls()
                .iter()
                .filter(|c| matches!(c, TransportCall::RequestDataOnSimObjectType { .. }))
                .count()
        };
        handle.fail_next_call(-1);
        let before = polls(&handle);
        tokio::time::timeout(WAIT, async {
            while polls(&handle) <= before {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*channels.state.borrow(), SessionState::Connected);
        assert!(!channels.task.is_finished());
        assert_eq!(handle.close_count(), 0);

        channels.cancel.cancel();
        let exit = channels.task.await.unwrap().unwrap();
        assert_eq!(exit.reason, DisconnectReason::Shutdown);
    }

    #[tokio::test]
    async fn commands_are_served_while_running() {
        let (channels, handle) = spawn();

        let (reply, rx) = oneshot::channel();
        channels
            .commands
            .send(Command::Register {
                name: "COM STANDBY FREQUENCY:1".to_string(),
                unit: "MHz".to_string(),
                data_type: DataType::Float64,
                reply,
            })
            .await
            .unwrap();
        let variable = rx.await.unwrap().unwrap();

        assert_eq!(variable.name, "COM STANDBY FREQUENCY:1");
        assert_eq!(handle.calls().len(), 1);

        channels.cancel.cancel();
        channels.task.await.unwrap().unwrap();
    }
}
