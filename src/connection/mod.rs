//! Caller-facing connection handle
//!
//! [`BridgeConnection`] sets up a session from a [`BridgeConfig`], hands it to
//! the [`Driver`] and then only talks to the driver task through channels.
//! Dropping the handle cancels the driver, which closes the transport.
//!
//! The first event stream taken from a connection starts at the beginning of
//! the session, so the open event and the first value of every variable are
//! never missed. Streams taken later start at the moment they are taken.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{EventBinding, FrequencyCommand};
use crate::config::BridgeConfig;
use crate::driver::{BridgeEvent, Command, Driver, DriverExit, DriverSettings};
use crate::session::{Session, SessionState};
use crate::stream::ThrottleExt;
use crate::transport::Transport;
use crate::types::{
    DataType, DefinitionId, DeliveryMode, EventId, Frequency, FrequencyEncoding, ObjectId,
    SampleReport, Subscription, UpdateRate, VariableDescriptor,
};
use crate::{BridgeError, Result};

#[cfg(test)]
mod tests;

/// Handle to a running bridge session
pub struct BridgeConnection {
    commands: mpsc::Sender<Command>,

    /// Receiver created before the driver started, handed to the first stream
    first_events: Mutex<Option<broadcast::Receiver<BridgeEvent>>>,

    /// Template receiver, resubscribed for every later stream
    events: broadcast::Receiver<BridgeEvent>,

    state: watch::Receiver<SessionState>,

    /// Variables registered at startup, in configuration order
    variables: Vec<Arc<VariableDescriptor>>,

    /// Binding for the configured standby frequency event
    standby: Option<EventBinding>,

    /// Cancellation token for stopping the driver
    cancel: CancellationToken,

    task: Option<JoinHandle<Result<DriverExit>>>,
}

impl BridgeConnection {
    /// Register the configured variables, bind the standby event and start
    /// the control loop.
    ///
    /// Any failure before the loop starts is a setup failure: the transport
    /// is closed and the error is returned.
    pub async fn start<T: Transport>(transport: T, config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        info!("Starting bridge session '{}'", config.client_name);

        let mut session = Session::new(transport);
        let (variables, standby) = match setup(&mut session, config).await {
            Ok(setup) => setup,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!("Failed to close transport after setup failure: {}", close_err);
                }
                return Err(BridgeError::setup_failed_with_source(
                    "initial registration failed",
                    Box::new(e),
                ));
            }
        };

        let channels = Driver::spawn(session, DriverSettings::from(config));
        let events = channels.events.resubscribe();
        info!(
            "Bridge started with {} variables{}",
            variables.len(),
            if standby.is_some() { " and a standby event" } else { "" }
        );

        Ok(Self {
            commands: channels.commands,
            first_events: Mutex::new(Some(channels.events)),
            events,
            state: channels.state,
            variables,
            standby,
            cancel: channels.cancel,
            task: Some(channels.task),
        })
    }

    /// Bridge events. Ends after `Disconnected`.
    ///
    /// The first call replays everything since the driver started (up to
    /// `event_capacity`); later calls see events from now on.
    pub fn events(&self) -> BoxStream<'static, BridgeEvent> {
        BroadcastStream::new(self.subscribe_events())
            .filter_map(|event| async move {
                match event {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged, skipped {} events", skipped);
                        None
                    }
                }
            })
            .boxed()
    }

    /// Every reported sample, for all variables.
    pub fn samples(&self) -> BoxStream<'static, SampleReport> {
        self.events()
            .filter_map(|event| async move {
                match event {
                    BridgeEvent::Sample(report) => Some(report),
                    _ => None,
                }
            })
            .boxed()
    }

    /// Samples of one variable, optionally throttled (latest value wins).
    pub fn samples_for(&self, name: &str, rate: UpdateRate) -> BoxStream<'static, SampleReport> {
        let name = name.to_string();
        let samples = self.samples().filter(move |report| {
            let keep = report.name() == name;
            async move { keep }
        });

        match rate.throttle_interval() {
            None => samples.boxed(),
            Some(interval) => samples.throttle(interval).boxed(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Current state, then every change.
    pub fn state_changes(&self) -> impl Stream<Item = SessionState> + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Wait for the open frame. Fails if the session closes first.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| *s != SessionState::Connecting).await.map(|s| *s);
        match reached {
            Ok(SessionState::Connected) => Ok(()),
            _ => Err(BridgeError::Closed),
        }
    }

    /// Resolves once the session is closed, for whatever reason.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }

    pub fn variables(&self) -> &[Arc<VariableDescriptor>] {
        &self.variables
    }

    pub fn standby(&self) -> Option<&EventBinding> {
        self.standby.as_ref()
    }

    pub async fn register_variable(
        &self,
        name: &str,
        unit: &str,
        data_type: DataType,
    ) -> Result<Arc<VariableDescriptor>> {
        let (name, unit) = (name.to_string(), unit.to_string());
        self.request(|reply| Command::Register { name, unit, data_type, reply }).await
    }

    pub async fn subscribe(
        &self,
        definition: DefinitionId,
        target: ObjectId,
        delivery: DeliveryMode,
    ) -> Result<Subscription> {
        self.request(|reply| Command::Subscribe { definition, target, delivery, reply }).await
    }

    pub async fn bind_event(
        &self,
        sim_event: &str,
        encoding: FrequencyEncoding,
        priority: u32,
    ) -> Result<EventBinding> {
        let sim_event = sim_event.to_string();
        self.request(|reply| Command::BindEvent { sim_event, encoding, priority, reply }).await
    }

    /// Send `frequency` through a bound event.
    pub async fn set_frequency(
        &self,
        event: EventId,
        frequency: Frequency,
    ) -> Result<FrequencyCommand> {
        self.request(|reply| Command::Transmit { event, frequency, reply }).await
    }

    /// Send `frequency` through the standby event bound at startup.
    pub async fn set_standby(&self, frequency: Frequency) -> Result<FrequencyCommand> {
        let binding = self
            .standby
            .as_ref()
            .ok_or_else(|| BridgeError::config_error("no standby event configured"))?;
        self.set_frequency(binding.event, frequency).await
    }

    /// Stop the driver and wait for it to close the transport.
    pub async fn shutdown(mut self) -> Result<DriverExit> {
        info!("Shutting down bridge");
        self.cancel.cancel();

        let task = self.task.take().ok_or_else(|| BridgeError::channel_closed("driver task"))?;
        task.await.map_err(|e| BridgeError::channel_closed(format!("driver task failed: {}", e)))?
    }

    fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        let first = self.first_events.lock().unwrap_or_else(|p| p.into_inner()).take();
        first.unwrap_or_else(|| self.events.resubscribe())
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<R>>) -> Command,
    ) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await.map_err(|_| BridgeError::Closed)?;
        response.await.map_err(|_| BridgeError::Closed)?
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        debug!("Dropping bridge connection");
        self.cancel.cancel();
    }
}

async fn setup<T: Transport>(
    session: &mut Session<T>,
    config: &BridgeConfig,
) -> Result<(Vec<Arc<VariableDescriptor>>, Option<EventBinding>)> {
    let mut variables = Vec::with_capacity(config.variables.len());
    for variable in &config.variables {
        let descriptor =
            session.register_variable(&variable.name, &variable.unit, variable.data_type).await?;
        session.subscribe(descriptor.definition, ObjectId::USER, config.delivery).await?;
        variables.push(descriptor);
    }

    let standby = match &config.standby_event {
        Some(sim_event) => Some(
            session
                .bind_event(sim_event, config.standby_encoding, config.standby_priority)
                .await?,
        ),
        None => None,
    };

    Ok((variables, standby))
}
