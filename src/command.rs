//! Command encoder
//!
//! Binds client events to named simulation events and transmits frequency
//! commands through them. An event is only usable once it has been mapped,
//! added to a notification group and that group's priority has been set;
//! the simulation silently drops anything sent before that.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::transport::{Transport, event_flags};
use crate::types::{EventId, Frequency, FrequencyEncoding, GroupId, IdAllocator, ObjectId};
use crate::{BridgeError, Result};

/// A client event that is ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventBinding {
    pub event: EventId,
    pub group: GroupId,
    pub sim_event: String,
    pub encoding: FrequencyEncoding,
    pub priority: u32,
}

/// One encoded frequency change, built per command and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyCommand {
    pub frequency: Frequency,
    pub encoding: FrequencyEncoding,
    pub event: EventId,
    pub group: GroupId,
    /// Wire payload produced by `encoding`
    pub payload: u32,
}

impl FrequencyCommand {
    pub fn new(binding: &EventBinding, frequency: Frequency) -> Result<Self> {
        let payload = binding.encoding.encode(frequency)?;
        Ok(Self {
            frequency,
            encoding: binding.encoding,
            event: binding.event,
            group: binding.group,
            payload,
        })
    }
}

/// Event bindings of one session.
#[derive(Debug, Default, Clone)]
pub struct CommandEncoder {
    bindings: HashMap<EventId, EventBinding>,
}

impl CommandEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `sim_event` to a fresh client event in a fresh group with `priority`.
    ///
    /// The three setup calls are issued in protocol order. If one fails the
    /// binding is not recorded and the error is returned as is.
    pub async fn bind<T: Transport>(
        &mut self,
        transport: &mut T,
        ids: &mut IdAllocator,
        sim_event: &str,
        encoding: FrequencyEncoding,
        priority: u32,
    ) -> Result<EventBinding> {
        let event = ids.allocate_event();
        let group = ids.allocate_group();

        transport.map_client_event_to_sim_event(event, sim_event).await?;
        transport.add_client_event_to_notification_group(group, event, false).await?;
        transport.set_notification_group_priority(group, priority).await?;

        let binding = EventBinding {
            event,
            group,
            sim_event: sim_event.to_string(),
            encoding,
            priority,
        };
        debug!(%event, %group, sim_event, %encoding, priority, "Event bound");
        self.bindings.insert(event, binding.clone());
        Ok(binding)
    }

    /// Encode `frequency` for `event` and send it to the user aircraft.
    ///
    /// Encoding failures come back as [`BridgeError::EncodingRejected`] with
    /// nothing sent; a failing transmit call becomes [`BridgeError::Transmit`].
    /// Neither is retried.
    pub async fn transmit_frequency<T: Transport>(
        &self,
        transport: &mut T,
        event: EventId,
        frequency: Frequency,
    ) -> Result<FrequencyCommand> {
        let binding = self.bindings.get(&event).ok_or(BridgeError::UnboundEvent(event))?;
        let command = FrequencyCommand::new(binding, frequency)?;

        transport
            .transmit_client_event(
                ObjectId::USER,
                command.event,
                command.payload,
                command.group.raw(),
                event_flags::DEFAULT,
            )
            .await
            .map_err(|e| {
                warn!(%event, error = %e, "Transmit failed");
                BridgeError::Transmit { event, reason: e.to_string() }
            })?;

        info!(
            sim_event = %binding.sim_event,
            %frequency,
            payload = format_args!("{:#010x}", command.payload),
            "Frequency sent"
        );
        Ok(command)
    }

    pub fn get(&self, event: EventId) -> Option<&EventBinding> {
        self.bindings.get(&event)
    }

    /// First binding for a simulation event name, if any.
    pub fn find(&self, sim_event: &str) -> Option<&EventBinding> {
        self.bindings
            .values()
            .filter(|b| b.sim_event == sim_event)
            .min_by_key(|b| b.event)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}
