//! Dispatch decoder
//!
//! Classifies one dispatch frame and turns it into a [`DispatchEvent`].
//! Object-data frames are correlated to registered variables through the
//! [`VariableRegistry`] and filtered through the [`ChangeCache`].
//!
//! Tags outside the handled subset decode to [`DispatchEvent::Ignored`] and
//! never touch the cache.

use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace, warn};

use crate::cache::ChangeCache;
use crate::protocol::{DispatchMessage, ObjectData};
use crate::registry::VariableRegistry;
use crate::types::{
    DecodedSample, DefinitionId, ExceptionCode, RequestId, SampleReport, VariableDescriptor,
};
use crate::{BridgeError, Result};

/// Outcome of decoding one frame.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// The connection is open
    Connected,
    /// The simulation is shutting the connection down
    Quit,
    /// The simulation rejected a request; the session keeps running
    Exception { code: ExceptionCode, send_id: u32, index: u32 },
    /// A changed value for a registered variable
    Sample(SampleReport),
    /// A value identical to the last one seen
    Unchanged { definition: DefinitionId },
    /// Data for a definition this session never registered
    Unregistered { definition: DefinitionId, request: RequestId },
    /// Null or unrecognized tag
    Ignored { id: u32 },
    /// A frame that failed validation and was skipped
    Malformed { reason: String },
}

impl DispatchEvent {
    /// Whether the decode loop must stop after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchEvent::Quit)
    }
}

/// Stateful decoder; owns the data frame counter that numbers reports.
#[derive(Debug, Default)]
pub struct DispatchDecoder {
    sequence: u64,
    frames: u64,
}

impl DispatchDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame. Errors are returned only for malformed frames.
    pub fn decode(
        &mut self,
        frame: &[u8],
        registry: &VariableRegistry,
        cache: &mut ChangeCache,
    ) -> Result<DispatchEvent> {
        self.frames += 1;

        let event = match DispatchMessage::parse(frame)? {
            DispatchMessage::Open => {
                debug!("Connection open");
                DispatchEvent::Connected
            }
            DispatchMessage::Quit => {
                debug!("Simulation quit");
                DispatchEvent::Quit
            }
            DispatchMessage::Exception { code, send_id, index } => {
                warn!(%code, send_id, index, "Simulation exception");
                DispatchEvent::Exception { code, send_id, index }
            }
            DispatchMessage::SimObjectData(data) | DispatchMessage::SimObjectDataByType(data) => {
                self.sequence += 1;
                self.decode_object_data(data, registry, cache)?
            }
            DispatchMessage::Null => DispatchEvent::Ignored { id: 0 },
            DispatchMessage::Unknown { id } => {
                trace!(id, "Ignoring unhandled dispatch tag");
                DispatchEvent::Ignored { id }
            }
        };

        Ok(event)
    }

    /// Number of frames decoded so far, including ignored ones.
    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }

    /// Object-data frames seen so far, repeats included. Reports carry the
    /// value this had when they were produced.
    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }

    fn decode_object_data(
        &mut self,
        data: ObjectData<'_>,
        registry: &VariableRegistry,
        cache: &mut ChangeCache,
    ) -> Result<DispatchEvent> {
        let Some(variable) = registry.lookup(data.definition) else {
            debug!(
                definition = %data.definition,
                request = %data.request,
                "Data for unregistered definition"
            );
            return Ok(DispatchEvent::Unregistered {
                definition: data.definition,
                request: data.request,
            });
        };

        let sample = read_sample(&data, variable)?;

        if !cache.observe(sample.definition, sample.value) {
            trace!(definition = %sample.definition, value = sample.value, "Unchanged value");
            return Ok(DispatchEvent::Unchanged { definition: sample.definition });
        }

        trace!(
            definition = %sample.definition,
            name = %variable.name,
            value = sample.value,
            sequence = self.sequence,
            "Value changed"
        );

        Ok(DispatchEvent::Sample(SampleReport {
            variable: Arc::clone(variable),
            sample,
            sequence: self.sequence,
        }))
    }
}

/// Read the single datum that follows the fixed object-data header.
fn read_sample(data: &ObjectData<'_>, variable: &VariableDescriptor) -> Result<DecodedSample> {
    let width = variable.data_type.size();
    let value = data
        .data
        .get(..width)
        .and_then(|bytes| variable.data_type.read_f64(bytes))
        .ok_or_else(|| {
            BridgeError::parse_error(
                "object data frame",
                format!(
                    "{} needs {} data bytes for {:?}, frame carries {}",
                    variable.definition,
                    width,
                    variable.data_type,
                    data.data.len()
                ),
            )
        })?;

    Ok(DecodedSample {
        definition: data.definition,
        request: data.request,
        object: data.object,
        value,
        received_at: SystemTime::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuilder, recv_id};
    use crate::types::DataType;

    fn setup() -> (DispatchDecoder, VariableRegistry, ChangeCache) {
        let mut registry = VariableRegistry::new();
        registry.insert(DefinitionId::new(1), "COM STANDBY FREQUENCY:1", "MHz", DataType::Float64);
        (DispatchDecoder::new(), registry, ChangeCache::new())
    }

    fn sample_frame(value: f64) -> Vec<u8> {
        FrameBuilder::object_data(RequestId::new(1), DefinitionId::new(1), value)
    }

    #[test]
    fn lifecycle_frames() {
        let (mut decoder, registry, mut cache) = setup();
        let open = decoder.decode(&FrameBuilder::open(), &registry, &mut cache).unwrap();
        let quit = decoder.decode(&FrameBuilder::quit(), &registry, &mut cache).unwrap();

        assert!(matches!(open, DispatchEvent::Connected));
        assert!(!open.is_terminal());
        assert!(quit.is_terminal());
    }

    #[test]
    fn exception_is_not_terminal() {
        let (mut decoder, registry, mut cache) = setup();
        let frame = FrameBuilder::exception(7, 3, 1);
        let event = decoder.decode(&frame, &registry, &mut cache).unwrap();

        assert!(matches!(
            event,
            DispatchEvent::Exception { code: ExceptionCode::NameUnrecognized, send_id: 3, index: 1 }
        ));
        assert!(!event.is_terminal());
    }

    #[test]
    fn duplicate_values_are_suppressed() {
        let (mut decoder, registry, mut cache) = setup();

        let first = decoder.decode(&sample_frame(122.8), &registry, &mut cache).unwrap();
        let second = decoder.decode(&sample_frame(122.8), &registry, &mut cache).unwrap();
        let third = decoder.decode(&sample_frame(123.45), &registry, &mut cache).unwrap();

        let DispatchEvent::Sample(first) = first else { panic!("expected sample") };
        assert!(matches!(second, DispatchEvent::Unchanged { .. }));
        let DispatchEvent::Sample(third) = third else { panic!("expected sample") };

        assert_eq!(first.value(), 122.8);
        assert_eq!(first.name(), "COM STANDBY FREQUENCY:1");
        assert_eq!(third.value(), 123.45);
        assert_eq!(first.sequence, 1);
        // the suppressed repeat still counts as a received update
        assert_eq!(third.sequence, 3);
        assert_eq!(decoder.last_sequence(), 3);
    }

    #[test]
    fn by_type_frames_decode_like_object_frames() {
        let (mut decoder, registry, mut cache) = setup();
        let frame =
            FrameBuilder::object_data_by_type(RequestId::new(4), DefinitionId::new(1), 118.0);

        let DispatchEvent::Sample(report) = decoder.decode(&frame, &registry, &mut cache).unwrap()
        else {
            panic!("expected sample")
        };
        assert_eq!(report.sample.request, RequestId::new(4));
        assert_eq!(report.value(), 118.0);
    }

    #[test]
    fn unknown_tags_leave_cache_untouched() {
        let (mut decoder, registry, mut cache) = setup();
        let frame = FrameBuilder::raw(recv_id::EVENT, &122.8f64.to_le_bytes());

        let event = decoder.decode(&frame, &registry, &mut cache).unwrap();
        assert!(matches!(event, DispatchEvent::Ignored { id: recv_id::EVENT }));
        assert!(cache.is_empty());
    }

    #[test]
    fn unregistered_definitions_are_reported() {
        let (mut decoder, registry, mut cache) = setup();
        let frame = FrameBuilder::object_data(RequestId::new(1), DefinitionId::new(99), 1.0);

        let event = decoder.decode(&frame, &registry, &mut cache).unwrap();
        assert!(matches!(event, DispatchEvent::Unregistered { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn short_datum_is_a_parse_error() {
        let (mut decoder, registry, mut cache) = setup();
        let frame = FrameBuilder::object_data_bytes(
            recv_id::SIMOBJECT_DATA,
            RequestId::new(1),
            crate::types::ObjectId::USER,
            DefinitionId::new(1),
            &[0u8; 4],
        );

        let err = decoder.decode(&frame, &registry, &mut cache).unwrap_err();
        assert!(matches!(err, BridgeError::Parse { .. }));
        assert!(cache.is_empty());
    }
}
