//! Decoded values and change reports

use std::sync::Arc;
use std::time::SystemTime;

use super::{DefinitionId, ObjectId, RequestId, VariableDescriptor};

/// A value decoded from one object-data frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    pub definition: DefinitionId,
    pub request: RequestId,
    pub object: ObjectId,
    pub value: f64,
    pub received_at: SystemTime,
}

/// A sample that passed change detection, ready for the caller.
#[derive(Debug, Clone)]
pub struct SampleReport {
    pub variable: Arc<VariableDescriptor>,
    pub sample: DecodedSample,
    /// Data frames received in this session when this report was produced,
    /// suppressed repeats included. Strictly increasing across reports.
    pub sequence: u64,
}

impl SampleReport {
    pub fn name(&self) -> &str {
        &self.variable.name
    }

    pub fn unit(&self) -> &str {
        &self.variable.unit
    }

    pub fn value(&self) -> f64 {
        self.sample.value
    }
}
