//! Change-detection cache
//!
//! Holds the last value seen per definition and reports whether a new
//! observation differs from it. Comparison is bit-exact: the simulation
//! already quantizes values, so no epsilon is applied.

use std::collections::HashMap;

use crate::types::DefinitionId;

#[derive(Debug, Default, Clone)]
pub struct ChangeCache {
    last: HashMap<DefinitionId, u64>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `definition`, returning `true` if it should be reported.
    ///
    /// The first observation is always new. Afterwards an observation is new
    /// iff its bits differ from the stored value. The stored value always
    /// ends up equal to the most recently seen one.
    pub fn observe(&mut self, definition: DefinitionId, value: f64) -> bool {
        let bits = value.to_bits();
        match self.last.insert(definition, bits) {
            Some(previous) => previous != bits,
            None => true,
        }
    }

    /// Last value seen for `definition`.
    pub fn last(&self, definition: DefinitionId) -> Option<f64> {
        self.last.get(&definition).map(|bits| f64::from_bits(*bits))
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}
