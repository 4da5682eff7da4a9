//! Variable registry
//!
//! Remembers which name and unit each definition id was registered for, so
//! the decoder can turn an inbound definition id back into a variable.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{DataType, DefinitionId, VariableDescriptor};

/// Definition id to variable lookup table owned by a session.
#[derive(Debug, Default, Clone)]
pub struct VariableRegistry {
    variables: HashMap<DefinitionId, Arc<VariableDescriptor>>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registration and return its shared descriptor.
    ///
    /// Names are not deduplicated: registering the same name twice yields two
    /// independent entries under different ids.
    pub fn insert(
        &mut self,
        definition: DefinitionId,
        name: impl Into<String>,
        unit: impl Into<String>,
        data_type: DataType,
    ) -> Arc<VariableDescriptor> {
        let descriptor = Arc::new(VariableDescriptor {
            definition,
            name: name.into(),
            unit: unit.into(),
            data_type,
        });
        self.variables.insert(definition, Arc::clone(&descriptor));
        descriptor
    }

    pub fn lookup(&self, definition: DefinitionId) -> Option<&Arc<VariableDescriptor>> {
        self.variables.get(&definition)
    }

    /// First registration under `name`, in id order.
    pub fn lookup_name(&self, name: &str) -> Option<&Arc<VariableDescriptor>> {
        self.variables
            .values()
            .filter(|v| v.name == name)
            .min_by_key(|v| v.definition)
    }

    pub fn contains(&self, definition: DefinitionId) -> bool {
        self.variables.contains_key(&definition)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Registered variables in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<VariableDescriptor>> {
        let mut all: Vec<_> = self.variables.values().collect();
        all.sort_by_key(|v| v.definition);
        all.into_iter()
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdAllocator;
    use proptest::prelude::*;

    #[test]
    fn duplicate_names_get_independent_entries() {
        let mut ids = IdAllocator::new();
        let mut registry = VariableRegistry::new();

        let first = ids.allocate_definition();
        let second = ids.allocate_definition();
        registry.insert(first, "COM ACTIVE FREQUENCY:1", "MHz", DataType::Float64);
        registry.insert(second, "COM ACTIVE FREQUENCY:1", "MHz", DataType::Float64);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup_name("COM ACTIVE FREQUENCY:1").unwrap().definition, first);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut registry = VariableRegistry::new();
        registry.insert(DefinitionId::new(1), "A", "MHz", DataType::Float64);
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.lookup(DefinitionId::new(1)).is_none());
    }

    proptest! {
        #[test]
        fn reverse_lookup_yields_registered_pair(
            entries in prop::collection::vec(("[A-Z ]{1,24}(:[1-4])?", "[A-Za-z/]{1,8}"), 1..32)
        ) {
            let mut ids = IdAllocator::new();
            let mut registry = VariableRegistry::new();
            let mut issued = Vec::new();

            for (name, unit) in &entries {
                let id = ids.allocate_definition();
                registry.insert(id, name.clone(), unit.clone(), DataType::Float64);
                issued.push((id, name, unit));
            }

            for (id, name, unit) in issued {
                let found = registry.lookup(id).unwrap();
                prop_assert_eq!(&found.name, name);
                prop_assert_eq!(&found.unit, unit);
                prop_assert_eq!(found.definition, id);
            }
        }
    }
}
