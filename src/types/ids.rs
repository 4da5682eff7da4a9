//! Protocol identifier handles and their allocator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value the protocol treats as "unused" in identifier slots.
pub const UNUSED: u32 = u32::MAX;

/// First value handed out in every namespace. 0 is reserved ("no group").
const FIRST_ID: u32 = 1;

macro_rules! protocol_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw protocol value.
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw value as sent on the wire.
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> u32 {
                id.0
            }
        }
    };
}

protocol_id!(
    /// Handle for a named group of simulation variables read as a unit.
    DefinitionId,
    "def"
);
protocol_id!(
    /// Handle correlating a data request with its response frames.
    RequestId,
    "req"
);
protocol_id!(
    /// Handle for a client event mapped onto a simulation event.
    EventId,
    "event"
);
protocol_id!(
    /// Handle for a notification group that events are transmitted through.
    GroupId,
    "group"
);

/// The four independent identifier namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Definition,
    Request,
    Event,
    Group,
}

/// Issues monotonically increasing identifiers per namespace.
///
/// One allocator lives in each [`Session`](crate::session::Session), so ids
/// are unique for the lifetime of a connection. Allocation takes `&mut self`;
/// sharing an allocator across threads needs external synchronization.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: [u32; 4],
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: [FIRST_ID; 4] }
    }

    /// Allocate the next raw value in `namespace`.
    ///
    /// Never returns 0 or [`UNUSED`]. After exhausting the `u32` range the
    /// counter restarts at the base value.
    pub fn allocate(&mut self, namespace: Namespace) -> u32 {
        let slot = &mut self.next[namespace as usize];
        let id = *slot;
        *slot = match id.checked_add(1) {
            Some(next) if next != UNUSED => next,
            _ => FIRST_ID,
        };
        id
    }

    pub fn allocate_definition(&mut self) -> DefinitionId {
        DefinitionId(self.allocate(Namespace::Definition))
    }

    pub fn allocate_request(&mut self) -> RequestId {
        RequestId(self.allocate(Namespace::Request))
    }

    pub fn allocate_event(&mut self) -> EventId {
        EventId(self.allocate(Namespace::Event))
    }

    pub fn allocate_group(&mut self) -> GroupId {
        GroupId(self.allocate(Namespace::Group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_independent() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate_definition().raw(), 1);
        assert_eq!(ids.allocate_definition().raw(), 2);
        assert_eq!(ids.allocate_request().raw(), 1);
        assert_eq!(ids.allocate_event().raw(), 1);
        assert_eq!(ids.allocate_group().raw(), 1);
        assert_eq!(ids.allocate_definition().raw(), 3);
    }

    #[test]
    fn group_zero_is_never_issued() {
        let mut ids = IdAllocator::new();
        let groups: Vec<_> = (0..100).map(|_| ids.allocate_group()).collect();
        assert!(groups.iter().all(|g| g.raw() != 0));
    }

    #[test]
    fn wraps_without_issuing_sentinels() {
        let mut ids = IdAllocator { next: [UNUSED - 1; 4] };
        assert_eq!(ids.allocate(Namespace::Request), UNUSED - 1);
        assert_eq!(ids.allocate(Namespace::Request), FIRST_ID);
    }

    #[test]
    fn display_names_the_namespace() {
        assert_eq!(DefinitionId::new(4).to_string(), "def#4");
        assert_eq!(GroupId::new(2).to_string(), "group#2");
    }
}
