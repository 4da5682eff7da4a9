//! SimConnect dispatch frame layout
//!
//! Bit-exact structures for the subset of inbound frames the bridge handles,
//! parsed with explicit little-endian reads and bounds checks. No frame is
//! ever reinterpreted in place.
//!
//! ## Frame Structure
//!
//! Every frame starts with a 12-byte header:
//!
//! | offset | field     |
//! |--------|-----------|
//! | 0      | `size`    |
//! | 4      | `version` |
//! | 8      | `id` (discriminant tag) |
//!
//! Exception frames append `exception`, `send_id`, `index` (offsets 12..24).
//! Object-data frames append `request_id`, `object_id`, `define_id`, `flags`,
//! `entry_number`, `out_of`, `define_count` (offsets 12..40) followed by the
//! raw datum bytes in registration order.

mod builder;
mod wire;

pub use builder::FrameBuilder;
pub use wire::{
    DispatchMessage, EXCEPTION_FRAME_SIZE, FrameHeader, HEADER_SIZE, OBJECT_DATA_HEADER_SIZE,
    ObjectData, recv_id,
};
