//! Frame construction for scripted transports, tests and benchmarks

use super::wire::{HEADER_SIZE, OBJECT_DATA_HEADER_SIZE, recv_id};
use crate::types::{DefinitionId, ObjectId, RequestId};

/// Version written into built frame headers.
const FRAME_VERSION: u32 = 4;

/// Builds dispatch frames in the exact layout the simulation sends.
pub struct FrameBuilder;

impl FrameBuilder {
    /// Frame with an arbitrary tag and payload.
    pub fn raw(id: u32, payload: &[u8]) -> Vec<u8> {
        let size = (HEADER_SIZE + payload.len()) as u32;
        let mut frame = Vec::with_capacity(size as usize);
        frame.extend_from_slice(&size.to_le_bytes());
        frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        frame.extend_from_slice(&id.to_le_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    pub fn open() -> Vec<u8> {
        Self::raw(recv_id::OPEN, &[])
    }

    pub fn quit() -> Vec<u8> {
        Self::raw(recv_id::QUIT, &[])
    }

    pub fn exception(code: u32, send_id: u32, index: u32) -> Vec<u8> {
        Self::raw(recv_id::EXCEPTION, &words(&[code, send_id, index]))
    }

    /// Object-data frame for a single `f64` datum on the user object.
    pub fn object_data(request: RequestId, definition: DefinitionId, value: f64) -> Vec<u8> {
        Self::object_data_bytes(
            recv_id::SIMOBJECT_DATA,
            request,
            ObjectId::USER,
            definition,
            &value.to_le_bytes(),
        )
    }

    /// Same as [`object_data`](Self::object_data) with the by-type tag.
    pub fn object_data_by_type(
        request: RequestId,
        definition: DefinitionId,
        value: f64,
    ) -> Vec<u8> {
        Self::object_data_bytes(
            recv_id::SIMOBJECT_DATA_BYTYPE,
            request,
            ObjectId::USER,
            definition,
            &value.to_le_bytes(),
        )
    }

    /// Object-data frame with caller-supplied datum bytes.
    ///
    /// `define_count` is derived assuming 8-byte datums.
    pub fn object_data_bytes(
        id: u32,
        request: RequestId,
        object: ObjectId,
        definition: DefinitionId,
        data: &[u8],
    ) -> Vec<u8> {
        let define_count = data.len().div_ceil(8) as u32;
        let mut payload = Vec::with_capacity(OBJECT_DATA_HEADER_SIZE - HEADER_SIZE + data.len());
        payload.extend_from_slice(&words(&[
            request.raw(),
            object.0,
            definition.raw(),
            0, // flags
            1, // entry number
            1, // out of
            define_count,
        ]));
        payload.extend_from_slice(data);
        Self::raw(id, &payload)
    }
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
