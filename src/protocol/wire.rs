//! Inbound frame parsing

use tracing::trace;

use crate::types::{DefinitionId, ExceptionCode, ObjectId, RequestId};
use crate::{BridgeError, Result};

/// Size of the common frame header
pub const HEADER_SIZE: usize = 12;
/// Size of an exception frame
pub const EXCEPTION_FRAME_SIZE: usize = 24;
/// Offset of the first datum byte in object-data frames
pub const OBJECT_DATA_HEADER_SIZE: usize = 40;

/// Discriminant tags (`SIMCONNECT_RECV_ID`) handled by the bridge.
pub mod recv_id {
    pub const NULL: u32 = 0;
    pub const EXCEPTION: u32 = 1;
    pub const OPEN: u32 = 2;
    pub const QUIT: u32 = 3;
    pub const EVENT: u32 = 4;
    pub const SIMOBJECT_DATA: u32 = 8;
    pub const SIMOBJECT_DATA_BYTYPE: u32 = 9;
}

/// Common header carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared total frame size in bytes
    pub size: u32,
    pub version: u32,
    /// Discriminant tag, see [`recv_id`]
    pub id: u32,
}

impl FrameHeader {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let size = parse_u32_le(frame, 0, "frame header")?;
        let version = parse_u32_le(frame, 4, "frame header")?;
        let id = parse_u32_le(frame, 8, "frame header")?;
        Ok(Self { size, version, id })
    }
}

/// Object-data payload, borrowed from the frame it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectData<'a> {
    pub request: RequestId,
    pub object: ObjectId,
    pub definition: DefinitionId,
    pub flags: u32,
    pub entry_number: u32,
    pub out_of: u32,
    pub define_count: u32,
    /// Datum bytes following the fixed header, bounded by the declared size
    pub data: &'a [u8],
}

/// One classified dispatch frame.
///
/// Borrows from the frame buffer, so it cannot outlive the decode step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchMessage<'a> {
    Null,
    Open,
    Quit,
    Exception { code: ExceptionCode, send_id: u32, index: u32 },
    SimObjectData(ObjectData<'a>),
    SimObjectDataByType(ObjectData<'a>),
    /// Tag outside the handled subset; callers skip it
    Unknown { id: u32 },
}

impl<'a> DispatchMessage<'a> {
    /// Classify a frame by its tag and parse the fields that tag defines.
    ///
    /// The declared size is checked against the buffer before anything past
    /// the header is read; bytes beyond the declared size are ignored.
    pub fn parse(frame: &'a [u8]) -> Result<Self> {
        let header = FrameHeader::parse(frame)?;
        let declared = header.size as usize;

        if declared < HEADER_SIZE {
            return Err(BridgeError::parse_error(
                "frame header",
                format!(
                    "declared size {} is smaller than the {} byte header",
                    declared, HEADER_SIZE
                ),
            ));
        }
        if declared > frame.len() {
            return Err(BridgeError::parse_error(
                "frame header",
                format!("declared size {} exceeds buffer length {}", declared, frame.len()),
            ));
        }

        let frame = &frame[..declared];
        trace!(id = header.id, size = declared, version = header.version, "Parsing dispatch frame");

        let message = match header.id {
            recv_id::NULL => DispatchMessage::Null,
            recv_id::OPEN => DispatchMessage::Open,
            recv_id::QUIT => DispatchMessage::Quit,
            recv_id::EXCEPTION => {
                require_len(frame, EXCEPTION_FRAME_SIZE, "exception frame")?;
                DispatchMessage::Exception {
                    code: ExceptionCode::from_raw(parse_u32_le(frame, 12, "exception frame")?),
                    send_id: parse_u32_le(frame, 16, "exception frame")?,
                    index: parse_u32_le(frame, 20, "exception frame")?,
                }
            }
            recv_id::SIMOBJECT_DATA => DispatchMessage::SimObjectData(parse_object_data(frame)?),
            recv_id::SIMOBJECT_DATA_BYTYPE => {
                DispatchMessage::SimObjectDataByType(parse_object_data(frame)?)
            }
            id => DispatchMessage::Unknown { id },
        };

        Ok(message)
    }
}

fn parse_object_data(frame: &[u8]) -> Result<ObjectData<'_>> {
    const CONTEXT: &str = "object data frame";
    require_len(frame, OBJECT_DATA_HEADER_SIZE, CONTEXT)?;

    Ok(ObjectData {
        request: RequestId::new(parse_u32_le(frame, 12, CONTEXT)?),
        object: ObjectId(parse_u32_le(frame, 16, CONTEXT)?),
        definition: DefinitionId::new(parse_u32_le(frame, 20, CONTEXT)?),
        flags: parse_u32_le(frame, 24, CONTEXT)?,
        entry_number: parse_u32_le(frame, 28, CONTEXT)?,
        out_of: parse_u32_le(frame, 32, CONTEXT)?,
        define_count: parse_u32_le(frame, 36, CONTEXT)?,
        data: &frame[OBJECT_DATA_HEADER_SIZE..],
    })
}

fn require_len(frame: &[u8], needed: usize, context: &str) -> Result<()> {
    if frame.len() < needed {
        return Err(BridgeError::parse_error(
            context,
            format!("frame is {} bytes, need at least {}", frame.len(), needed),
        ));
    }
    Ok(())
}

fn parse_u32_le(data: &[u8], offset: usize, context: &str) -> Result<u32> {
    let bytes = data.get(offset..offset + 4).ok_or_else(|| {
        BridgeError::parse_error(
            context,
            format!(
                "Insufficient data for u32 at offset {} (need 4 bytes, have {})",
                offset,
                data.len().saturating_sub(offset)
            ),
        )
    })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
