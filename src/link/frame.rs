//! # MAVLink Framing
//!
//! Splits a serial byte stream into MAVLink v1/v2 frames. Header fields,
//! checksums and message bodies all come from the `mavlink` crate; this
//! module only finds frame boundaries in a buffered stream.
//!
//! **v1**: `0xFE len seq sysid compid msgid payload crc_lo crc_hi`
//! **v2**: `0xFD len incompat compat seq sysid compid msgid[3] payload crc_lo crc_hi [signature]`

use bytes::{Buf, BytesMut};
use mavlink::ardupilotmega::MavMessage;
use mavlink::peek_reader::PeekReader;
use mavlink::{
    read_v1_raw_message, read_v2_raw_message, MavHeader, MavlinkVersion, Message, MAV_STX,
    MAV_STX_V2,
};
use tracing::trace;

use crate::error::{BridgeError, Result};

/// v1 header length including start byte
const V1_HEADER_LEN: usize = 6;

/// v2 header length including start byte
const V2_HEADER_LEN: usize = 10;

/// Checksum length
const CRC_LEN: usize = 2;

/// v2 signature length
const SIGNATURE_LEN: usize = 13;

/// v2 incompat flag: frame is signed
const IFLAG_SIGNED: u8 = 0x01;

/// Frame protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVersion {
    V1,
    V2,
}

/// Validated frame with an unparsed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub version: FrameVersion,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u32,
    pub payload: Vec<u8>,
}

impl RawFrame {
    /// Parse the payload into a dialect message
    pub fn parse(&self) -> Result<MavMessage> {
        let version = match self.version {
            FrameVersion::V1 => MavlinkVersion::V1,
            FrameVersion::V2 => MavlinkVersion::V2,
        };

        MavMessage::parse(version, self.message_id, &self.payload).map_err(|e| {
            BridgeError::Protocol(format!("Failed to parse message {}: {:?}", self.message_id, e))
        })
    }
}

/// Total frame length once enough of the header is buffered
///
/// Returns `None` while the length cannot yet be determined.
fn frame_len(buf: &[u8]) -> Option<usize> {
    match *buf.first()? {
        MAV_STX => {
            let len = *buf.get(1)? as usize;
            Some(V1_HEADER_LEN + len + CRC_LEN)
        }
        MAV_STX_V2 => {
            let len = *buf.get(1)? as usize;
            let incompat = *buf.get(2)?;
            let signature = if incompat & IFLAG_SIGNED != 0 { SIGNATURE_LEN } else { 0 };
            Some(V2_HEADER_LEN + len + CRC_LEN + signature)
        }
        _ => None,
    }
}

fn crc_mismatch(frame: &[u8]) -> BridgeError {
    BridgeError::Protocol(format!(
        "CRC mismatch on {}-byte frame starting 0x{:02X}",
        frame.len(),
        frame[0]
    ))
}

/// Decode one complete MAVLink frame
///
/// # Arguments
///
/// * `frame` - Complete frame bytes, starting at the start byte
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short
/// - Start byte is unknown
/// - CRC check fails
pub fn decode_frame(frame: &[u8]) -> Result<RawFrame> {
    let expected = frame_len(frame)
        .ok_or_else(|| BridgeError::Protocol("Frame too short or invalid start byte".to_string()))?;

    if frame.len() < expected {
        return Err(BridgeError::Protocol(format!(
            "Frame too short: expected {} bytes, got {}",
            expected,
            frame.len()
        )));
    }

    let frame = &frame[..expected];
    let mut reader = PeekReader::new(frame);

    // The crate readers rescan past a bad checksum, so a frame found further
    // in counts as a mismatch of this one
    let decoded = if frame[0] == MAV_STX {
        let raw = read_v1_raw_message::<MavMessage, _>(&mut reader)
            .map_err(|_| crc_mismatch(frame))?;
        if raw.raw_bytes().len() != expected {
            return Err(crc_mismatch(frame));
        }

        RawFrame {
            version: FrameVersion::V1,
            sequence: raw.sequence(),
            system_id: raw.system_id(),
            component_id: raw.component_id(),
            message_id: raw.message_id().into(),
            payload: raw.payload().to_vec(),
        }
    } else {
        let raw = read_v2_raw_message::<MavMessage, _>(&mut reader)
            .map_err(|_| crc_mismatch(frame))?;
        if raw.raw_bytes().len() != expected {
            return Err(crc_mismatch(frame));
        }

        RawFrame {
            version: FrameVersion::V2,
            sequence: raw.sequence(),
            system_id: raw.system_id(),
            component_id: raw.component_id(),
            message_id: raw.message_id(),
            payload: raw.payload().to_vec(),
        }
    };

    Ok(decoded)
}

/// Serialize a message as a MAVLink v2 frame
pub fn encode_message(header: MavHeader, message: &MavMessage) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(V2_HEADER_LEN + 255 + CRC_LEN);
    mavlink::write_v2_msg(&mut out, header, message)
        .map_err(|e| BridgeError::Protocol(format!("Failed to encode message: {:?}", e)))?;
    Ok(out)
}

/// Incremental frame splitter over a byte stream
///
/// Garbage between frames and frames failing the checksum are skipped by
/// resynchronizing on the next start byte.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    rejected: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of candidate frames dropped for bad checksums
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next valid frame, `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            match self.buf.iter().position(|&b| b == MAV_STX || b == MAV_STX_V2) {
                Some(start) => self.buf.advance(start),
                None => {
                    self.buf.clear();
                    return None;
                }
            }

            let total = frame_len(&self.buf)?;
            if self.buf.len() < total {
                return None;
            }

            match decode_frame(&self.buf[..total]) {
                Ok(frame) => {
                    self.buf.advance(total);
                    return Some(frame);
                }
                Err(e) => {
                    trace!("Skipping candidate frame: {}", e);
                    self.rejected += 1;
                    self.buf.advance(1);
                }
            }
        }
    }
}
