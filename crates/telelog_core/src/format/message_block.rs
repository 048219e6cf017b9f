//! Message record encoding for `messages.tlm`.

use crate::error::{CoreError, CoreResult};
use crate::format::record::compute_crc32;
use crate::message::Message;
use telelog_storage::StorageBackend;

/// Magic bytes at the start of the message file.
pub const MESSAGE_MAGIC: [u8; 4] = *b"TLGM";

/// Current message block version.
pub const MESSAGE_VERSION: u16 = 2;

/// Size of the preamble: magic (4) + version (2).
pub const MESSAGE_PREAMBLE_SIZE: u64 = 6;

/// Length prefix size.
const LEN_SIZE: usize = 4;

/// CRC size.
const CRC_SIZE: usize = 4;

/// Fixed part of a record body: timestamp (8) + received_at (8) + tag_len (2) +
/// source_len (2).
const FIXED_BODY_SIZE: usize = 20;

/// Returns the preamble written at offset 0 of every message file.
#[must_use]
pub fn message_preamble() -> [u8; 6] {
    let mut preamble = [0u8; 6];
    preamble[0..4].copy_from_slice(&MESSAGE_MAGIC);
    preamble[4..6].copy_from_slice(&MESSAGE_VERSION.to_le_bytes());
    preamble
}

/// Checks the preamble of a message file.
///
/// # Errors
///
/// Returns `InvalidFormat` on bad magic or a future version.
pub fn validate_preamble(backend: &dyn StorageBackend) -> CoreResult<()> {
    if backend.size()? < MESSAGE_PREAMBLE_SIZE {
        return Err(CoreError::invalid_format("message file too short"));
    }
    let bytes = backend.read_at(0, MESSAGE_PREAMBLE_SIZE as usize)?;
    if bytes[0..4] != MESSAGE_MAGIC {
        return Err(CoreError::invalid_format("bad message file magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != MESSAGE_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported message file version {version}"
        )));
    }
    Ok(())
}

/// Encodes a message into a length-prefixed, checksummed record.
///
/// # Errors
///
/// Returns `InvalidArgument` if the tag or source exceed 65535 bytes or the
/// record exceeds the 4-byte length field.
pub fn encode_message(message: &Message) -> CoreResult<Vec<u8>> {
    let tag = message.tag().as_bytes();
    let source = message.source().as_bytes();
    let tag_len = u16::try_from(tag.len())
        .map_err(|_| CoreError::invalid_argument("tag longer than 65535 bytes"))?;
    let source_len = u16::try_from(source.len())
        .map_err(|_| CoreError::invalid_argument("source longer than 65535 bytes"))?;

    let body_len = FIXED_BODY_SIZE + tag.len() + source.len() + message.payload().len();
    let len = u32::try_from(body_len)
        .map_err(|_| CoreError::invalid_argument("message payload too large"))?;

    let mut buf = Vec::with_capacity(LEN_SIZE + body_len + CRC_SIZE);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&message.timestamp().to_le_bytes());
    buf.extend_from_slice(&message.received_at().to_le_bytes());
    buf.extend_from_slice(&tag_len.to_le_bytes());
    buf.extend_from_slice(tag);
    buf.extend_from_slice(&source_len.to_le_bytes());
    buf.extend_from_slice(source);
    buf.extend_from_slice(message.payload());

    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Reads and verifies the message record starting at `offset`.
///
/// # Errors
///
/// Returns a corruption error if the record extends past the end of the
/// file, fails its checksum, or is internally inconsistent.
pub fn decode_message_at(backend: &dyn StorageBackend, offset: u64) -> CoreResult<Message> {
    let size = backend.size()?;
    if offset < MESSAGE_PREAMBLE_SIZE || offset + LEN_SIZE as u64 > size {
        return Err(CoreError::package_corruption(format!(
            "message offset {offset} outside message file of {size} bytes"
        )));
    }

    let len_bytes = backend.read_at(offset, LEN_SIZE)?;
    let body_len =
        u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    let record_len = LEN_SIZE + body_len + CRC_SIZE;
    if offset + record_len as u64 > size {
        return Err(CoreError::package_corruption(format!(
            "message at offset {offset} extends beyond message file"
        )));
    }

    let record = backend.read_at(offset, record_len)?;
    let crc_at = LEN_SIZE + body_len;
    let stored = u32::from_le_bytes([
        record[crc_at],
        record[crc_at + 1],
        record[crc_at + 2],
        record[crc_at + 3],
    ]);
    let computed = compute_crc32(&record[..crc_at]);
    if stored != computed {
        return Err(CoreError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }

    decode_body(&record[LEN_SIZE..crc_at], offset)
}

fn decode_body(body: &[u8], offset: u64) -> CoreResult<Message> {
    let corrupt = || CoreError::package_corruption(format!("malformed message at offset {offset}"));

    if body.len() < FIXED_BODY_SIZE {
        return Err(corrupt());
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&body[0..8]);
    let timestamp = i64::from_le_bytes(ts);
    ts.copy_from_slice(&body[8..16]);
    let received_at = i64::from_le_bytes(ts);

    let mut pos = 16;
    let tag_len = u16::from_le_bytes([body[pos], body[pos + 1]]) as usize;
    pos += 2;
    let tag = body.get(pos..pos + tag_len).ok_or_else(corrupt)?;
    pos += tag_len;

    let len_bytes = body.get(pos..pos + 2).ok_or_else(corrupt)?;
    let source_len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    pos += 2;
    let source = body.get(pos..pos + source_len).ok_or_else(corrupt)?;
    pos += source_len;

    let tag = std::str::from_utf8(tag).map_err(|_| corrupt())?;
    let source = std::str::from_utf8(source).map_err(|_| corrupt())?;

    let message = Message::new(tag, source, timestamp, body[pos..].to_vec());
    Ok(message.with_received_at(received_at))
}
