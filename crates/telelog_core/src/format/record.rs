//! Index record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::message::Timestamp;

/// Magic bytes carried by the index header.
pub const INDEX_MAGIC: [u8; 4] = *b"TLIX";

/// Current index format version.
pub const INDEX_VERSION: u16 = 1;

/// Envelope header: type (1) + length (4).
pub(crate) const ENVELOPE_HEADER_SIZE: usize = 5;

/// CRC size.
pub(crate) const CRC_SIZE: usize = 4;

/// Body of a footer: count (8) + start (8) + end (8).
const FOOTER_BODY_SIZE: usize = 24;

/// Encoded size of a footer record, envelope included.
pub const FOOTER_RECORD_SIZE: usize = ENVELOPE_HEADER_SIZE + FOOTER_BODY_SIZE + CRC_SIZE;

/// Type of index record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexRecordType {
    /// Package header.
    Header = 1,
    /// Tag dictionary entry.
    Tag = 2,
    /// One message's index entry.
    Entry = 3,
    /// Clean-close marker.
    Footer = 4,
}

impl IndexRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Header),
            2 => Some(Self::Tag),
            3 => Some(Self::Entry),
            4 => Some(Self::Footer),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A record in `index.tlx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRecord {
    /// First record of every package.
    Header {
        /// Format version the package was written with.
        version: u16,
        /// Creation time, nanoseconds since the Unix epoch.
        created_at: Timestamp,
        /// Package name (the directory name).
        name: String,
    },

    /// Binds a numeric id to a tag.
    Tag {
        /// Id used by subsequent entries.
        id: u16,
        /// Tag name.
        name: String,
    },

    /// Locates one message.
    Entry {
        /// Message timestamp.
        timestamp: Timestamp,
        /// Offset of the message record in `messages.tlm`.
        offset: u64,
        /// Tag id from a preceding `Tag` record.
        tag_id: u16,
    },

    /// Written once when the package is closed cleanly.
    Footer {
        /// Number of entries in the package.
        message_count: u64,
        /// Timestamp of the first entry (0 when empty).
        start_timestamp: Timestamp,
        /// Timestamp of the last entry (0 when empty).
        end_timestamp: Timestamp,
    },
}

impl IndexRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> IndexRecordType {
        match self {
            Self::Header { .. } => IndexRecordType::Header,
            Self::Tag { .. } => IndexRecordType::Tag,
            Self::Entry { .. } => IndexRecordType::Entry,
            Self::Footer { .. } => IndexRecordType::Footer,
        }
    }

    /// Serializes the record body (without envelope).
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Header {
                version,
                created_at,
                name,
            } => {
                buf.extend_from_slice(&INDEX_MAGIC);
                buf.extend_from_slice(&version.to_le_bytes());
                buf.extend_from_slice(&created_at.to_le_bytes());
                buf.extend_from_slice(name.as_bytes());
            }

            Self::Tag { id, name } => {
                buf.extend_from_slice(&id.to_le_bytes());
                buf.extend_from_slice(name.as_bytes());
            }

            Self::Entry {
                timestamp,
                offset,
                tag_id,
            } => {
                buf.extend_from_slice(&timestamp.to_le_bytes());
                buf.extend_from_slice(&offset.to_le_bytes());
                buf.extend_from_slice(&tag_id.to_le_bytes());
            }

            Self::Footer {
                message_count,
                start_timestamp,
                end_timestamp,
            } => {
                buf.extend_from_slice(&message_count.to_le_bytes());
                buf.extend_from_slice(&start_timestamp.to_le_bytes());
                buf.extend_from_slice(&end_timestamp.to_le_bytes());
            }
        }

        buf
    }

    /// Serializes the full record: envelope, body and CRC.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not fit the 4-byte length field.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let body = self.encode_body();
        let len = u32::try_from(body.len())
            .map_err(|_| CoreError::invalid_argument("index record too large"))?;

        let mut data = Vec::with_capacity(ENVELOPE_HEADER_SIZE + body.len() + CRC_SIZE);
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&body);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Deserializes a record body of the given type.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the body is malformed.
    pub fn decode_body(record_type: IndexRecordType, body: &[u8]) -> CoreResult<Self> {
        match record_type {
            IndexRecordType::Header => {
                if body.len() < 14 {
                    return Err(CoreError::package_corruption("header too short"));
                }
                if body[0..4] != INDEX_MAGIC {
                    return Err(CoreError::invalid_format("bad index magic"));
                }
                let version = u16::from_le_bytes([body[4], body[5]]);
                if version > INDEX_VERSION {
                    return Err(CoreError::invalid_format(format!(
                        "unsupported index version {version}"
                    )));
                }
                let created_at = read_i64(body, 6);
                let name = decode_utf8(&body[14..], "package name")?;
                Ok(Self::Header {
                    version,
                    created_at,
                    name,
                })
            }

            IndexRecordType::Tag => {
                if body.len() < 2 {
                    return Err(CoreError::package_corruption("tag record too short"));
                }
                let id = u16::from_le_bytes([body[0], body[1]]);
                let name = decode_utf8(&body[2..], "tag name")?;
                Ok(Self::Tag { id, name })
            }

            IndexRecordType::Entry => {
                if body.len() != 18 {
                    return Err(CoreError::package_corruption(format!(
                        "entry record has {} bytes, expected 18",
                        body.len()
                    )));
                }
                Ok(Self::Entry {
                    timestamp: read_i64(body, 0),
                    offset: read_u64(body, 8),
                    tag_id: u16::from_le_bytes([body[16], body[17]]),
                })
            }

            IndexRecordType::Footer => {
                if body.len() != FOOTER_BODY_SIZE {
                    return Err(CoreError::package_corruption(format!(
                        "footer record has {} bytes, expected {FOOTER_BODY_SIZE}",
                        body.len()
                    )));
                }
                Ok(Self::Footer {
                    message_count: read_u64(body, 0),
                    start_timestamp: read_i64(body, 8),
                    end_timestamp: read_i64(body, 16),
                })
            }
        }
    }

    /// Decodes one complete record (envelope included) from a byte slice.
    ///
    /// Used for the fixed-size footer at the end of the index file.
    ///
    /// # Errors
    ///
    /// Returns an error on short input, unknown type or CRC mismatch.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < ENVELOPE_HEADER_SIZE + CRC_SIZE {
            return Err(CoreError::package_corruption("index record too short"));
        }
        let record_type = IndexRecordType::from_byte(data[0]).ok_or_else(|| {
            CoreError::package_corruption(format!("unknown index record type {}", data[0]))
        })?;
        let len = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
        if data.len() != ENVELOPE_HEADER_SIZE + len + CRC_SIZE {
            return Err(CoreError::package_corruption("index record length mismatch"));
        }

        let body_end = ENVELOPE_HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            data[body_end],
            data[body_end + 1],
            data[body_end + 2],
            data[body_end + 3],
        ]);
        let computed = compute_crc32(&data[..body_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        Self::decode_body(record_type, &data[ENVELOPE_HEADER_SIZE..body_end])
    }
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn read_i64(buf: &[u8], at: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(bytes)
}

fn decode_utf8(bytes: &[u8], what: &str) -> CoreResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CoreError::package_corruption(format!("{what} is not valid UTF-8")))
}

/// Computes CRC32 checksum (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn record_type_bytes() {
        for t in [
            IndexRecordType::Header,
            IndexRecordType::Tag,
            IndexRecordType::Entry,
            IndexRecordType::Footer,
        ] {
            assert_eq!(IndexRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(IndexRecordType::from_byte(0), None);
        assert_eq!(IndexRecordType::from_byte(9), None);
    }

    #[test]
    fn footer_has_fixed_size() {
        let footer = IndexRecord::Footer {
            message_count: 3,
            start_timestamp: 100,
            end_timestamp: 300,
        };
        let bytes = footer.encode().unwrap();
        assert_eq!(bytes.len(), FOOTER_RECORD_SIZE);
        assert_eq!(IndexRecord::decode(&bytes).unwrap(), footer);
    }

    #[test]
    fn header_decodes_name_and_version() {
        let header = IndexRecord::Header {
            version: INDEX_VERSION,
            created_at: 1_700_000_000_000_000_000,
            name: "Rec_2026-10-18_09-30-12-104233".into(),
        };
        let bytes = header.encode().unwrap();
        assert_eq!(IndexRecord::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn future_header_version_is_rejected() {
        let header = IndexRecord::Header {
            version: INDEX_VERSION + 1,
            created_at: 0,
            name: "x".into(),
        };
        let bytes = header.encode().unwrap();
        assert!(matches!(
            IndexRecord::decode(&bytes),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn flipped_bit_fails_crc() {
        let entry = IndexRecord::Entry {
            timestamp: 5,
            offset: 6,
            tag_id: 0,
        };
        let mut bytes = entry.encode().unwrap();
        bytes[7] ^= 0x01;
        assert!(matches!(
            IndexRecord::decode(&bytes),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn entry_with_wrong_body_size_is_corrupt() {
        assert!(IndexRecord::decode_body(IndexRecordType::Entry, &[0u8; 10]).is_err());
        assert!(IndexRecord::decode_body(IndexRecordType::Tag, &[0u8; 1]).is_err());
        assert!(IndexRecord::decode_body(IndexRecordType::Header, b"TLIX").is_err());
    }
}
