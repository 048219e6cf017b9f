//! Streaming index record iterator.
//!
//! Reads `index.tlx` record by record through a bounded buffer, so opening a
//! large package never loads the raw index file into memory at once.

use crate::error::{CoreError, CoreResult};
use crate::format::record::{
    compute_crc32, IndexRecord, IndexRecordType, CRC_SIZE, ENVELOPE_HEADER_SIZE,
};
use telelog_storage::StorageBackend;

/// Read buffer size for streaming iteration.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A streaming iterator over index records.
///
/// # Error Handling
///
/// - Truncated records (incomplete envelope or body) end the iteration
/// - CRC mismatches return an error immediately
/// - Unknown record types return a corruption error
///
/// After the iterator is exhausted, [`IndexRecordIterator::valid_len`] is the
/// offset just past the last complete record.
pub struct IndexRecordIterator<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    /// Offset of the next record to read.
    current_offset: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    finished: bool,
}

impl<'a> IndexRecordIterator<'a> {
    /// Creates a new iterator starting at `start_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend, start_offset: u64) -> CoreResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            current_offset: start_offset,
            buffer: vec![0u8; READ_BUFFER_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
            finished: false,
        })
    }

    /// Offset just past the last record returned so far.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.current_offset
    }

    /// Total size of the index file when iteration started.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Ensures at least `min_bytes` are buffered from the current position.
    ///
    /// Returns `false` if the file ends first. Grows the buffer for records
    /// larger than the default buffer size.
    fn ensure_buffered(&mut self, min_bytes: usize) -> CoreResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(true);
        }

        let unread_in_file =
            self.total_size.saturating_sub(self.current_offset) as usize - available;
        if unread_in_file < min_bytes - available {
            return Ok(false);
        }

        if self.buffer_pos > 0 && available > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_len = available;
        self.buffer_pos = 0;

        if min_bytes > self.buffer.len() {
            self.buffer.resize(min_bytes.next_power_of_two(), 0);
        }

        let to_read = std::cmp::min(self.buffer.len() - self.buffer_len, unread_in_file);
        if to_read > 0 {
            let read_offset = self.current_offset + self.buffer_len as u64;
            let data = self.backend.read_at(read_offset, to_read)?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        Ok(self.buffer_len - self.buffer_pos >= min_bytes)
    }

    fn read_next_record(&mut self) -> CoreResult<Option<(u64, IndexRecord)>> {
        let record_offset = self.current_offset;

        if !self.ensure_buffered(ENVELOPE_HEADER_SIZE)? {
            return Ok(None);
        }

        let envelope = &self.buffer[self.buffer_pos..self.buffer_pos + ENVELOPE_HEADER_SIZE];
        let type_byte = envelope[0];
        let record_type = IndexRecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::package_corruption(format!(
                "unknown index record type {type_byte} at offset {record_offset}"
            ))
        })?;
        let body_len =
            u32::from_le_bytes([envelope[1], envelope[2], envelope[3], envelope[4]]) as usize;
        let total_len = ENVELOPE_HEADER_SIZE + body_len + CRC_SIZE;

        if !self.ensure_buffered(total_len)? {
            return Ok(None);
        }

        let start = self.buffer_pos;
        let body_end = start + ENVELOPE_HEADER_SIZE + body_len;
        let stored_crc = u32::from_le_bytes([
            self.buffer[body_end],
            self.buffer[body_end + 1],
            self.buffer[body_end + 2],
            self.buffer[body_end + 3],
        ]);
        let computed_crc = compute_crc32(&self.buffer[start..body_end]);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let record = IndexRecord::decode_body(
            record_type,
            &self.buffer[start + ENVELOPE_HEADER_SIZE..body_end],
        )?;

        self.buffer_pos += total_len;
        self.current_offset += total_len as u64;

        Ok(Some((record_offset, record)))
    }
}

impl Iterator for IndexRecordIterator<'_> {
    type Item = CoreResult<(u64, IndexRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next_record() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telelog_storage::InMemoryBackend;

    fn entry(i: u64) -> IndexRecord {
        IndexRecord::Entry {
            timestamp: i as i64 * 10,
            offset: 6 + i * 40,
            tag_id: (i % 3) as u16,
        }
    }

    fn backend_with(records: &[IndexRecord]) -> InMemoryBackend {
        let mut backend = InMemoryBackend::new();
        for record in records {
            backend.append(&record.encode().unwrap()).unwrap();
        }
        backend
    }

    #[test]
    fn iterates_in_write_order() {
        let records: Vec<_> = (0..5).map(entry).collect();
        let backend = backend_with(&records);

        let read: Vec<_> = IndexRecordIterator::new(&backend, 0)
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(read, records);
    }

    #[test]
    fn empty_file_yields_nothing() {
        let backend = InMemoryBackend::new();
        let mut iter = IndexRecordIterator::new(&backend, 0).unwrap();
        assert!(iter.next().is_none());
        assert_eq!(iter.valid_len(), 0);
    }

    #[test]
    fn truncated_tail_is_clean_end() {
        let backend = backend_with(&[entry(0), entry(1)]);
        let mut data = backend.data();
        let full = data.len();
        data.truncate(full - 3);
        let backend = InMemoryBackend::with_data(data);

        let mut iter = IndexRecordIterator::new(&backend, 0).unwrap();
        assert_eq!(iter.next().unwrap().unwrap().1, entry(0));
        assert!(iter.next().is_none());
        assert_eq!(iter.valid_len(), (full / 2) as u64);
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let backend = backend_with(&[entry(0), entry(1)]);
        backend.corrupt_byte(8, 0xFF);

        let mut iter = IndexRecordIterator::new(&backend, 0).unwrap();
        assert!(matches!(
            iter.next(),
            Some(Err(CoreError::ChecksumMismatch { .. }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn unknown_type_is_corruption() {
        let backend = backend_with(&[entry(0)]);
        backend.corrupt_byte(0, 0x7F);
        let result: CoreResult<Vec<_>> = IndexRecordIterator::new(&backend, 0).unwrap().collect();
        assert!(matches!(result, Err(CoreError::PackageCorruption { .. })));
    }

    #[test]
    fn large_record_grows_buffer() {
        let big = IndexRecord::Tag {
            id: 1,
            name: "t".repeat(READ_BUFFER_SIZE * 2),
        };
        let backend = backend_with(&[entry(0), big.clone(), entry(1)]);
        let read: Vec<_> = IndexRecordIterator::new(&backend, 0)
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(read, vec![entry(0), big, entry(1)]);
    }

    #[test]
    fn many_records_cross_buffer_boundaries() {
        let records: Vec<_> = (0..10_000).map(entry).collect();
        let backend = backend_with(&records);
        let count = IndexRecordIterator::new(&backend, 0).unwrap().count();
        assert_eq!(count, 10_000);
    }
}
