//! Bidirectional message cursor.

use crate::error::{CoreError, CoreResult};
use crate::message::{Message, Timestamp};
use crate::reader::PackageView;
use std::sync::Arc;

/// A position within one package.
///
/// Each cursor owns its position; any number of cursors can walk the same
/// package concurrently. A failed step leaves the position unchanged.
#[derive(Debug, Clone)]
pub struct MessageCursor {
    view: Arc<PackageView>,
    position: Option<usize>,
}

impl MessageCursor {
    pub(crate) fn new(view: Arc<PackageView>, position: Option<usize>) -> Self {
        Self { view, position }
    }

    /// Current position, or `None` for an empty cursor.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        self.position.map(|p| p as u64)
    }

    /// Returns true if the cursor points at nothing (empty package).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.is_none()
    }

    /// Number of messages the cursor can visit.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.view.len()
    }

    /// Reads the message under the cursor.
    ///
    /// # Errors
    ///
    /// Returns a storage or corruption error if the message cannot be read.
    pub fn msg(&self) -> CoreResult<Option<Message>> {
        self.position.map(|p| self.view.read(p)).transpose()
    }

    /// Moves `step` messages forward and returns the message there.
    ///
    /// A step of 0 returns the current message.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the target lies past the last message or the
    /// cursor is empty. The position does not change.
    pub fn next(&mut self, step: u64) -> CoreResult<Message> {
        let target = self
            .position
            .and_then(|p| usize::try_from(step).ok().and_then(|s| p.checked_add(s)))
            .filter(|&t| t < self.view.index().len());
        self.move_to(target, i128::from(step))
    }

    /// Moves `step` messages backward and returns the message there.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the target lies before the first message or
    /// the cursor is empty. The position does not change.
    pub fn prev(&mut self, step: u64) -> CoreResult<Message> {
        let target = self
            .position
            .and_then(|p| usize::try_from(step).ok().and_then(|s| p.checked_sub(s)));
        self.move_to(target, -i128::from(step))
    }

    fn move_to(&mut self, target: Option<usize>, step: i128) -> CoreResult<Message> {
        let Some(target) = target else {
            return Err(CoreError::OutOfRange {
                position: self.position.unwrap_or(0) as u64,
                step,
                len: self.view.len(),
            });
        };
        let message = self.view.read(target)?;
        self.position = Some(target);
        Ok(message)
    }

    /// Re-anchors the cursor on the message with the greatest timestamp
    /// `<= timestamp`, with the same rules as `select_msg`.
    ///
    /// Returns the new position.
    pub fn seek(&mut self, timestamp: Timestamp) -> Option<u64> {
        self.position = self.view.index().select(timestamp);
        self.position()
    }
}
