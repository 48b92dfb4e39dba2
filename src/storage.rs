// Copyright (C) 2022 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of logd-listener.
//
// logd-listener is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// logd-listener is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with logd-listener.  If
// not, see <http://www.gnu.org/licenses/>.

//! Where accepted records go.
//!
//! The gateway doesn't store anything itself; it hands each accepted [`LogRecord`] to a
//! [`LogStorage`] implementation & then pokes a [`Notifier`] so that readers can wake up. Both
//! are invoked concurrently from every worker servicing the socket, so implementations must do
//! their own locking.
//!
//! [`MemoryStorage`] & [`PendingMask`] are simple implementations suitable for tests & for the
//! companion test binaries.

use crate::{
    category::{LogCategory, LogMask},
    header::LogTime,
};

use bytes::Bytes;

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc, Mutex,
};

/// A validated log record with fully resolved sender identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub category: LogCategory,
    pub realtime: LogTime,
    /// [`OVERFLOW_UID`] if the sender's uid couldn't be resolved
    ///
    /// [`OVERFLOW_UID`]: crate::credential::OVERFLOW_UID
    pub uid: u32,
    /// zero if the sender's pid couldn't be resolved
    pub pid: i32,
    pub tid: i32,
    /// At most `u16::MAX` bytes.
    pub msg: Bytes,
    /// Set if the message was cut short, either by the socket or by the length clamp
    pub truncated: bool,
}

/// Operations all log stores must support.
pub trait LogStorage {
    /// Ingest `record`.
    ///
    /// Returns a positive value if the record was stored; zero or a negative value means it
    /// wasn't. This is a status, not an error: there's no one to report a failure to, since the
    /// writer considered the send complete the moment its datagram left.
    fn log(&self, record: &LogRecord) -> i32;
}

/// Operations all reader-notification mechanisms must support.
pub trait Notifier {
    /// New records have arrived in each category set in `mask`. Must not block.
    fn notify_new_log(&self, mask: LogMask);
}

// Collaborators are commonly shared between the gateway & whoever reads from them.

impl<T: LogStorage + ?Sized> LogStorage for Arc<T> {
    fn log(&self, record: &LogRecord) -> i32 {
        self.as_ref().log(record)
    }
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify_new_log(&self, mask: LogMask) {
        self.as_ref().notify_new_log(mask)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       in-memory storage                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A stored [`LogRecord`] along with the sequence number it was assigned on arrival.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEntry {
    pub sequence: u64,
    pub record: LogRecord,
}

/// An unbounded, in-memory [`LogStorage`].
///
/// Sequence numbers are assigned under the same lock that appends, so they are monotonic in the
/// order entries appear.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<Vec<StoredEntry>>,
    next_sequence: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
    /// Snapshot everything stored so far, in arrival order.
    pub fn entries(&self) -> Vec<StoredEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogStorage for MemoryStorage {
    fn log(&self, record: &LogRecord) -> i32 {
        // An empty record has nothing for a reader to see, so it counts as "not stored".
        if record.msg.is_empty() {
            return 0;
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push(StoredEntry {
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            record: record.clone(),
        });
        record.msg.len() as i32
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      pending-mask notifier                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`Notifier`] that simply accumulates notifications until someone [`take`]s them.
///
/// [`take`]: PendingMask::take
#[derive(Debug, Default)]
pub struct PendingMask {
    mask: AtomicU32,
}

impl PendingMask {
    pub fn new() -> PendingMask {
        PendingMask::default()
    }
    /// Return every category notified since the last call, and clear them.
    pub fn take(&self) -> LogMask {
        LogMask(self.mask.swap(0, Ordering::AcqRel))
    }
    pub fn peek(&self) -> LogMask {
        LogMask(self.mask.load(Ordering::Acquire))
    }
}

impl Notifier for PendingMask {
    fn notify_new_log(&self, mask: LogMask) {
        self.mask.fetch_or(mask.0, Ordering::AcqRel);
    }
}
