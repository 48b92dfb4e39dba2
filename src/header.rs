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

//! The log record wire header.
//!
//! Every datagram a writer sends begins with a fixed-size, packed, host-endian header:
//!
//! ```text
//! [0]       category id   u8
//! [1..3)    thread id     u16
//! [3..11)   seconds       u64
//! [11..15)  nanoseconds   u32
//! [15..N)   payload
//! ```
//!
//! Host-endian because both ends of the socket are, by construction, on the same host.

use crate::error::Rejection;

use bytes::{Buf, BufMut};
use chrono::prelude::*;

/// Size of the packed header, in bytes.
pub const HEADER_SIZE: usize = 15;

/// The largest payload a writer may send.
pub const MAX_PAYLOAD: usize = 4068;

/// A wall-clock timestamp as stamped by the writer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogTime {
    pub sec: u64,
    pub nsec: u32,
}

impl LogTime {
    pub fn new(sec: u64, nsec: u32) -> LogTime {
        LogTime { sec, nsec }
    }
    pub fn now() -> LogTime {
        LogTime::from(Utc::now())
    }
    /// None if the writer sent something chrono can't represent.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.sec).ok()?;
        Utc.timestamp_opt(secs, self.nsec).single()
    }
}

impl std::convert::From<DateTime<Utc>> for LogTime {
    fn from(t: DateTime<Utc>) -> Self {
        LogTime {
            sec: t.timestamp().max(0) as u64,
            nsec: t.timestamp_subsec_nanos(),
        }
    }
}

impl std::fmt::Display for LogTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            None => write!(f, "{}.{:09}", self.sec, self.nsec),
        }
    }
}

/// The decoded header of a log datagram.
///
/// The category id is deliberately left raw: deciding whether it names a category the writer may
/// use is policy, and policy is the resolver's business.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LogHeader {
    pub log_id: u8,
    pub tid: i32,
    pub realtime: LogTime,
}

impl LogHeader {
    /// Serialize this header onto the end of `buf`.
    ///
    /// Thread ids are carried in sixteen bits on the wire; anything wider is truncated, as it
    /// would be by any other writer.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.log_id);
        buf.put_u16_ne(self.tid as u16);
        buf.put_u64_ne(self.realtime.sec);
        buf.put_u32_ne(self.realtime.nsec);
    }
}

/// Split a datagram into its header & payload.
///
/// The datagram must be *strictly* longer than [`HEADER_SIZE`]: an empty payload isn't a log
/// record. Nothing about the payload is examined.
pub fn parse(buf: &[u8]) -> std::result::Result<(LogHeader, &[u8]), Rejection> {
    if buf.len() <= HEADER_SIZE {
        return Err(Rejection::TooShort { len: buf.len() });
    }
    let (mut hdr, payload) = buf.split_at(HEADER_SIZE);
    let log_id = hdr.get_u8();
    let tid = hdr.get_u16_ne() as i32;
    let sec = hdr.get_u64_ne();
    let nsec = hdr.get_u32_ne();
    Ok((
        LogHeader {
            log_id,
            tid,
            realtime: LogTime { sec, nsec },
        },
        payload,
    ))
}
