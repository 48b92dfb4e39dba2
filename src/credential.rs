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

//! Sender credentials.
//!
//! The kernel attaches a `struct ucred` to every datagram arriving on a socket with `SO_PASSCRED`
//! set, but "attaches" is doing some work there: the pid may be zero (the sender lives in a pid
//! namespace we can't see) and the uid may be the overflow uid (the sender's user namespace has no
//! mapping for it). [`SenderCredential`] models those as absent rather than carrying the sentinels
//! around, so that a real pid of zero or a real uid of 65534 can't be mistaken for "unknown"
//! further down the line.

use nix::sys::socket::{ControlMessageOwned, UnixCredentials};

/// The kernel's stand-in for an unmappable user or group id.
pub const OVERFLOW_UID: u32 = 65534;

/// Who sent a datagram, as far as we can tell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SenderCredential {
    pub pid: Option<i32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl SenderCredential {
    /// Build a credential from the raw `ucred` triple, mapping the kernel's sentinels to `None`.
    pub fn from_raw(pid: i32, uid: u32, gid: u32) -> SenderCredential {
        SenderCredential {
            pid: if pid == 0 { None } else { Some(pid) },
            uid: if uid == OVERFLOW_UID { None } else { Some(uid) },
            gid: if gid == OVERFLOW_UID { None } else { Some(gid) },
        }
    }
    /// The credential synthesized for a datagram that arrived with no ancillary data at all.
    pub fn unknown() -> SenderCredential {
        SenderCredential::default()
    }
    /// Pull the sender credential out of a message's control messages.
    ///
    /// The first `SCM_CREDENTIALS` message wins; anything else is ignored. If there is none, the
    /// result is [`SenderCredential::unknown`]: missing credentials are expected from some
    /// legitimate writers & are repaired downstream.
    pub fn extract<I>(cmsgs: I) -> SenderCredential
    where
        I: IntoIterator<Item = ControlMessageOwned>,
    {
        cmsgs
            .into_iter()
            .find_map(|cmsg| match cmsg {
                ControlMessageOwned::ScmCredentials(creds) => Some(creds),
                _ => None,
            })
            .map(|creds| SenderCredential::from(&creds))
            .unwrap_or_else(SenderCredential::unknown)
    }
    /// The pid as the kernel would have reported it (zero if unknown).
    pub fn raw_pid(&self) -> i32 {
        self.pid.unwrap_or(0)
    }
    /// The uid as the kernel would have reported it ([`OVERFLOW_UID`] if unknown).
    pub fn raw_uid(&self) -> u32 {
        self.uid.unwrap_or(OVERFLOW_UID)
    }
    /// The gid as the kernel would have reported it ([`OVERFLOW_UID`] if unknown).
    pub fn raw_gid(&self) -> u32 {
        self.gid.unwrap_or(OVERFLOW_UID)
    }
}

impl std::convert::From<&UnixCredentials> for SenderCredential {
    fn from(creds: &UnixCredentials) -> Self {
        SenderCredential::from_raw(creds.pid(), creds.uid(), creds.gid())
    }
}

impl std::fmt::Display for SenderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pid {} uid {} gid {}",
            self.raw_pid(),
            self.raw_uid(),
            self.raw_gid()
        )
    }
}
