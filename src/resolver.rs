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

//! Security policy & sender identity repair.
//!
//! # Introduction
//!
//! Any local process can write to the log socket, so before a record is accepted the gateway has
//! to answer two questions: "may this sender write to this category?" and "who, exactly, is this
//! sender?". The second question is harder than it sounds, because the kernel-supplied credential
//! can be missing pieces (see [`SenderCredential`]).
//!
//! [`Resolver`] answers both. It leans on two collaborators:
//!
//! - an [`IdentityLookup`], which maps thread ids to process ids & process ids to user ids
//! - a [`SecurityPolicy`], which governs the restricted security category
//!
//! [`ProcfsLookup`] & [`LogCredentialPolicy`] are the implementations a real daemon would use.
//!
//! # Ordering
//!
//! The checks in [`Resolver::admit`] run in a fixed order, & each may end processing. In
//! particular, self-suppression runs before anything else so that the daemon never spends any
//! effort (or, worse, emits any diagnostics) on its own output.

use crate::{
    category::LogCategory,
    credential::SenderCredential,
    error::Rejection,
    header::LogHeader,
};

use tracing::trace;

use std::path::{Path, PathBuf};

type StdResult<T, E> = std::result::Result<T, E>;

/// The superuser.
pub const AID_ROOT: u32 = 0;
/// The system server.
pub const AID_SYSTEM: u32 = 1000;
/// Members of this group may read (and write security records to) the logs.
pub const AID_LOG: u32 = 1007;
/// The log daemon's own user.
pub const AID_LOGD: u32 = 1036;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         collaborators                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Best-effort mapping from thread & process ids to owners.
///
/// Implementations are called concurrently from every worker servicing the socket. One backed by
/// a shared, mutable table (rather than by the OS) must guard that table itself.
pub trait IdentityLookup {
    /// The process owning thread `tid`, if it can be determined.
    fn tid_to_pid(&self, tid: i32) -> Option<i32>;
    /// The user owning process `pid`, if it can be determined. `pid` may be zero when the sender's
    /// process could not be identified.
    fn pid_to_uid(&self, pid: i32) -> Option<u32>;
}

/// Access control for [`LOG_ID_SECURITY`].
///
/// Writing a security record takes *both* a globally enabled feature & an authorized sender.
///
/// [`LOG_ID_SECURITY`]: LogCategory::LOG_ID_SECURITY
pub trait SecurityPolicy {
    /// Is security logging switched on at all?
    fn security_logging_enabled(&self) -> bool;
    /// May the sender `(uid, gid, pid)` write security records? The arguments are in their raw,
    /// kernel form (pid zero & the overflow uid meaning "unknown").
    fn has_log_credentials(&self, uid: u32, gid: u32, pid: i32) -> bool;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         procfs lookup                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An [`IdentityLookup`] that reads `/proc/<id>/status`.
///
/// It's stateless, so it's trivially safe to share between workers. The root is configurable so
/// that tests can point it at a fake tree.
#[derive(Clone, Debug)]
pub struct ProcfsLookup {
    root: PathBuf,
}

impl std::default::Default for ProcfsLookup {
    fn default() -> Self {
        ProcfsLookup {
            root: PathBuf::from("/proc"),
        }
    }
}

impl ProcfsLookup {
    pub fn new<P: AsRef<Path>>(root: P) -> ProcfsLookup {
        ProcfsLookup {
            root: root.as_ref().to_path_buf(),
        }
    }
    /// Return the value of the `key:` line in `/proc/<id>/status`, if there is one.
    fn status_field(&self, id: i32, key: &str) -> Option<String> {
        if id <= 0 {
            return None;
        }
        let status =
            std::fs::read_to_string(self.root.join(id.to_string()).join("status")).ok()?;
        status.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|value| value.trim().to_string())
        })
    }
    /// The supplementary groups of process `pid` (empty if they can't be read).
    pub fn supplementary_groups(&self, pid: i32) -> Vec<u32> {
        self.status_field(pid, "Groups")
            .map(|groups| {
                groups
                    .split_whitespace()
                    .filter_map(|g| g.parse::<u32>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl IdentityLookup for ProcfsLookup {
    fn tid_to_pid(&self, tid: i32) -> Option<i32> {
        self.status_field(tid, "Tgid")?.parse::<i32>().ok()
    }
    fn pid_to_uid(&self, pid: i32) -> Option<u32> {
        // "Uid:" lists the real, effective, saved & filesystem uids; we want the real one.
        self.status_field(pid, "Uid")?
            .split_whitespace()
            .next()?
            .parse::<u32>()
            .ok()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   default security policy                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The stock [`SecurityPolicy`].
///
/// Security logging is on or off per configuration. A sender is authorized if its uid or gid is
/// root, system or log, or if it counts the log group among its supplementary groups.
#[derive(Clone, Debug)]
pub struct LogCredentialPolicy {
    enabled: bool,
    procfs: ProcfsLookup,
}

impl LogCredentialPolicy {
    pub fn new(enabled: bool, procfs: ProcfsLookup) -> LogCredentialPolicy {
        LogCredentialPolicy { enabled, procfs }
    }
}

impl SecurityPolicy for LogCredentialPolicy {
    fn security_logging_enabled(&self) -> bool {
        self.enabled
    }
    fn has_log_credentials(&self, uid: u32, gid: u32, pid: i32) -> bool {
        let privileged = |id: u32| id == AID_ROOT || id == AID_SYSTEM || id == AID_LOG;
        privileged(uid)
            || privileged(gid)
            || self.procfs.supplementary_groups(pid).contains(&AID_LOG)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         struct Resolver                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An accepted sender: the category it may write to & its repaired identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    pub category: LogCategory,
    pub credential: SenderCredential,
}

/// Applies category policy & repairs sender credentials.
pub struct Resolver<L: IdentityLookup, P: SecurityPolicy> {
    lookup: L,
    policy: P,
    daemon_uid: u32,
    daemon_pid: i32,
}

impl<L: IdentityLookup, P: SecurityPolicy> Resolver<L, P> {
    /// `daemon_uid` & `daemon_pid` identify the daemon itself, for the purposes of refusing its
    /// own output.
    pub fn new(lookup: L, policy: P, daemon_uid: u32, daemon_pid: i32) -> Resolver<L, P> {
        Resolver {
            lookup,
            policy,
            daemon_uid,
            daemon_pid,
        }
    }
    /// Decide whether the sender `cred` may log a record with header `header`; if so, return the
    /// record's category & the sender's credential with whatever gaps could be filled, filled.
    pub fn admit(
        &self,
        mut cred: SenderCredential,
        header: &LogHeader,
    ) -> StdResult<Admission, Rejection> {
        // Ignore messages we send to ourselves. These are typically generated by libraries we
        // depend upon that log through the very socket we're servicing.
        if cred.uid == Some(self.daemon_uid) {
            return Err(Rejection::SelfOrigin);
        }

        let category = LogCategory::try_from(header.log_id)
            .map_err(|id| Rejection::InvalidCategory { id })?;
        if category == LogCategory::LOG_ID_KERNEL {
            return Err(Rejection::KernelCategory);
        }

        if category == LogCategory::LOG_ID_SECURITY {
            if !self.policy.security_logging_enabled() {
                return Err(Rejection::SecurityDisabled);
            }
            if !self
                .policy
                .has_log_credentials(cred.raw_uid(), cred.raw_gid(), cred.raw_pid())
            {
                return Err(Rejection::Unauthorized);
            }
        }

        if cred.pid.is_none() {
            cred.pid = self.lookup.tid_to_pid(header.tid);
            trace!("repaired pid from tid {}: {:?}", header.tid, cred.pid);
            // Any of our own threads (& the libraries they call) will land here.
            if cred.pid == Some(self.daemon_pid) {
                return Err(Rejection::SelfProcess);
            }
        }

        if cred.uid.is_none() {
            // Ask even when the pid is still unknown; the lookup decides what pid zero means.
            let mut uid = self.lookup.pid_to_uid(cred.raw_pid());
            if uid == Some(self.daemon_uid) {
                // The owning process reports as us; see whether the thread itself maps elsewhere.
                // This assumes the thread id is also meaningful as a process id to the lookup,
                // which holds for procfs but isn't guaranteed in general.
                uid = self.lookup.pid_to_uid(header.tid);
            }
            cred.uid = uid.filter(|&uid| uid != self.daemon_uid);
            trace!("repaired uid: {:?}", cred.uid);
        }

        Ok(Admission {
            category,
            credential: cred,
        })
    }
}
