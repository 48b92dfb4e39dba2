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

//! Log category ("log id") definitions.
//!
//! [`LogCategory`] names the log streams the daemon maintains. Each category doubles as a bit
//! position in a [`LogMask`], which is how readers are told which streams have new data.

type StdResult<T, E> = std::result::Result<T, E>;

/// One past the largest category id a writer may name.
pub const LOG_ID_MAX: u8 = 8;

/// The closed set of log streams. The discriminants are the on-the-wire category ids.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// general application output
    LOG_ID_MAIN = 0,
    /// telephony
    LOG_ID_RADIO = 1,
    /// binary event records
    LOG_ID_EVENTS = 2,
    /// system services
    LOG_ID_SYSTEM = 3,
    /// process crash reports
    LOG_ID_CRASH = 4,
    /// statistics events
    LOG_ID_STATS = 5,
    /// security audit records; restricted to authorized writers
    LOG_ID_SECURITY = 6,
    /// kernel messages; the daemon sources these itself, so writers may never name this category
    LOG_ID_KERNEL = 7,
}

impl LogCategory {
    /// The single-bit notification mask for this category.
    pub fn mask(self) -> LogMask {
        LogMask(1 << (self as u32))
    }
}

impl std::convert::TryFrom<u8> for LogCategory {
    type Error = u8;
    /// Map a wire id onto a category; ids at or past [`LOG_ID_MAX`] are handed back.
    fn try_from(id: u8) -> StdResult<Self, Self::Error> {
        match id {
            0 => Ok(LogCategory::LOG_ID_MAIN),
            1 => Ok(LogCategory::LOG_ID_RADIO),
            2 => Ok(LogCategory::LOG_ID_EVENTS),
            3 => Ok(LogCategory::LOG_ID_SYSTEM),
            4 => Ok(LogCategory::LOG_ID_CRASH),
            5 => Ok(LogCategory::LOG_ID_STATS),
            6 => Ok(LogCategory::LOG_ID_SECURITY),
            7 => Ok(LogCategory::LOG_ID_KERNEL),
            x => Err(x),
        }
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                LogCategory::LOG_ID_MAIN => "main",
                LogCategory::LOG_ID_RADIO => "radio",
                LogCategory::LOG_ID_EVENTS => "events",
                LogCategory::LOG_ID_SYSTEM => "system",
                LogCategory::LOG_ID_CRASH => "crash",
                LogCategory::LOG_ID_STATS => "stats",
                LogCategory::LOG_ID_SECURITY => "security",
                LogCategory::LOG_ID_KERNEL => "kernel",
            }
        )
    }
}

/// A set of [`LogCategory`]s, one bit per category.
///
/// Subscribers test "did category X get new data" with [`LogMask::contains`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LogMask(pub u32);

impl LogMask {
    pub fn contains(self, category: LogCategory) -> bool {
        self.0 & category.mask().0 != 0
    }
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for LogMask {
    type Output = LogMask;
    fn bitor(self, rhs: LogMask) -> LogMask {
        LogMask(self.0 | rhs.0)
    }
}
