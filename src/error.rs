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
//! [logd-listener](crate) errors

use backtrace::Backtrace;

/// [logd-listener](crate) error type
///
/// Like its ancestors, this crate eschews libraries like [thiserror] & [anyhow] in favor of a
/// straightforward enumeration with a few match arms chosen on the basis of what the caller will
/// need to respond.
///
/// Note that a datagram being *dropped* is not an error: that's a [`Rejection`], a normal outcome
/// of processing a message from an untrusted peer. [`Error`] is reserved for failures of the
/// socket itself.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
#[non_exhaustive]
pub enum Error {
    /// Failed to bind the listening socket at `path`
    Bind {
        path: std::path::PathBuf,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// An init-provided control socket was advertised, but its descriptor couldn't be parsed or
    /// doesn't name a datagram socket
    ControlSocket { name: String, value: String, back: Backtrace },
    /// Failed to enable `SO_PASSCRED` on the listening socket
    PassCred {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// A writer was handed a payload larger than the daemon will accept
    PayloadTooLarge { len: usize, back: Backtrace },
    /// `recvmsg` failed, or returned nothing usable
    Receive {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// Failed to send a record to the daemon
    Send {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Bind { path, source, .. } => {
                write!(f, "While binding the log socket at {:?}, got {}", path, source)
            }
            Error::ControlSocket { name, value, .. } => write!(
                f,
                "Control socket '{}' was advertised as '{}', which is not a datagram socket",
                name, value
            ),
            Error::PassCred { source, .. } => {
                write!(f, "While enabling SO_PASSCRED, got {}", source)
            }
            Error::PayloadTooLarge { len, .. } => write!(
                f,
                "A payload of {} bytes exceeds the maximum log payload",
                len
            ),
            Error::Receive { source, .. } => write!(f, "While receiving a datagram, got {}", source),
            Error::Send { source, .. } => write!(f, "While sending a log record, got {}", source),
            _ => write!(f, "Other logd-listener error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Bind { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::ControlSocket { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::PassCred { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::PayloadTooLarge { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Receive { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Send { back, .. } => write!(f, "{}\n{:#?}", self, back),
            err => write!(f, "logd-listener error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a datagram was dropped.
///
/// Every arm here is an expected outcome of taking input from any local process, not a fault, so
/// unlike [`Error`] no backtrace is captured: a flood of junk datagrams must stay cheap to discard.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The datagram was no longer than a bare header
    TooShort { len: usize },
    /// The sender is the daemon's own user
    SelfOrigin,
    /// The category id is at or past the last known category
    InvalidCategory { id: u8 },
    /// Writers may not name the kernel category
    KernelCategory,
    /// Security logging is switched off
    SecurityDisabled,
    /// The sender may not write to the security category
    Unauthorized,
    /// The sending thread belongs to the daemon itself
    SelfProcess,
    /// Storage declined the record
    StorageRejected { code: i32 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Rejection::TooShort { len } => {
                write!(f, "a {}-byte datagram can't hold a log record", len)
            }
            Rejection::SelfOrigin => write!(f, "the sender is the log daemon itself"),
            Rejection::InvalidCategory { id } => write!(f, "{} is not a log category", id),
            Rejection::KernelCategory => write!(f, "writers may not log to the kernel category"),
            Rejection::SecurityDisabled => write!(f, "security logging is disabled"),
            Rejection::Unauthorized => {
                write!(f, "the sender may not log to the security category")
            }
            Rejection::SelfProcess => write!(f, "the sending thread belongs to the log daemon"),
            Rejection::StorageRejected { code } => {
                write!(f, "storage declined the record ({})", code)
            }
        }
    }
}

impl std::error::Error for Rejection {}
