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

//! The log socket.
//!
//! This module defines both ends of the well-known datagram socket: [`LogSocket`], the daemon's
//! listening end, & [`LogWriter`], a minimal client.
//!
//! # Examples
//!
//! To listen on a socket of your own:
//!
//! ```no_run
//! use logd_listener::transport::LogSocket;
//! let socket = LogSocket::bind("/tmp/logdw").unwrap();
//! let datagram = socket.recv().unwrap();
//! println!("{} bytes from {}", datagram.bytes.len(), datagram.credential);
//! ```
//!
//! To connect to a socket that isn't there:
//!
//! ```rust
//! use logd_listener::transport::LogWriter;
//! let writer = LogWriter::new("/i/am/not/there.s");
//! assert!(writer.is_err()); // no such socket, after all
//! ```

use crate::{
    config::ListenerConfig,
    credential::SenderCredential,
    error::{Error, Result},
    header::{LogHeader, HEADER_SIZE, MAX_PAYLOAD},
};

use backtrace::Backtrace;
use bytes::{BufMut, Bytes, BytesMut};
use nix::sys::socket::{
    getsockopt, recvmsg, setsockopt, sockopt, ControlMessageOwned, MsgFlags, SockType,
    UnixCredentials,
};
use tracing::{debug, info, warn};

use std::{
    io::IoSliceMut,
    os::unix::{
        fs::PermissionsExt,
        io::{AsRawFd, FromRawFd, RawFd},
        net::UnixDatagram,
    },
    path::{Path, PathBuf},
};

/// Environment variable prefix under which init advertises sockets it created on our behalf.
const CONTROL_SOCKET_PREFIX: &str = "ANDROID_SOCKET_";

/// The most descriptors the kernel will pass in a single message (`SCM_MAX_FD`).
const MAX_PASSED_FDS: usize = 253;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        listening socket                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One datagram, as received.
#[derive(Clone, Debug)]
pub struct Datagram {
    /// The bytes received; never more than [`HEADER_SIZE`] + [`MAX_PAYLOAD`].
    pub bytes: Bytes,
    /// The sender, per the kernel (as much as it was willing to say).
    pub credential: SenderCredential,
    /// The datagram was larger than our buffer & was cut short.
    pub truncated: bool,
}

/// The daemon's end of the log socket: a Unix datagram socket with `SO_PASSCRED` set, so that
/// the kernel attaches the sender's credentials to every message.
///
/// A [`LogSocket`] may be shared between any number of worker threads, each calling
/// [`recv`](LogSocket::recv); each datagram is delivered to exactly one of them.
#[derive(Debug)]
pub struct LogSocket {
    socket: UnixDatagram,
    // Set only if we bound the socket ourselves, in which case we clean it up
    path: Option<PathBuf>,
}

impl LogSocket {
    /// Adopt the socket init created for us under `name`, if it did so.
    ///
    /// Returns `Ok(None)` if no such socket was advertised.
    pub fn from_environment(name: &str) -> Result<Option<LogSocket>> {
        let var = format!("{}{}", CONTROL_SOCKET_PREFIX, name);
        let value = match std::env::var(&var) {
            Ok(value) => value,
            Err(_) => return Ok(None),
        };
        let fd: RawFd = value
            .trim()
            .parse()
            .ok()
            .filter(|&fd| fd >= 0)
            .ok_or_else(|| Error::ControlSocket {
                name: var.clone(),
                value: value.clone(),
                back: Backtrace::new(),
            })?;
        // SAFETY: init hands us this descriptor precisely so that we take ownership of it, & no
        // one else in this process knows about it.
        let socket = unsafe { UnixDatagram::from_raw_fd(fd) };
        match getsockopt(&socket, sockopt::SockType) {
            Ok(SockType::Datagram) => (),
            _ => {
                return Err(Error::ControlSocket {
                    name: var,
                    value,
                    back: Backtrace::new(),
                })
            }
        }
        pass_credentials(&socket)?;
        debug!("Adopted control socket {} (fd {})", name, fd);
        Ok(Some(LogSocket { socket, path: None }))
    }
    /// Bind a fresh log socket at `path`, replacing any stale socket file left there.
    pub fn bind<P: AsRef<Path>>(path: P) -> Result<LogSocket> {
        let path = path.as_ref();
        let bind_err = |err: std::io::Error| Error::Bind {
            path: path.to_path_buf(),
            source: Box::new(err),
            back: Backtrace::new(),
        };
        if path.exists() {
            std::fs::remove_file(path).map_err(bind_err)?;
        }
        let socket = UnixDatagram::bind(path).map_err(bind_err)?;
        // Anyone may write; no one may read.
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o222))
            .map_err(bind_err)?;
        pass_credentials(&socket)?;
        info!("Log socket listening at {:?}", path);
        Ok(LogSocket {
            socket,
            path: Some(path.to_path_buf()),
        })
    }
    /// Obtain the log socket described by `config`: the init-provided one if there is one,
    /// a self-bound one otherwise.
    pub fn open(config: &ListenerConfig) -> Result<LogSocket> {
        match LogSocket::from_environment(&config.socket_name)? {
            Some(socket) => Ok(socket),
            None => LogSocket::bind(config.socket_path()),
        }
    }
    /// Where we bound this socket, if we bound it.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
    /// Block until a datagram arrives, & return it along with its sender's credentials.
    ///
    /// Credentials that are simply missing are fine (see [`SenderCredential::extract`]).
    /// Descriptors a writer attaches are closed on arrival; the record itself is still delivered.
    /// The control buffer holds as many descriptors as the kernel will pass in one message, so
    /// the only truncation left is the kernel failing to install them (our descriptor table is
    /// full, say). That is reported as [`Error::Receive`].
    pub fn recv(&self) -> Result<Datagram> {
        let mut buf = vec![0u8; HEADER_SIZE + MAX_PAYLOAD];
        let (len, truncated, credential) = {
            let mut iov = [IoSliceMut::new(&mut buf)];
            let mut cmsg = nix::cmsg_space!(UnixCredentials, [RawFd; MAX_PASSED_FDS]);
            let msg = recvmsg::<()>(
                self.socket.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg),
                MsgFlags::MSG_CMSG_CLOEXEC,
            )
            .map_err(|err| Error::Receive {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;
            let cmsgs = msg.cmsgs().map_err(|err| Error::Receive {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;
            // Walk every message, not just up to the credential, so no descriptor is left open.
            let cmsgs: Vec<ControlMessageOwned> = cmsgs
                .filter_map(|cmsg| match cmsg {
                    ControlMessageOwned::ScmRights(fds) => {
                        close_passed(&fds);
                        None
                    }
                    other => Some(other),
                })
                .collect();
            let credential = SenderCredential::extract(cmsgs);
            (
                msg.bytes,
                msg.flags.contains(MsgFlags::MSG_TRUNC),
                credential,
            )
        };
        buf.truncate(len);
        Ok(Datagram {
            bytes: Bytes::from(buf),
            credential,
            truncated,
        })
    }
}

impl std::ops::Drop for LogSocket {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn close_passed(fds: &[RawFd]) {
    debug!("Closing {} descriptor(s) passed with a log record", fds.len());
    for &fd in fds {
        if let Err(err) = nix::unistd::close(fd) {
            warn!("Failed to close passed descriptor {}: {}", fd, err);
        }
    }
}

fn pass_credentials(socket: &UnixDatagram) -> Result<()> {
    setsockopt(socket, sockopt::PassCred, &true).map_err(|err| Error::PassCred {
        source: Box::new(err),
        back: Backtrace::new(),
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             writer                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Writing log records to the daemon.
pub struct LogWriter {
    socket: UnixDatagram,
}

impl LogWriter {
    /// Construct a [`LogWriter`] connected to the log socket at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<LogWriter> {
        let sock = UnixDatagram::unbound().map_err(|err| Error::Send {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        sock.connect(path).map_err(|err| Error::Send {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        Ok(LogWriter { socket: sock })
    }
    pub fn try_default() -> Result<LogWriter> {
        LogWriter::new(ListenerConfig::default().socket_path())
    }
    /// Send one log record: `header` followed by `msg`.
    ///
    /// Payloads larger than [`MAX_PAYLOAD`] are refused here rather than silently truncated by
    /// the daemon.
    pub fn write(&self, header: &LogHeader, msg: &[u8]) -> Result<usize> {
        if msg.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: msg.len(),
                back: Backtrace::new(),
            });
        }
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + msg.len());
        header.encode(&mut buf);
        buf.put_slice(msg);
        self.send(&buf)
    }
    /// Send a datagram verbatim.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        self.socket.send(buf).map_err(|err| Error::Send {
            source: Box::new(err),
            back: Backtrace::new(),
        })
    }
}
