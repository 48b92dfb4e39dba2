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
//! The ingestion gateway of a system log [daemon]
//!
//! [daemon]: https://en.wikipedia.org/wiki/Daemon_(computing)
//!
//! # Introduction
//!
//! A system log daemon accepts log records from any process on the host over a well-known Unix
//! datagram socket. That makes the socket a privilege boundary: the daemon has to work out who
//! really sent each record, decide whether that sender may write to the category it named, & make
//! sure it never ingests its own output (which would feed back on itself through the very
//! libraries the daemon uses to log).
//!
//! This crate is that boundary. It does not store records, answer queries or wake up readers
//! itself; it hands accepted records to a [`LogStorage`] & tells a [`Notifier`] about them.
//!
//! [`LogStorage`]: crate::storage::LogStorage
//! [`Notifier`]: crate::storage::Notifier
//!
//! # From Datagram to Record
//!
//! Each datagram goes through four steps:
//!
//! 1. the kernel-attached sender credential is extracted ([`credential`])
//! 2. the fixed-size header is parsed off the front ([`header`])
//! 3. category policy is applied & any gaps in the credential are repaired ([`resolver`])
//! 4. the record is clamped, delivered & announced ([`listener`])
//!
//! Any step may drop the datagram; that's a [`Rejection`], an expected outcome rather than an
//! error, & the gateway goes straight back to listening.
//!
//! [`Rejection`]: crate::error::Rejection
//!
//! # Usage
//!
//! ```no_run
//! use logd_listener::{
//!     config::ListenerConfig,
//!     listener::Listener,
//!     storage::{MemoryStorage, PendingMask},
//!     transport::LogSocket,
//! };
//! use std::sync::Arc;
//!
//! let config = ListenerConfig::builder()
//!     .socket_dir("/tmp")
//!     .build();
//! let socket = Arc::new(LogSocket::open(&config).unwrap());
//! let listener = Arc::new(Listener::new(
//!     &config,
//!     MemoryStorage::new(),
//!     Some(PendingMask::new()),
//! ));
//!
//! // Datagram sockets have no connections to serialize on, so any number of workers may service
//! // the socket at once.
//! for _ in 0..4 {
//!     let (socket, listener) = (socket.clone(), listener.clone());
//!     std::thread::spawn(move || listener.run(&socket));
//! }
//! ```

pub mod category;
pub mod config;
pub mod credential;
pub mod error;
pub mod header;
pub mod listener;
pub mod resolver;
pub mod storage;
pub mod transport;
