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

//! Gateway configuration.

use crate::resolver::AID_LOGD;

use std::path::PathBuf;

/// Everything the gateway needs to know about the daemon it's serving.
///
/// None of this changes once the gateway is running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    /// The daemon's own user; records from this user are never accepted.
    pub daemon_uid: u32,
    /// The daemon's own process; records from its threads are never accepted.
    pub daemon_pid: i32,
    /// Whether writes to the security category are permitted at all.
    pub security_logging: bool,
    /// Name given to the first worker thread to service the socket (at most fifteen bytes are
    /// kept by the kernel).
    pub thread_name: String,
    /// The socket's well-known name, both in the init environment & under `socket_dir`.
    pub socket_name: String,
    pub socket_dir: PathBuf,
}

impl std::default::Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            daemon_uid: AID_LOGD,
            daemon_pid: std::process::id() as i32,
            security_logging: false,
            thread_name: String::from("logd.writer"),
            socket_name: String::from("logdw"),
            socket_dir: PathBuf::from("/dev/socket"),
        }
    }
}

impl ListenerConfig {
    pub fn builder() -> ListenerConfigBuilder {
        ListenerConfigBuilder {
            imp: ListenerConfig::default(),
        }
    }
    /// Where a self-bound socket lives.
    pub fn socket_path(&self) -> PathBuf {
        self.socket_dir.join(&self.socket_name)
    }
}

pub struct ListenerConfigBuilder {
    imp: ListenerConfig,
}

impl ListenerConfigBuilder {
    pub fn daemon_uid(mut self, uid: u32) -> Self {
        self.imp.daemon_uid = uid;
        self
    }
    pub fn daemon_pid(mut self, pid: i32) -> Self {
        self.imp.daemon_pid = pid;
        self
    }
    pub fn security_logging(mut self, enabled: bool) -> Self {
        self.imp.security_logging = enabled;
        self
    }
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.imp.thread_name = name.into();
        self
    }
    pub fn socket_name<S: Into<String>>(mut self, name: S) -> Self {
        self.imp.socket_name = name.into();
        self
    }
    pub fn socket_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.imp.socket_dir = dir.into();
        self
    }
    pub fn build(self) -> ListenerConfig {
        self.imp
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn defaults() {
        let config = ListenerConfig::default();
        assert_eq!(AID_LOGD, config.daemon_uid);
        assert_eq!(std::process::id() as i32, config.daemon_pid);
        assert!(!config.security_logging);
        assert_eq!(PathBuf::from("/dev/socket/logdw"), config.socket_path());
    }

    #[test]
    fn builder() {
        let config = ListenerConfig::builder()
            .daemon_uid(2000)
            .daemon_pid(1)
            .security_logging(true)
            .thread_name("test.writer")
            .socket_name("testw")
            .socket_dir("/tmp")
            .build();
        assert_eq!(2000, config.daemon_uid);
        assert_eq!(1, config.daemon_pid);
        assert!(config.security_logging);
        assert_eq!("test.writer", config.thread_name);
        assert_eq!(PathBuf::from("/tmp/testw"), config.socket_path());
    }
}
