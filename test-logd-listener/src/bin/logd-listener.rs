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

//! Run the gateway against a real socket & print what it accepts.
//!
//! usage: logd-listener [SOCKET-DIR [WORKERS]]
//!
//! Binds `logdw` in SOCKET-DIR (default `/tmp`) unless init advertised one, & services it with
//! WORKERS threads (default 4). Set `LOGD_SECURITY=1` to permit security records.

use logd_listener::{
    config::ListenerConfig,
    listener::Listener,
    storage::{MemoryStorage, PendingMask},
    transport::LogSocket,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::sync::Arc;

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| String::from("/tmp"));
    let workers: usize = args.next().and_then(|n| n.parse().ok()).unwrap_or(4);

    let config = ListenerConfig::builder()
        .socket_dir(dir)
        .security_logging(std::env::var("LOGD_SECURITY").map_or(false, |v| v == "1"))
        .build();

    let socket = Arc::new(LogSocket::open(&config).unwrap());
    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(PendingMask::new());
    let listener = Arc::new(Listener::new(
        &config,
        storage.clone(),
        Some(notifier.clone()),
    ));

    for _ in 0..workers {
        let (socket, listener) = (socket.clone(), listener.clone());
        std::thread::spawn(move || listener.run(&socket));
    }
    info!("{} workers servicing {:?}", workers, config.socket_path());

    // Play reader: poll for notifications & print whatever's new.
    let mut printed = 0;
    loop {
        std::thread::sleep(std::time::Duration::from_millis(100));
        let mask = notifier.take();
        if mask.is_empty() {
            continue;
        }
        for entry in storage.entries().into_iter().skip(printed) {
            let r = &entry.record;
            println!(
                "{:>6} {} {:>8} {:>5} {:>5} {:>5} {}{}",
                entry.sequence,
                r.realtime,
                r.category,
                r.uid,
                r.pid,
                r.tid,
                String::from_utf8_lossy(&r.msg),
                if r.truncated { " [truncated]" } else { "" }
            );
            printed += 1;
        }
    }
}
