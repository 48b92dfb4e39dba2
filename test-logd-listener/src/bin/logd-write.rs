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

//! Send one log record to a running gateway.
//!
//! usage: logd-write SOCKET CATEGORY-ID MESSAGE...

use logd_listener::{
    header::{LogHeader, LogTime},
    transport::LogWriter,
};

pub fn main() {
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: logd-write SOCKET CATEGORY-ID MESSAGE...");
    let log_id: u8 = args
        .next()
        .and_then(|id| id.parse().ok())
        .expect("CATEGORY-ID must be a number from 0 to 255");
    let msg = args.collect::<Vec<String>>().join(" ");

    let writer = LogWriter::new(&path).unwrap();
    let header = LogHeader {
        log_id,
        tid: std::process::id() as i32,
        realtime: LogTime::now(),
    };
    // Text records carry their terminating nul
    let mut payload = msg.into_bytes();
    payload.push(0);
    writer.write(&header, &payload).unwrap();
}
