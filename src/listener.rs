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

//! The gateway proper.
//!
//! [`Listener`] ties the other pieces together: for each datagram it extracts the sender's
//! credential, parses the header, consults the [`Resolver`], & hands whatever survives to storage.
//! It holds no per-sender state, so a single [`Listener`] may service the socket from any number
//! of threads at once.

use crate::{
    category::LogCategory,
    config::ListenerConfig,
    error::Rejection,
    header::{self, HEADER_SIZE},
    resolver::{IdentityLookup, LogCredentialPolicy, ProcfsLookup, Resolver, SecurityPolicy},
    storage::{LogRecord, LogStorage, Notifier},
    transport::{Datagram, LogSocket},
};

use tracing::{debug, trace};

use std::sync::atomic::{AtomicBool, Ordering};

type StdResult<T, E> = std::result::Result<T, E>;

/// Storage counts message lengths in sixteen bits.
const MAX_RECORD_LEN: usize = u16::MAX as usize;

/// Set once some worker has been named. Naming is cosmetic, so all that matters is that it's
/// attempted once & never gets in anyone's way.
static WORKER_NAMED: AtomicBool = AtomicBool::new(false);

/// The log ingestion gateway.
///
/// Parameterized by its collaborators: where records go ([`LogStorage`]), who to tell about them
/// ([`Notifier`], optional), & how to look up & vet senders ([`IdentityLookup`] &
/// [`SecurityPolicy`]).
pub struct Listener<S, N, L = ProcfsLookup, P = LogCredentialPolicy>
where
    S: LogStorage,
    N: Notifier,
    L: IdentityLookup,
    P: SecurityPolicy,
{
    resolver: Resolver<L, P>,
    storage: S,
    notifier: Option<N>,
    thread_name: String,
}

/// A [`Listener`] that identifies senders through procfs & applies the stock security policy.
impl<S: LogStorage, N: Notifier> Listener<S, N, ProcfsLookup, LogCredentialPolicy> {
    pub fn new(config: &ListenerConfig, storage: S, notifier: Option<N>) -> Self {
        let procfs = ProcfsLookup::default();
        let policy = LogCredentialPolicy::new(config.security_logging, procfs.clone());
        Listener::with_resolver(
            config,
            Resolver::new(procfs, policy, config.daemon_uid, config.daemon_pid),
            storage,
            notifier,
        )
    }
}

impl<S, N, L, P> Listener<S, N, L, P>
where
    S: LogStorage,
    N: Notifier,
    L: IdentityLookup,
    P: SecurityPolicy,
{
    /// Construct a [`Listener`] with a custom [`Resolver`]
    pub fn with_resolver(
        config: &ListenerConfig,
        resolver: Resolver<L, P>,
        storage: S,
        notifier: Option<N>,
    ) -> Self {
        Listener {
            resolver,
            storage,
            notifier,
            thread_name: config.thread_name.clone(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Receive & process exactly one datagram from `socket`.
    ///
    /// Returns true if the datagram carried a record that passed policy (whether or not storage
    /// then took it), false otherwise. Nothing that happens here is fatal to the gateway; the
    /// return value is purely informational.
    pub fn on_data_available(&self, socket: &LogSocket) -> bool {
        self.name_worker();
        // A failed receive just means there's nothing to do this time around.
        let datagram = match socket.recv() {
            Ok(datagram) => datagram,
            Err(_) => return false,
        };
        match self.handle(datagram) {
            Ok(_) | Err(Rejection::StorageRejected { .. }) => true,
            Err(_) => false,
        }
    }

    /// Service `socket` forever.
    pub fn run(&self, socket: &LogSocket) -> ! {
        loop {
            self.on_data_available(socket);
        }
    }

    /// Process one received datagram: parse it, vet it, & deliver it.
    ///
    /// On success, the record as delivered to storage is returned.
    pub fn handle(&self, datagram: Datagram) -> StdResult<LogRecord, Rejection> {
        let Datagram {
            bytes,
            credential,
            truncated,
        } = datagram;

        let (hdr, _) = header::parse(&bytes)?;
        let admission = self.resolver.admit(credential, &hdr).map_err(|rejection| {
            trace!("dropping record from {}: {}", credential, rejection);
            rejection
        })?;

        // Over-long messages are recorded truncated, not refused.
        let mut msg = bytes.slice(HEADER_SIZE..);
        let clamped = msg.len() > MAX_RECORD_LEN;
        if clamped {
            msg.truncate(MAX_RECORD_LEN);
        }

        let record = LogRecord {
            category: admission.category,
            realtime: hdr.realtime,
            uid: admission.credential.raw_uid(),
            pid: admission.credential.raw_pid(),
            tid: hdr.tid,
            msg,
            truncated: truncated || clamped,
        };

        let code = self.storage.log(&record);
        if code <= 0 {
            trace!("storage declined a {} record ({})", record.category, code);
            return Err(Rejection::StorageRejected { code });
        }
        self.notify(record.category);
        Ok(record)
    }

    fn notify(&self, category: LogCategory) {
        if let Some(notifier) = &self.notifier {
            notifier.notify_new_log(category.mask());
        }
    }

    /// Name the calling thread, the first time any worker gets here.
    fn name_worker(&self) {
        if WORKER_NAMED.swap(true, Ordering::Relaxed) {
            return;
        }
        match std::ffi::CString::new(self.thread_name.as_str()) {
            Ok(name) => {
                if let Err(err) = nix::sys::prctl::set_name(&name) {
                    debug!("couldn't name the writer thread: {}", err);
                }
            }
            Err(_) => debug!("{:?} can't be a thread name", self.thread_name),
        }
    }
}

#[cfg(test)]
mod smoke {

    use super::*;

    use crate::{
        category::LogMask,
        credential::{SenderCredential, OVERFLOW_UID},
        header::{LogHeader, LogTime},
        resolver::AID_LOGD,
        storage::{MemoryStorage, PendingMask},
        transport::LogWriter,
    };

    use bytes::{BufMut, Bytes};

    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    const DAEMON_PID: i32 = 555;

    #[derive(Default)]
    struct FakeLookup {
        pids: HashMap<i32, i32>,
        uids: HashMap<i32, u32>,
    }

    impl IdentityLookup for FakeLookup {
        fn tid_to_pid(&self, tid: i32) -> Option<i32> {
            self.pids.get(&tid).copied()
        }
        fn pid_to_uid(&self, pid: i32) -> Option<u32> {
            self.uids.get(&pid).copied()
        }
    }

    struct FakePolicy {
        enabled: bool,
        authorized: bool,
    }

    impl SecurityPolicy for FakePolicy {
        fn security_logging_enabled(&self) -> bool {
            self.enabled
        }
        fn has_log_credentials(&self, _uid: u32, _gid: u32, _pid: i32) -> bool {
            self.authorized
        }
    }

    /// Records every call; answers with a canned status.
    struct RecordingStorage {
        code: i32,
        records: Mutex<Vec<LogRecord>>,
    }

    impl RecordingStorage {
        fn new(code: i32) -> RecordingStorage {
            RecordingStorage {
                code,
                records: Mutex::new(Vec::new()),
            }
        }
        fn records(&self) -> Vec<LogRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl LogStorage for RecordingStorage {
        fn log(&self, record: &LogRecord) -> i32 {
            self.records.lock().unwrap().push(record.clone());
            self.code
        }
    }

    struct Fixture {
        storage: Arc<RecordingStorage>,
        notifier: Arc<PendingMask>,
        listener: Listener<Arc<RecordingStorage>, Arc<PendingMask>, FakeLookup, FakePolicy>,
    }

    fn fixture(lookup: FakeLookup, policy: FakePolicy, code: i32) -> Fixture {
        let config = ListenerConfig::builder().daemon_pid(DAEMON_PID).build();
        let storage = Arc::new(RecordingStorage::new(code));
        let notifier = Arc::new(PendingMask::new());
        let listener = Listener::with_resolver(
            &config,
            Resolver::new(lookup, policy, config.daemon_uid, config.daemon_pid),
            storage.clone(),
            Some(notifier.clone()),
        );
        Fixture {
            storage,
            notifier,
            listener,
        }
    }

    fn open_policy() -> FakePolicy {
        FakePolicy {
            enabled: true,
            authorized: true,
        }
    }

    const TS: LogTime = LogTime {
        sec: 1_656_000_000,
        nsec: 987_654_321,
    };

    fn datagram(log_id: u8, tid: i32, payload: &[u8], credential: SenderCredential) -> Datagram {
        let mut buf = Vec::new();
        LogHeader {
            log_id,
            tid,
            realtime: TS,
        }
        .encode(&mut buf);
        buf.put_slice(payload);
        Datagram {
            bytes: Bytes::from(buf),
            credential,
            truncated: false,
        }
    }

    const MAIN: u8 = LogCategory::LOG_ID_MAIN as u8;

    #[test]
    fn accepted_with_kernel_credentials() {
        let f = fixture(FakeLookup::default(), open_policy(), 10);
        let record = f
            .listener
            .handle(datagram(
                MAIN,
                42,
                b"0123456789",
                SenderCredential::from_raw(100, 1000, 1000),
            ))
            .unwrap();
        let expected = LogRecord {
            category: LogCategory::LOG_ID_MAIN,
            realtime: TS,
            uid: 1000,
            pid: 100,
            tid: 42,
            msg: Bytes::from_static(b"0123456789"),
            truncated: false,
        };
        assert_eq!(expected, record);
        assert_eq!(vec![expected], f.storage.records());
        assert_eq!(LogMask(1 << 0), f.notifier.take());
    }

    #[test]
    fn accepted_after_repair() {
        let lookup = FakeLookup {
            pids: HashMap::from([(42, 100)]),
            uids: HashMap::from([(100, 1000)]),
        };
        let f = fixture(lookup, open_policy(), 10);
        f.listener
            .handle(datagram(MAIN, 42, b"0123456789", SenderCredential::unknown()))
            .unwrap();
        let records = f.storage.records();
        assert_eq!(1, records.len());
        assert_eq!(
            (LogCategory::LOG_ID_MAIN, TS, 1000, 100, 42, 10),
            (
                records[0].category,
                records[0].realtime,
                records[0].uid,
                records[0].pid,
                records[0].tid,
                records[0].msg.len()
            )
        );
        assert_eq!(LogCategory::LOG_ID_MAIN.mask(), f.notifier.take());
    }

    #[test]
    fn own_output_is_dropped() {
        let f = fixture(FakeLookup::default(), open_policy(), 10);
        assert_eq!(
            Err(Rejection::SelfOrigin),
            f.listener.handle(datagram(
                MAIN,
                42,
                b"hello",
                SenderCredential::from_raw(0, AID_LOGD, 0)
            ))
        );
        assert!(f.storage.records().is_empty());
        assert!(f.notifier.take().is_empty());
    }

    #[test]
    fn unauthorized_security_record() {
        let f = fixture(
            FakeLookup::default(),
            FakePolicy {
                enabled: true,
                authorized: false,
            },
            10,
        );
        assert_eq!(
            Err(Rejection::Unauthorized),
            f.listener.handle(datagram(
                LogCategory::LOG_ID_SECURITY as u8,
                42,
                b"hello",
                SenderCredential::from_raw(100, 1000, 1000)
            ))
        );
        assert!(f.storage.records().is_empty());
    }

    #[test]
    fn security_disabled() {
        let f = fixture(
            FakeLookup::default(),
            FakePolicy {
                enabled: false,
                authorized: true,
            },
            10,
        );
        assert_eq!(
            Err(Rejection::SecurityDisabled),
            f.listener.handle(datagram(
                LogCategory::LOG_ID_SECURITY as u8,
                42,
                b"hello",
                SenderCredential::from_raw(100, 0, 0)
            ))
        );
        assert!(f.storage.records().is_empty());
    }

    #[test]
    fn too_short() {
        let f = fixture(FakeLookup::default(), open_policy(), 10);
        let cred = SenderCredential::from_raw(100, 1000, 1000);
        // Exactly a header, no payload
        let d = datagram(MAIN, 42, b"", cred);
        assert_eq!(HEADER_SIZE, d.bytes.len());
        assert_eq!(
            Err(Rejection::TooShort { len: HEADER_SIZE }),
            f.listener.handle(d)
        );
        for len in 0..HEADER_SIZE {
            let d = Datagram {
                bytes: Bytes::from(vec![0u8; len]),
                credential: cred,
                truncated: false,
            };
            assert_eq!(Err(Rejection::TooShort { len }), f.listener.handle(d));
        }
        assert!(f.storage.records().is_empty());
    }

    #[test]
    fn bad_categories() {
        let f = fixture(FakeLookup::default(), open_policy(), 10);
        let cred = SenderCredential::from_raw(100, 1000, 1000);
        assert_eq!(
            Err(Rejection::KernelCategory),
            f.listener
                .handle(datagram(LogCategory::LOG_ID_KERNEL as u8, 42, b"x", cred))
        );
        for id in [8u8, 9, 127, 255] {
            assert_eq!(
                Err(Rejection::InvalidCategory { id }),
                f.listener.handle(datagram(id, 42, b"x", cred))
            );
        }
        assert!(f.storage.records().is_empty());
    }

    #[test]
    fn own_thread() {
        let lookup = FakeLookup {
            pids: HashMap::from([(42, DAEMON_PID)]),
            ..Default::default()
        };
        let f = fixture(lookup, open_policy(), 10);
        assert_eq!(
            Err(Rejection::SelfProcess),
            f.listener
                .handle(datagram(MAIN, 42, b"x", SenderCredential::unknown()))
        );
        assert!(f.storage.records().is_empty());
    }

    #[test]
    fn long_messages_are_clamped() {
        let f = fixture(FakeLookup::default(), open_policy(), 10);
        let payload = vec![b'x'; MAX_RECORD_LEN + 100];
        let record = f
            .listener
            .handle(datagram(
                MAIN,
                42,
                &payload,
                SenderCredential::from_raw(100, 1000, 1000),
            ))
            .unwrap();
        assert_eq!(u16::MAX as usize, record.msg.len());
        assert!(record.truncated);
        assert_eq!(u16::MAX as usize, f.storage.records()[0].msg.len());

        let payload = vec![b'x'; MAX_RECORD_LEN];
        let record = f
            .listener
            .handle(datagram(
                MAIN,
                42,
                &payload,
                SenderCredential::from_raw(100, 1000, 1000),
            ))
            .unwrap();
        assert_eq!(u16::MAX as usize, record.msg.len());
        assert!(!record.truncated);
    }

    #[test]
    fn storage_declines() {
        for code in [0, -1] {
            let f = fixture(FakeLookup::default(), open_policy(), code);
            assert_eq!(
                Err(Rejection::StorageRejected { code }),
                f.listener.handle(datagram(
                    MAIN,
                    42,
                    b"x",
                    SenderCredential::from_raw(100, 1000, 1000)
                ))
            );
            assert_eq!(1, f.storage.records().len());
            assert!(f.notifier.take().is_empty());
        }
    }

    #[test]
    fn without_notifier() {
        let config = ListenerConfig::builder().daemon_pid(DAEMON_PID).build();
        let listener = Listener::with_resolver(
            &config,
            Resolver::new(FakeLookup::default(), open_policy(), AID_LOGD, DAEMON_PID),
            MemoryStorage::new(),
            None::<PendingMask>,
        );
        listener
            .handle(datagram(
                MAIN,
                42,
                b"hi",
                SenderCredential::from_raw(100, 1000, 1000),
            ))
            .unwrap();
        assert_eq!(1, listener.storage().len());
    }

    #[test]
    fn unresolved_uid_is_stored_as_overflow() {
        let lookup = FakeLookup {
            uids: HashMap::from([(100, AID_LOGD)]),
            ..Default::default()
        };
        let f = fixture(lookup, open_policy(), 10);
        let record = f
            .listener
            .handle(datagram(
                MAIN,
                42,
                b"x",
                SenderCredential::from_raw(100, OVERFLOW_UID, OVERFLOW_UID),
            ))
            .unwrap();
        assert_eq!(OVERFLOW_UID, record.uid);
        assert_eq!(100, record.pid);
    }

    #[test]
    fn concurrent_workers() {
        let f = Arc::new(fixture(FakeLookup::default(), open_policy(), 10));
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let f = f.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let cred = SenderCredential::from_raw(100 + i, 1000, 1000);
                        f.listener
                            .handle(datagram(MAIN, 42, b"x", cred))
                            .unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(200, f.storage.records().len());
    }

    #[test]
    fn over_the_socket() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logdw");
        let socket = LogSocket::bind(&path).unwrap();
        let writer = LogWriter::new(&path).unwrap();

        // The kernel credential names this very process, but it's complete, so no repair
        // happens & the record is accepted.
        let config = ListenerConfig::builder().daemon_uid(u32::MAX - 1).build();
        let listener = Listener::new(&config, MemoryStorage::new(), Some(PendingMask::new()));

        let hdr = LogHeader {
            log_id: LogCategory::LOG_ID_SYSTEM as u8,
            tid: 42,
            realtime: TS,
        };
        writer.write(&hdr, b"over the wire").unwrap();
        assert!(listener.on_data_available(&socket));

        writer.send(&[0u8; HEADER_SIZE]).unwrap();
        assert!(!listener.on_data_available(&socket));

        let entries = listener.storage().entries();
        assert_eq!(1, entries.len());
        let record = &entries[0].record;
        assert_eq!(LogCategory::LOG_ID_SYSTEM, record.category);
        assert_eq!(std::process::id() as i32, record.pid);
        assert_eq!(nix::unistd::getuid().as_raw(), record.uid);
        assert_eq!(&b"over the wire"[..], &record.msg[..]);
    }

    #[test]
    fn naming_never_holds_up_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logdw");
        let socket = LogSocket::bind(&path).unwrap();
        let writer = LogWriter::new(&path).unwrap();

        let config = ListenerConfig::builder().daemon_uid(u32::MAX - 1).build();
        let listener = Listener::new(&config, MemoryStorage::new(), Some(PendingMask::new()));

        for tid in 1..=4 {
            let hdr = LogHeader {
                log_id: LogCategory::LOG_ID_MAIN as u8,
                tid,
                realtime: TS,
            };
            writer.write(&hdr, b"named").unwrap();
        }

        // Twice on this thread, then once each on two more threads.
        assert!(listener.on_data_available(&socket));
        assert!(WORKER_NAMED.load(Ordering::Relaxed));
        assert!(listener.on_data_available(&socket));
        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| listener.on_data_available(&socket)))
                .collect();
            for worker in workers {
                assert!(worker.join().unwrap());
            }
        });

        let mut tids: Vec<i32> = listener
            .storage()
            .entries()
            .iter()
            .map(|entry| entry.record.tid)
            .collect();
        tids.sort_unstable();
        assert_eq!(vec![1, 2, 3, 4], tids);
        assert!(WORKER_NAMED.load(Ordering::Relaxed));
    }
}
