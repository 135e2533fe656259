use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use time::OffsetDateTime;

use crate::config::WriterConfig;
use crate::error::{Error, ErrorHandler, Result, WriterFailure};
use crate::meter::{ByteCount, MeteredStream};
use crate::naming::FileNamingPolicy;
use crate::retention::{LogFile, RetentionPolicy};
use crate::rotation::{RotationPolicy, RotationView};

/// Common contract of every text log writer.
///
/// One call is one opaque line; the writer appends the line terminator.
/// Failures never propagate to callers — logging is best-effort and every
/// failure goes to the writer's [`ErrorHandler`] instead.
pub trait TextWriter: Send + Sync {
    /// Write one record.
    fn write_record(&self, record: &str);

    /// Flush buffered output to the sink.
    fn flush(&self);

    /// Stop background work, drain pending records and close the sink.
    /// Idempotent; the writer is not reusable afterwards.
    fn shutdown(&self);

    /// Bytes written to the current file since it was opened.
    fn bytes_written(&self) -> u64;
}

/// Live output sink: file handle, byte meter and buffered encoder.
/// Exactly one of these exists per writer at any instant.
struct OpenSink {
    out: BufWriter<MeteredStream<File>>,
    meter: ByteCount,
}

impl OpenSink {
    /// Exact logical byte count: bytes on disk plus bytes still buffered.
    fn bytes_written(&self) -> u64 {
        self.meter.get() + self.out.buffer().len() as u64
    }
}

enum Sink {
    Open(OpenSink),
    /// Reopening after a rotation failed; writes fail-and-report until the
    /// condition clears or the writer is reconfigured. No retry loop.
    Degraded,
    Closed,
}

fn open_sink(path: &Path, append: bool, buffer_size: usize) -> io::Result<OpenSink> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)?
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?
    };
    // seed the meter with the pre-existing length so append mode is accounted for
    let initial_len = file.metadata().map(|m| m.len()).unwrap_or(0);
    let meter = ByteCount::new(initial_len);
    let out = BufWriter::with_capacity(buffer_size, MeteredStream::new(file, meter.clone()));
    Ok(OpenSink { out, meter })
}

fn unavailable(record: &str) -> WriterFailure {
    WriterFailure::Write {
        record: record.to_string(),
        source: io::Error::new(io::ErrorKind::NotConnected, "log sink unavailable"),
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn from_unix(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[derive(Default)]
struct Stats {
    last_rotation_unix: AtomicI64,
    last_clean_unix: AtomicI64,
    last_clean_count: AtomicU64,
    total_rotated: AtomicU64,
    total_cleaned: AtomicU64,
}

struct CheckerState {
    interval: Duration,
    stop: bool,
}

/// Wakes the checker early on interval changes and shutdown.
struct CheckerControl {
    state: Mutex<CheckerState>,
    wake: Condvar,
}

struct Shared {
    sink: Mutex<Sink>,
    naming: RwLock<Arc<dyn FileNamingPolicy>>,
    // policy sets live under their own locks so reconfiguration does not
    // contend with the hot write path
    rotation_policies: RwLock<Vec<Arc<dyn RotationPolicy>>>,
    retention_policies: RwLock<Vec<Arc<dyn RetentionPolicy>>>,
    handler: Arc<dyn ErrorHandler>,
    /// Cached minimum of the size-based policies' limits; 0 disables the
    /// pre-emptive size check. Recomputed whenever the policy set changes.
    size_limit: AtomicU64,
    auto_flush: AtomicBool,
    append: AtomicBool,
    buffer_size: AtomicUsize,
    stats: Stats,
    control: CheckerControl,
}

impl Shared {
    fn write_record(&self, record: &str) {
        let mut sink = self.sink.lock().unwrap();

        match &*sink {
            Sink::Closed => {
                self.handler.handle(WriterFailure::Rejected {
                    record: record.to_string(),
                });
                return;
            }
            Sink::Degraded => {
                self.handler.handle(unavailable(record));
                return;
            }
            Sink::Open(_) => {}
        }

        // encoded UTF-8 length plus the line terminator, not character count
        let encoded = record.len() as u64 + 1;
        let limit = self.size_limit.load(Ordering::Acquire);
        if limit > 0
            && let Sink::Open(open) = &*sink
            && open.bytes_written() + encoded >= limit
        {
            // rotate strictly before the write that would breach the limit,
            // so no completed file ever exceeds it
            self.rotate_locked(&mut sink);
        }

        let Sink::Open(open) = &mut *sink else {
            self.handler.handle(unavailable(record));
            return;
        };

        let written = open
            .out
            .write_all(record.as_bytes())
            .and_then(|()| open.out.write_all(b"\n"));
        match written {
            Ok(()) => {
                if self.auto_flush.load(Ordering::Acquire)
                    && let Err(e) = open.out.flush()
                {
                    self.handler.handle(WriterFailure::Flush { source: e });
                }
            }
            Err(e) => self.handler.handle(WriterFailure::Write {
                record: record.to_string(),
                source: e,
            }),
        }
    }

    /// Rotate the sink. Caller holds the sink lock, so no `write_record`
    /// can interleave a partial rotation. Close, rename and reopen only —
    /// the critical section stays short.
    fn rotate_locked(&self, sink: &mut Sink) {
        if let Sink::Open(open) = sink
            && let Err(e) = open.out.flush()
        {
            self.handler.handle(WriterFailure::Flush { source: e });
        }
        // drops the old sink, closing the file
        *sink = Sink::Degraded;

        let naming = self.naming.read().unwrap().clone();
        let initial = naming.initial_name();
        let next = naming.next_name();
        // best-effort: a failed rename is reported and rotation continues
        if let Err(e) = fs::rename(&initial, &next) {
            self.handler.handle(WriterFailure::Rename {
                from: initial.clone(),
                to: next,
                source: e,
            });
        }

        match open_sink(
            &initial,
            self.append.load(Ordering::Acquire),
            self.buffer_size.load(Ordering::Acquire),
        ) {
            Ok(open) => *sink = Sink::Open(open),
            Err(e) => self.handler.handle(WriterFailure::Open {
                path: initial,
                source: e,
            }),
        }

        self.stats
            .last_rotation_unix
            .store(now_unix(), Ordering::Release);
        self.stats.total_rotated.fetch_add(1, Ordering::AcqRel);
    }

    /// One checker tick: ask every rotation policy, rotate at most once on
    /// the first positive, then run every retention policy in turn.
    fn run_checks(&self) {
        self.check_rotation();
        self.apply_retention();
    }

    fn check_rotation(&self) {
        let policies = self.rotation_policies.read().unwrap().clone();
        if policies.is_empty() {
            return;
        }

        let mut sink = self.sink.lock().unwrap();
        let Sink::Open(open) = &*sink else { return };
        let view = RotationView {
            bytes_written: open.bytes_written(),
            last_rotation: from_unix(self.stats.last_rotation_unix.load(Ordering::Acquire)),
        };
        // rotate at most once per tick, however many policies agree
        if policies.iter().any(|p| p.should_rotate(&view)) {
            self.rotate_locked(&mut sink);
        }
    }

    fn apply_retention(&self) {
        let policies = self.retention_policies.read().unwrap().clone();
        if policies.is_empty() {
            return;
        }

        let naming = self.naming.read().unwrap().clone();
        let active = naming.initial_name();
        let listed = match naming.list_files() {
            Ok(files) => files,
            Err(e) => {
                self.handler.handle(WriterFailure::Retention {
                    policy: "file listing".to_string(),
                    source: e,
                });
                return;
            }
        };

        let mut files = Vec::with_capacity(listed.len());
        for path in listed {
            // a file listed then immediately deleted by another process is
            // not an error, just gone
            if let Ok(info) = LogFile::stat(&path) {
                files.push(info);
            }
        }

        let mut cleaned = 0u64;
        for policy in policies {
            let doomed = match policy.files_to_delete(&files, &active) {
                Ok(doomed) => doomed,
                Err(e) => {
                    // one failing policy does not stop the others
                    self.handler.handle(WriterFailure::Retention {
                        policy: policy.name().to_string(),
                        source: e,
                    });
                    continue;
                }
            };
            for path in doomed {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        cleaned += 1;
                        files.retain(|f| f.path != path);
                    }
                    Err(e) => self.handler.handle(WriterFailure::Delete { path, source: e }),
                }
            }
        }

        self.stats
            .last_clean_unix
            .store(now_unix(), Ordering::Release);
        self.stats.last_clean_count.store(cleaned, Ordering::Release);
        self.stats.total_cleaned.fetch_add(cleaned, Ordering::AcqRel);
    }

    fn recompute_size_limit(&self) {
        let limit = self
            .rotation_policies
            .read()
            .unwrap()
            .iter()
            .filter_map(|p| p.size_limit())
            .min()
            .unwrap_or(0);
        self.size_limit.store(limit, Ordering::Release);
    }
}

/// Interruption-aware periodic check loop; runs on a dedicated thread.
fn checker_loop(shared: &Shared) {
    loop {
        let mut state = shared.control.state.lock().unwrap();
        loop {
            if state.stop {
                return;
            }
            let interval = state.interval;
            let (guard, timeout) = shared.control.wake.wait_timeout(state, interval).unwrap();
            state = guard;
            if state.stop {
                return;
            }
            if timeout.timed_out() {
                break;
            }
            // woken early: the interval changed, restart the sleep with it
        }
        drop(state);

        shared.run_checks();
    }
}

/// A writer that owns one live log file, rotates it via a naming policy and
/// enforces rotation/retention policies from a background checker.
///
/// `write_record` is thread-safe; many producers may call it concurrently.
/// Rotation happens either pre-emptively on the write path (size limit) or
/// from the periodic checker, always under the sink lock, so a record is
/// written entirely to the pre-rotation file or entirely to the
/// post-rotation file — never split, never lost.
pub struct MultifileTextWriter {
    shared: Arc<Shared>,
    checker: Mutex<Option<JoinHandle<()>>>,
}

impl MultifileTextWriter {
    /// Open the naming policy's initial file and start the periodic checker.
    ///
    /// Parent directories are created if necessary. Construction-time
    /// failures are configuration errors and are returned synchronously.
    pub fn new(
        naming: Arc<dyn FileNamingPolicy>,
        config: &WriterConfig,
        handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self> {
        if config.check_interval.is_zero() {
            return Err(Error::Config("check interval must be non-zero".to_string()));
        }
        if config.buffer_size == 0 {
            return Err(Error::Config("buffer size must be non-zero".to_string()));
        }

        let initial = naming.initial_name();
        if let Some(parent) = initial.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let sink = open_sink(&initial, config.append, config.buffer_size)?;

        let shared = Arc::new(Shared {
            sink: Mutex::new(Sink::Open(sink)),
            naming: RwLock::new(naming),
            rotation_policies: RwLock::new(Vec::new()),
            retention_policies: RwLock::new(Vec::new()),
            handler,
            size_limit: AtomicU64::new(0),
            auto_flush: AtomicBool::new(config.auto_flush),
            append: AtomicBool::new(config.append),
            buffer_size: AtomicUsize::new(config.buffer_size),
            stats: Stats::default(),
            control: CheckerControl {
                state: Mutex::new(CheckerState {
                    interval: config.check_interval,
                    stop: false,
                }),
                wake: Condvar::new(),
            },
        });
        shared
            .stats
            .last_rotation_unix
            .store(now_unix(), Ordering::Release);

        let checker = thread::Builder::new()
            .name("rotolog-checker".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || checker_loop(&shared)
            })?;

        Ok(Self {
            shared,
            checker: Mutex::new(Some(checker)),
        })
    }

    /// Attach a rotation policy and refresh the cached size limit.
    pub fn add_rotation_policy(&self, policy: Arc<dyn RotationPolicy>) {
        self.shared.rotation_policies.write().unwrap().push(policy);
        self.shared.recompute_size_limit();
    }

    /// Replace the rotation policy set.
    pub fn set_rotation_policies(&self, policies: Vec<Arc<dyn RotationPolicy>>) {
        *self.shared.rotation_policies.write().unwrap() = policies;
        self.shared.recompute_size_limit();
    }

    /// Detach every rotation policy.
    pub fn remove_all_rotation_policies(&self) {
        self.set_rotation_policies(Vec::new());
    }

    /// Attach a retention policy.
    pub fn add_retention_policy(&self, policy: Arc<dyn RetentionPolicy>) {
        self.shared.retention_policies.write().unwrap().push(policy);
    }

    /// Detach every retention policy.
    pub fn remove_all_retention_policies(&self) {
        self.shared.retention_policies.write().unwrap().clear();
    }

    /// Change the checker interval. A sleeping checker wakes immediately and
    /// re-sleeps on the new interval instead of waiting out the old one.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Config("check interval must be non-zero".to_string()));
        }
        let mut state = self.shared.control.state.lock().unwrap();
        state.interval = interval;
        self.shared.control.wake.notify_all();
        Ok(())
    }

    /// Change the encoder buffer size; takes effect at the next reopen.
    pub fn set_buffer_size(&self, buffer_size: usize) -> Result<()> {
        if buffer_size == 0 {
            return Err(Error::Config("buffer size must be non-zero".to_string()));
        }
        self.shared.buffer_size.store(buffer_size, Ordering::Release);
        Ok(())
    }

    /// Toggle per-record flushing.
    pub fn set_auto_flush(&self, auto_flush: bool) {
        self.shared.auto_flush.store(auto_flush, Ordering::Release);
    }

    /// Toggle append mode for subsequent reopens.
    pub fn set_append(&self, append: bool) {
        self.shared.append.store(append, Ordering::Release);
    }

    /// Swap the naming policy, recreating the sink at the new initial name.
    ///
    /// The new sink is opened before any state changes, so a failure leaves
    /// the writer exactly as it was.
    pub fn set_naming_policy(&self, naming: Arc<dyn FileNamingPolicy>) -> Result<()> {
        let initial = naming.initial_name();
        if let Some(parent) = initial.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let new_sink = open_sink(
            &initial,
            self.shared.append.load(Ordering::Acquire),
            self.shared.buffer_size.load(Ordering::Acquire),
        )?;

        let mut sink = self.shared.sink.lock().unwrap();
        if matches!(&*sink, Sink::Closed) {
            return Err(Error::Config("writer is shut down".to_string()));
        }
        if let Sink::Open(open) = &mut *sink
            && let Err(e) = open.out.flush()
        {
            self.shared.handler.handle(WriterFailure::Flush { source: e });
        }
        *sink = Sink::Open(new_sink);
        *self.shared.naming.write().unwrap() = naming;
        Ok(())
    }

    /// Path of the live log file.
    pub fn current_file(&self) -> PathBuf {
        self.shared.naming.read().unwrap().initial_name()
    }

    /// When the writer last rotated (or opened its file).
    pub fn last_rotation_time(&self) -> OffsetDateTime {
        from_unix(self.shared.stats.last_rotation_unix.load(Ordering::Acquire))
    }

    /// When retention last ran.
    pub fn last_clean_time(&self) -> OffsetDateTime {
        from_unix(self.shared.stats.last_clean_unix.load(Ordering::Acquire))
    }

    /// Files deleted by the most recent retention pass.
    pub fn last_clean_count(&self) -> u64 {
        self.shared.stats.last_clean_count.load(Ordering::Acquire)
    }

    /// Rotations performed since the writer was created.
    pub fn total_files_rotated(&self) -> u64 {
        self.shared.stats.total_rotated.load(Ordering::Acquire)
    }

    /// Files deleted by retention since the writer was created.
    pub fn total_files_cleaned(&self) -> u64 {
        self.shared.stats.total_cleaned.load(Ordering::Acquire)
    }

    fn shutdown_impl(&self) {
        {
            let mut state = self.shared.control.state.lock().unwrap();
            state.stop = true;
            self.shared.control.wake.notify_all();
        }
        if let Some(handle) = self.checker.lock().unwrap().take() {
            let _ = handle.join();
        }

        let mut sink = self.shared.sink.lock().unwrap();
        if let Sink::Open(open) = &mut *sink {
            if let Err(e) = open.out.flush() {
                self.shared.handler.handle(WriterFailure::Flush { source: e });
            }
            if let Err(e) = open.out.get_ref().get_ref().sync_all() {
                self.shared.handler.handle(WriterFailure::Close { source: e });
            }
        }
        *sink = Sink::Closed;
    }
}

impl TextWriter for MultifileTextWriter {
    fn write_record(&self, record: &str) {
        self.shared.write_record(record);
    }

    fn flush(&self) {
        let mut sink = self.shared.sink.lock().unwrap();
        if let Sink::Open(open) = &mut *sink
            && let Err(e) = open.out.flush()
        {
            self.shared.handler.handle(WriterFailure::Flush { source: e });
        }
    }

    fn shutdown(&self) {
        self.shutdown_impl();
    }

    fn bytes_written(&self) -> u64 {
        match &*self.shared.sink.lock().unwrap() {
            Sink::Open(open) => open.bytes_written(),
            _ => 0,
        }
    }
}

impl Drop for MultifileTextWriter {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}
