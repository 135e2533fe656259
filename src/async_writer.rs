use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, unbounded};

use crate::error::{Error, ErrorHandler, Result, WriterFailure};
use crate::writer::TextWriter;

enum Command {
    Record(String),
    Shutdown,
}

/// Consumer loop shared by both decorators: drain every record already
/// queued before considering a flush, to amortize its cost.
fn consume<W: TextWriter>(inner: &W, rx: &Receiver<Command>, auto_flush: bool) {
    loop {
        match rx.recv() {
            Ok(Command::Record(record)) => {
                inner.write_record(&record);
                let mut done = false;
                loop {
                    match rx.try_recv() {
                        Ok(Command::Record(record)) => inner.write_record(&record),
                        Ok(Command::Shutdown) => {
                            done = true;
                            break;
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            done = true;
                            break;
                        }
                    }
                }
                if auto_flush {
                    inner.flush();
                }
                if done {
                    break;
                }
            }
            Ok(Command::Shutdown) | Err(_) => break,
        }
    }
    // a producer racing shutdown may have enqueued behind the marker;
    // drain best-effort rather than dropping
    while let Ok(Command::Record(record)) = rx.try_recv() {
        inner.write_record(&record);
    }
}

/// Decouples producers from file I/O latency with one consumer thread.
///
/// Producers enqueue and return; a bounded queue blocks the producer while
/// full — that is the backpressure point, released as the consumer drains.
/// The single consumer preserves global FIFO order across all producers, as
/// observed by enqueue completion order.
///
/// Records are acknowledged on enqueue, not on persist: a failure while
/// writing a dequeued record is delivered to the error handler keyed with
/// the record and never reaches the producer that has long since returned.
pub struct AsynchronousTextWriter<W: TextWriter + 'static> {
    inner: Arc<W>,
    tx: Sender<Command>,
    stopped: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
    handler: Arc<dyn ErrorHandler>,
}

impl<W: TextWriter + 'static> AsynchronousTextWriter<W> {
    /// Wrap `inner`. `capacity` of `None` means an unbounded queue — no
    /// backpressure, producers never block. When the decorator auto-flushes,
    /// the wrapped writer should not also auto-flush per record.
    pub fn new(
        inner: W,
        capacity: Option<usize>,
        auto_flush: bool,
        handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self> {
        let inner = Arc::new(inner);
        let (tx, rx) = match capacity {
            Some(n) => bounded(n),
            None => unbounded(),
        };
        let consumer = thread::Builder::new().name("rotolog-writer".to_string()).spawn({
            let inner = Arc::clone(&inner);
            move || consume(&*inner, &rx, auto_flush)
        })?;
        Ok(Self {
            inner,
            tx,
            stopped: AtomicBool::new(false),
            consumer: Mutex::new(Some(consumer)),
            handler,
        })
    }

    /// The wrapped writer.
    pub fn wrapped(&self) -> &W {
        &self.inner
    }

    fn shutdown_impl(&self) {
        let mut consumer = self.consumer.lock().unwrap();
        if let Some(handle) = consumer.take() {
            self.stopped.store(true, Ordering::Release);
            // the marker queues behind every accepted record, so the
            // consumer writes them all out before exiting
            let _ = self.tx.send(Command::Shutdown);
            let _ = handle.join();
            self.inner.shutdown();
        }
    }
}

impl<W: TextWriter + 'static> TextWriter for AsynchronousTextWriter<W> {
    fn write_record(&self, record: &str) {
        if self.stopped.load(Ordering::Acquire) {
            self.handler.handle(WriterFailure::Rejected {
                record: record.to_string(),
            });
            return;
        }
        // blocks while a bounded queue is full; interrupted only by the
        // consumer draining a slot or disconnecting
        if self.tx.send(Command::Record(record.to_string())).is_err() {
            self.handler.handle(WriterFailure::Rejected {
                record: record.to_string(),
            });
        }
    }

    /// Flushes the wrapped writer directly; queued records are not awaited
    /// (they are acknowledged on enqueue, not on persist).
    fn flush(&self) {
        self.inner.flush();
    }

    fn shutdown(&self) {
        self.shutdown_impl();
    }

    fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }
}

impl<W: TextWriter + 'static> Drop for AsynchronousTextWriter<W> {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}

/// Decouples producers from file I/O with a fixed pool of consumer threads.
///
/// Global FIFO is explicitly relaxed to a **per-producer** guarantee: each
/// producer thread is pinned to one consumer queue by thread-id hash, so one
/// producer's records stay in submission order while records from different
/// producers may interleave arbitrarily at the wrapped writer. Use the
/// single-consumer [`AsynchronousTextWriter`] when global ordering matters.
pub struct ParallelTextWriter<W: TextWriter + 'static> {
    inner: Arc<W>,
    queues: Vec<Sender<Command>>,
    stopped: AtomicBool,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    handler: Arc<dyn ErrorHandler>,
}

impl<W: TextWriter + 'static> ParallelTextWriter<W> {
    /// Wrap `inner` with `workers` consumer threads, each behind its own
    /// queue of `capacity` (`None` for unbounded).
    pub fn new(
        inner: W,
        workers: usize,
        capacity: Option<usize>,
        auto_flush: bool,
        handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config(
                "parallel writer needs at least one worker".to_string(),
            ));
        }

        let inner = Arc::new(inner);
        let mut queues = Vec::with_capacity(workers);
        let mut consumers = Vec::with_capacity(workers);
        for i in 0..workers {
            let (tx, rx) = match capacity {
                Some(n) => bounded(n),
                None => unbounded(),
            };
            let handle = thread::Builder::new()
                .name(format!("rotolog-writer-{i}"))
                .spawn({
                    let inner = Arc::clone(&inner);
                    move || consume(&*inner, &rx, auto_flush)
                })?;
            queues.push(tx);
            consumers.push(handle);
        }

        Ok(Self {
            inner,
            queues,
            stopped: AtomicBool::new(false),
            consumers: Mutex::new(consumers),
            handler,
        })
    }

    /// The wrapped writer.
    pub fn wrapped(&self) -> &W {
        &self.inner
    }

    /// The queue this producer thread is pinned to.
    fn slot(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        (hasher.finish() as usize) % self.queues.len()
    }

    fn shutdown_impl(&self) {
        let mut consumers = self.consumers.lock().unwrap();
        if consumers.is_empty() {
            return;
        }
        self.stopped.store(true, Ordering::Release);
        for queue in &self.queues {
            let _ = queue.send(Command::Shutdown);
        }
        for handle in consumers.drain(..) {
            let _ = handle.join();
        }
        self.inner.shutdown();
    }
}

impl<W: TextWriter + 'static> TextWriter for ParallelTextWriter<W> {
    fn write_record(&self, record: &str) {
        if self.stopped.load(Ordering::Acquire) {
            self.handler.handle(WriterFailure::Rejected {
                record: record.to_string(),
            });
            return;
        }
        let queue = &self.queues[self.slot()];
        if queue.send(Command::Record(record.to_string())).is_err() {
            self.handler.handle(WriterFailure::Rejected {
                record: record.to_string(),
            });
        }
    }

    /// Flushes the wrapped writer directly; queued records are not awaited.
    fn flush(&self) {
        self.inner.flush();
    }

    fn shutdown(&self) {
        self.shutdown_impl();
    }

    fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }
}

impl<W: TextWriter + 'static> Drop for ParallelTextWriter<W> {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}
