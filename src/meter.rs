use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle onto a [`MeteredStream`]'s byte counter.
///
/// The writer keeps a clone so it can read (and re-seed) the count while the
/// stream itself sits inside a `BufWriter`.
#[derive(Debug, Clone, Default)]
pub struct ByteCount(Arc<AtomicU64>);

impl ByteCount {
    /// Create a counter seeded with `initial` bytes.
    ///
    /// Seeded with the pre-existing file length when a file is opened for
    /// append, so the count always reflects the physical file size.
    pub fn new(initial: u64) -> Self {
        Self(Arc::new(AtomicU64::new(initial)))
    }

    /// Current count.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::AcqRel);
    }
}

/// A byte-counting wrapper around a raw output sink.
///
/// Every `write` forwards to the underlying sink and increments the counter
/// by the number of bytes actually written, so rotation decisions can be
/// based on file size without a separate stat call. No buffering of its own
/// — buffering is the encoder's job. Not independently thread-safe; the
/// owning writer synchronizes access.
#[derive(Debug)]
pub struct MeteredStream<W: Write> {
    inner: W,
    count: ByteCount,
}

impl<W: Write> MeteredStream<W> {
    /// Wrap `inner`, counting into `count`.
    pub fn new(inner: W, count: ByteCount) -> Self {
        Self { inner, count }
    }

    /// The wrapped sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for MeteredStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count.add(written as u64);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_written_bytes() {
        let count = ByteCount::new(0);
        let mut stream = MeteredStream::new(Vec::new(), count.clone());

        stream.write_all(b"hello ").unwrap();
        stream.write_all(b"world\n").unwrap();

        assert_eq!(count.get(), 12);
        assert_eq!(stream.get_ref(), b"hello world\n");
    }

    #[test]
    fn test_seeded_count() {
        let count = ByteCount::new(100);
        let mut stream = MeteredStream::new(Vec::new(), count.clone());

        stream.write_all(b"x").unwrap();

        assert_eq!(count.get(), 101);
    }

    #[test]
    fn test_multibyte_records_count_encoded_length() {
        let count = ByteCount::new(0);
        let mut stream = MeteredStream::new(Vec::new(), count.clone());

        // 3 characters, 6 bytes once UTF-8 encoded
        stream.write_all("aé中".as_bytes()).unwrap();

        assert_eq!(count.get(), "aé中".len() as u64);
        assert_eq!(count.get(), 6);
    }
}
