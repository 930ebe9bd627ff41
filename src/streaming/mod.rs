//! Buffered byte copying between backend and client streams.

use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

/// Copy buffer size. Matches the common transport chunk size so one
/// read usually drains one frame.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// When the writer is flushed during a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushInterval {
    /// Leave flushing to the transport.
    Never,
    /// Flush after every write. Keeps Server-Sent-Events-style bodies
    /// moving through intermediary buffers.
    EveryWrite,
    /// Flush when this much time has passed since the last flush.
    Periodic(Duration),
}

impl FlushInterval {
    /// Config encoding: negative flushes every write, zero never,
    /// positive periodically.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => Self::EveryWrite,
            0 => Self::Never,
            ms => Self::Periodic(Duration::from_millis(ms as u64)),
        }
    }
}

/// A pool of fixed-size byte buffers shared across requests to bound
/// allocation churn under load.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buf_size: usize,
}

impl BufferPool {
    pub fn new(buf_size: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            buf_size,
        })
    }

    /// Take a buffer from the pool, allocating when the pool is empty.
    /// The buffer returns to the pool when the guard drops, on every
    /// exit path.
    pub fn get(self: &Arc<Self>) -> PooledBuf {
        let buf = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| vec![0u8; self.buf_size]);
        PooledBuf {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

/// A pooled buffer, returned to its pool on drop.
#[derive(Debug)]
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        if let Ok(mut free) = self.pool.free.lock() {
            free.push(buf);
        }
    }
}

/// Copy `reader` to `writer` through a pooled buffer until EOF.
///
/// EOF is success; any other I/O error propagates. Returns the number
/// of bytes copied.
pub async fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    pool: &Arc<BufferPool>,
    flush: FlushInterval,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = pool.get();
    let mut total = 0u64;
    let mut last_flush = Instant::now();

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;

        match flush {
            FlushInterval::Never => {}
            FlushInterval::EveryWrite => writer.flush().await?,
            FlushInterval::Periodic(interval) => {
                if last_flush.elapsed() >= interval {
                    writer.flush().await?;
                    last_flush = Instant::now();
                }
            }
        }
    }

    if flush != FlushInterval::Never {
        writer.flush().await?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(input: &[u8]) -> Vec<u8> {
        let pool = BufferPool::new(DEFAULT_BUFFER_SIZE);
        let mut reader = input;
        let mut out = Vec::new();
        let copied = copy_stream(&mut reader, &mut out, &pool, FlushInterval::Never)
            .await
            .unwrap();
        assert_eq!(copied, input.len() as u64);
        out
    }

    #[tokio::test]
    async fn empty_input_round_trips() {
        assert!(round_trip(b"").await.is_empty());
    }

    #[tokio::test]
    async fn input_of_exactly_buffer_size_round_trips() {
        let input: Vec<u8> = (0..DEFAULT_BUFFER_SIZE).map(|i| (i % 251) as u8).collect();
        assert_eq!(round_trip(&input).await, input);
    }

    #[tokio::test]
    async fn input_many_times_buffer_size_round_trips() {
        let pool = BufferPool::new(32);
        let mut input = Vec::with_capacity(32 * 3000);
        for i in 0..3000 {
            input.extend_from_slice(&[(i % 251) as u8; 32]);
        }
        let mut reader = &input[..];
        let mut out = Vec::new();
        let copied = copy_stream(&mut reader, &mut out, &pool, FlushInterval::Never)
            .await
            .unwrap();
        assert_eq!(copied, input.len() as u64);
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn flush_every_write_still_round_trips() {
        let pool = BufferPool::new(16);
        let input = b"data: event-stream payload\n\n".repeat(8);
        let mut reader = &input[..];
        let mut out = Vec::new();
        copy_stream(&mut reader, &mut out, &pool, FlushInterval::EveryWrite)
            .await
            .unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn buffers_return_to_the_pool() {
        let pool = BufferPool::new(64);
        assert_eq!(pool.idle(), 0);
        {
            let _a = pool.get();
            let _b = pool.get();
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 2);
        {
            let _c = pool.get();
            assert_eq!(pool.idle(), 1);
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn flush_interval_config_encoding() {
        assert_eq!(FlushInterval::from_millis(-1), FlushInterval::EveryWrite);
        assert_eq!(FlushInterval::from_millis(0), FlushInterval::Never);
        assert_eq!(
            FlushInterval::from_millis(250),
            FlushInterval::Periodic(Duration::from_millis(250))
        );
    }
}
