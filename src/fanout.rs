//! Copying one byte stream to several independent readers.
//!
//! A single background thread reads the source and hands every chunk to each
//! leg through a bounded relay. The copy moves at the pace of the slowest
//! leg: it blocks on a full relay before reading further.

use std::cell::Cell;
use std::cmp;
use std::fmt;
use std::io;
use std::io::{BufRead, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread;
use std::time::Duration;

use bytes::{Buf, Bytes};
use log::{debug, trace, warn};

type Chunk = io::Result<Bytes>;

/// Tuning for [`fanout_with_options`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanoutOptions {
    /// Largest read issued against the source.
    pub chunk_size: usize,
    /// Chunks each leg may hold before the copy blocks on it.
    pub relay_capacity: usize,
}

impl Default for FanoutOptions {
    fn default() -> Self {
        FanoutOptions {
            chunk_size: crate::DEFAULT_BUF_SIZE,
            relay_capacity: 1,
        }
    }
}

/// Copies `source` to `n` readers on a background thread.
///
/// Every reader yields the full byte sequence of `source`. With `n == 0`
/// the source is still read to the end. `Done` fires once the copy has
/// stopped and every reader has been closed.
pub fn fanout<R>(source: R, n: usize) -> io::Result<(Vec<FanoutReader>, Done)>
where
    R: Read + Send + 'static,
{
    fanout_with_options(source, n, FanoutOptions::default())
}

pub fn fanout_with_options<R>(
    source: R,
    n: usize,
    options: FanoutOptions,
) -> io::Result<(Vec<FanoutReader>, Done)>
where
    R: Read + Send + 'static,
{
    let relay_capacity = cmp::max(options.relay_capacity, 1);
    let chunk_size = cmp::max(options.chunk_size, 1);

    let (senders, readers): (Vec<_>, Vec<_>) = (0..n)
        .map(|_| {
            let (tx, rx) = mpsc::sync_channel(relay_capacity);
            (tx, FanoutReader::new(rx))
        })
        .unzip();
    let (done_tx, done_rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name("fanout".to_string())
        .spawn(move || {
            let copied = Relay::new(senders, chunk_size).run(source);
            debug!("fan-out closed after {} bytes", copied);
            let _ = done_tx.send(());
        })?;

    Ok((
        readers,
        Done {
            rx: done_rx,
            finished: Cell::new(false),
        },
    ))
}

struct Relay {
    legs: Vec<SyncSender<Chunk>>,
    chunk_size: usize,
}

impl Relay {
    fn new(legs: Vec<SyncSender<Chunk>>, chunk_size: usize) -> Self {
        Relay { legs, chunk_size }
    }

    /// Copies `source` to every leg and closes them. Returns bytes read.
    fn run<R: Read>(self, mut source: R) -> u64 {
        if self.legs.is_empty() {
            // Nobody listens, but an upstream writer must not stall.
            return match io::copy(&mut source, &mut io::sink()) {
                Ok(n) => n,
                Err(e) => {
                    warn!("fan-out source failed while draining: {}", e);
                    0
                }
            };
        }

        debug!("fan-out running with {} legs", self.legs.len());
        let mut buf = vec![0; self.chunk_size];
        let mut copied = 0u64;
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("fan-out source failed after {} bytes: {}", copied, e);
                    self.broadcast_error(e.kind(), &e.to_string());
                    break;
                }
            };
            copied += n as u64;
            trace!("fan-out relaying {} bytes", n);

            let chunk = Bytes::copy_from_slice(&buf[..n]);
            let closed = self
                .legs
                .iter()
                .position(|leg| leg.send(Ok(chunk.clone())).is_err());
            if let Some(leg) = closed {
                warn!("fan-out leg {} closed after {} bytes, stopping", leg, copied);
                self.broadcast_error(io::ErrorKind::BrokenPipe, "fan-out leg closed early");
                break;
            }
        }
        debug!("fan-out draining");
        copied
    }

    fn broadcast_error(&self, kind: io::ErrorKind, msg: &str) {
        for leg in &self.legs {
            let _ = leg.send(Err(io::Error::new(kind, msg.to_string())));
        }
    }
}

/// One leg of a fan-out.
pub struct FanoutReader {
    rx: Receiver<Chunk>,
    current: Bytes,
}

impl FanoutReader {
    fn new(rx: Receiver<Chunk>) -> Self {
        FanoutReader {
            rx,
            current: Bytes::new(),
        }
    }
}

impl Read for FanoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let nread = {
            let mut rem = self.fill_buf()?;
            rem.read(buf)?
        };

        self.consume(nread);
        Ok(nread)
    }
}

impl BufRead for FanoutReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.current.is_empty() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => self.current = chunk,
                Ok(Err(e)) => return Err(e),
                // Writer side closed: end of stream.
                Err(_) => break,
            }
        }
        Ok(&self.current)
    }

    fn consume(&mut self, amt: usize) {
        let amt = cmp::min(amt, self.current.len());
        self.current.advance(amt);
    }
}

impl fmt::Debug for FanoutReader {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("FanoutReader")
            .field("buffered", &self.current.len())
            .finish()
    }
}

/// Completion signal of a fan-out. Fires exactly once.
#[derive(Debug)]
pub struct Done {
    rx: Receiver<()>,
    finished: Cell<bool>,
}

impl Done {
    /// Blocks until the fan-out has finished.
    pub fn wait(self) {
        if !self.finished.get() {
            let _ = self.rx.recv();
        }
    }

    /// Returns `true` if the fan-out has finished.
    ///
    /// After the first `true` this keeps returning `true`.
    pub fn try_wait(&self) -> bool {
        if self.finished.get() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => self.finished.set(true),
            Err(TryRecvError::Empty) => {}
        }
        self.finished.get()
    }

    /// Like [`wait`](Done::wait) but gives up after `timeout`. Returns `true`
    /// if the fan-out finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.finished.get() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.finished.set(true),
            Err(RecvTimeoutError::Timeout) => {}
        }
        self.finished.get()
    }
}
