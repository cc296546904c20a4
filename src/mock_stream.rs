use std::cmp::min;
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use imap::extensions::idle::SetReadTimeout;

/// A pretend server connection for driving the `imap` crate in tests.
///
/// Reads come from a fixed script. A fed stream blocks once the script runs dry until the test
/// sends more bytes; an unfed one reports `WouldBlock`, which `IDLE` treats as a timeout.
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    feed: Option<Receiver<Vec<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    pub fn new(read_buf: impl Into<Vec<u8>>) -> MockStream {
        MockStream {
            read_buf: read_buf.into(),
            read_pos: 0,
            feed: None,
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A stream that waits for more server bytes on the returned sender.
    pub fn fed(read_buf: impl Into<Vec<u8>>) -> (MockStream, Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let mut stream = MockStream::new(read_buf);
        stream.feed = Some(rx);
        (stream, tx)
    }

    /// Everything the client wrote, shared with the stream.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    fn refill(&mut self) -> bool {
        let more = match self.feed {
            Some(ref feed) => feed.recv_timeout(Duration::from_secs(10)).ok(),
            None => None,
        };
        match more {
            Some(bytes) => {
                self.read_buf.drain(..self.read_pos);
                self.read_pos = 0;
                self.read_buf.extend_from_slice(&bytes);
                true
            }
            None => false,
        }
    }
}

/// What the client wrote so far, as text.
pub fn written(buf: &Mutex<Vec<u8>>) -> String {
    String::from_utf8_lossy(&buf.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.read_pos >= self.read_buf.len() {
            if !self.refill() {
                return Err(Error::new(ErrorKind::WouldBlock, "no more server data"));
            }
        }
        let write_len = min(buf.len(), self.read_buf.len() - self.read_pos);
        let max_pos = self.read_pos + write_len;
        buf[..write_len].copy_from_slice(&self.read_buf[self.read_pos..max_pos]);
        self.read_pos = max_pos;
        Ok(write_len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl SetReadTimeout for MockStream {
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> imap::Result<()> {
        Ok(())
    }
}
