//! I/O boundary.
//!
//! A byte sink (output) and byte source (input), kept behind traits the
//! same way the teacher's `CommunicationInterface` abstracts its bus:
//! the execution core never talks to stdio directly, only through these
//! two narrow interfaces, so tests can swap in in-memory buffers.

use crate::error::UmError;

/// A blocking single-byte output sink. Errors are Fatal.
pub trait ByteSink {
    fn put(&mut self, byte: u8) -> Result<(), UmError>;

    /// Ensures every previously-`put` byte has left the sink. OUT must
    /// flush before any subsequent IN, to avoid deadlocking interactive
    /// programs that expect their prompt to be visible before blocking
    /// on stdin.
    fn flush(&mut self) -> Result<(), UmError>;
}

/// A blocking single-byte input source. No pushback is required.
pub trait ByteSource {
    /// Returns the next byte, or `None` on end-of-input.
    fn get(&mut self) -> Result<Option<u8>, UmError>;
}

/// Standard-output byte sink.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ByteSink for StdoutSink {
    fn put(&mut self, byte: u8) -> Result<(), UmError> {
        use std::io::Write;
        std::io::stdout()
            .write_all(&[byte])
            .map_err(|e| UmError::FatalIoSink(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), UmError> {
        use std::io::Write;
        std::io::stdout()
            .flush()
            .map_err(|e| UmError::FatalIoSink(e.to_string()))
    }
}

/// Standard-input byte source.
#[derive(Debug, Default)]
pub struct StdinSource;

impl ByteSource for StdinSource {
    fn get(&mut self) -> Result<Option<u8>, UmError> {
        use std::io::Read;
        let mut buf = [0u8; 1];
        match std::io::stdin().read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) => Err(UmError::FatalIoSource(e.to_string())),
        }
    }
}

/// An in-memory sink, useful for tests and for embedding the machine in
/// a host that wants to capture output rather than write to a console.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub bytes: Vec<u8>,
}

impl ByteSink for BufferSink {
    fn put(&mut self, byte: u8) -> Result<(), UmError> {
        self.bytes.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), UmError> {
        Ok(())
    }
}

/// An in-memory source that yields bytes from a fixed buffer and then
/// signals end-of-input forever after.
#[derive(Debug, Default)]
pub struct BufferSource {
    bytes: std::collections::VecDeque<u8>,
}

impl BufferSource {
    pub fn new(bytes: impl Into<std::collections::VecDeque<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl ByteSource for BufferSource {
    fn get(&mut self) -> Result<Option<u8>, UmError> {
        Ok(self.bytes.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_records_bytes_in_order() {
        let mut sink = BufferSink::default();
        sink.put(b'A').unwrap();
        sink.put(b'B').unwrap();
        assert_eq!(sink.bytes, vec![b'A', b'B']);
    }

    #[test]
    fn buffer_source_signals_eof_after_exhaustion() {
        let mut source = BufferSource::new(vec![1, 2]);
        assert_eq!(source.get().unwrap(), Some(1));
        assert_eq!(source.get().unwrap(), Some(2));
        assert_eq!(source.get().unwrap(), None);
        assert_eq!(source.get().unwrap(), None);
    }
}
