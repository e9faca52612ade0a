use std::io::Write;

use crate::error::Result;
use crate::format::OutputFormat;

/// Destination for collisions, handed each one in the order it was found
pub trait CollisionSink {
    fn accept(&mut self, collision: &[u8]) -> Result<()>;
}

impl CollisionSink for Vec<Vec<u8>> {
    fn accept(&mut self, collision: &[u8]) -> Result<()> {
        self.push(collision.to_vec());
        Ok(())
    }
}

impl<S: CollisionSink + ?Sized> CollisionSink for &mut S {
    fn accept(&mut self, collision: &[u8]) -> Result<()> {
        (**self).accept(collision)
    }
}

/// Optional listener for coarse progress. Every method defaults to doing nothing.
pub trait ProgressObserver {
    /// Called once, before precomputation, with the digest every collision will hash to.
    fn target_chosen(&mut self, _target: u32) {}

    /// Called periodically while the table is being built.
    fn precompute_progress(&mut self, _current: u64, _total: u64) {}
}

impl ProgressObserver for () {}

/// Writes each collision as one rendered line
pub struct WriterSink<W: Write> {
    writer: W,
    format: OutputFormat,
    written: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        WriterSink { writer, format, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> CollisionSink for WriterSink<W> {
    fn accept(&mut self, collision: &[u8]) -> Result<()> {
        writeln!(self.writer, "{}", self.format.render(collision))?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io;

    #[test]
    fn test_writer_sink_renders_lines() {
        let mut sink = WriterSink::new(Vec::new(), OutputFormat::Hex);
        sink.accept(&[0xde, 0xad]).unwrap();
        sink.accept(&[0xbe, 0xef]).unwrap();
        assert_eq!(sink.written(), 2);
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "dead\nbeef\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_resource_unavailable() {
        let mut sink = WriterSink::new(BrokenPipe, OutputFormat::CArray);
        assert!(matches!(sink.accept(&[1]), Err(Error::ResourceUnavailable(_))));
        assert_eq!(sink.written(), 0);
    }

    #[test]
    fn test_vec_sink_collects() {
        fn feed<S: CollisionSink>(mut sink: S) {
            sink.accept(&[1, 2, 3]).unwrap();
        }

        let mut collected: Vec<Vec<u8>> = Vec::new();
        feed(&mut collected);
        assert_eq!(collected, vec![vec![1, 2, 3]]);
    }
}
