use crate::prelude::{ScanError, ScanResult};
use std::io::Write;

/// Outbound half of the device connection.
pub trait DeviceLink {
    /// Writes one command line; the link appends the line terminator.
    fn send_line(&mut self, line: &str) -> ScanResult<()>;
}

impl<L: DeviceLink + ?Sized> DeviceLink for Box<L> {
    fn send_line(&mut self, line: &str) -> ScanResult<()> {
        (**self).send_line(line)
    }
}

/// Adapts any byte writer (a serial port, an in-memory buffer) into a link.
pub struct WriterLink<W> {
    writer: W,
    terminator: &'static str,
}

impl<W: Write> WriterLink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            terminator: "\n",
        }
    }

    pub fn with_terminator(writer: W, terminator: &'static str) -> Self {
        Self { writer, terminator }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write> DeviceLink for WriterLink<W> {
    fn send_line(&mut self, line: &str) -> ScanResult<()> {
        let payload = format!("{}{}", line, self.terminator);
        self.writer
            .write_all(payload.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|err| ScanError::Device(format!("writing '{}': {}", line, err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct BrokenPort;

    impl Write for BrokenPort {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "port unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_link_appends_terminator() {
        let mut link = WriterLink::with_terminator(Vec::new(), "\r\n");
        link.send_line("TABLE,0,35,5").unwrap();
        assert_eq!(link.get_ref().as_slice(), b"TABLE,0,35,5\r\n");
    }

    #[test]
    fn writer_link_reports_device_failure() {
        let mut link = WriterLink::new(BrokenPort);
        let err = link.send_line("TABLE,0,35,5").unwrap_err();
        assert!(matches!(err, ScanError::Device(_)));
    }
}
