use lightcore::acquisition::{FrameIngest, IngestOutcome};
use log::{debug, info, warn};
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Inbound half of the device connection, one text line at a time.
pub trait LineSource: Send {
    /// Next complete line, or `None` when nothing arrived before the read
    /// timeout.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        (**self).next_line()
    }
}

/// Line source over any buffered reader, typically a serial port with a
/// read timeout. Partial lines survive timeouts until their newline arrives.
pub struct ReaderLineSource<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: BufRead> ReaderLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }
}

impl<R: BufRead + Send> LineSource for ReaderLineSource<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                thread::sleep(Duration::from_millis(10));
                Ok(None)
            }
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                Ok(Some(line))
            }
            Ok(_) => Ok(None),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Background thread feeding raw lines into the acquisition batch.
pub struct Listener {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Listener {
    pub fn spawn<S>(mut source: S, ingest: FrameIngest) -> Self
    where
        S: LineSource + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Acquire) {
                match source.next_line() {
                    Ok(Some(line)) => {
                        if let IngestOutcome::Accepted(count) = ingest.ingest_line(&line) {
                            debug!("buffered frame {}", count);
                        }
                    }
                    Ok(None) => {}
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                        warn!("device stream closed: {}", err);
                        break;
                    }
                    Err(err) => {
                        warn!("error reading device: {}", err);
                        thread::sleep(Duration::from_millis(150));
                    }
                }
            }
            info!("serial listener stopped");
        });
        Self { stop, handle }
    }

    /// Signals the thread and waits for it to finish its current read.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("serial listener panicked");
        }
    }
}
