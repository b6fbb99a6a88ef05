use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::drivers::{GloveError, Sample};

/// Anything that persists accepted raw samples, one record each, in arrival order.
pub trait SampleSink {
    fn record(&mut self, sample: &Sample) -> Result<(), GloveError>;
    fn finish(&mut self) -> Result<(), GloveError>;
}

/// Byte destination of the session log.
pub trait LogTarget: Write {
    /// Discard everything past `len` bytes; later writes continue from there.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogTarget for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

type Opener = Box<dyn FnMut(&Path) -> io::Result<Box<dyn LogTarget>>>;

fn open_append(path: &Path) -> io::Result<Box<dyn LogTarget>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// CSV session log: `Timestamp,Channel_1..Channel_N` header, then one row per sample.
///
/// Rows are encoded in memory and written whole. Every (re)open truncates the
/// file back to the last complete row, so a failed write never leaves a
/// fragment or a duplicate behind.
pub struct CsvRecorder {
    path: PathBuf,
    opener: Opener,
    target: Option<Box<dyn LogTarget>>,
    committed: u64,
    rows: u64,
}

impl CsvRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_opener(path, Box::new(open_append))
    }

    fn with_opener(path: impl Into<PathBuf>, opener: Opener) -> Self {
        Self {
            path: path.into(),
            opener,
            target: None,
            committed: 0,
            rows: 0,
        }
    }

    /// File name derived from the session start, e.g. `adc_data_20250623_130130.csv`.
    pub fn for_session(log_dir: &Path, started: DateTime<Local>) -> Self {
        let name = format!("adc_data_{}.csv", started.format("%Y%m%d_%H%M%S"));
        Self::new(log_dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Header (first row only) plus the sample's row, as CSV bytes.
    fn encode(&self, sample: &Sample) -> Result<Vec<u8>, GloveError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if self.committed == 0 {
            let header: Vec<String> = std::iter::once("Timestamp".to_owned())
                .chain((1..=sample.num_channels()).map(|i| format!("Channel_{i}")))
                .collect();
            writer.write_record(&header)?;
        }
        let row: Vec<String> = std::iter::once(
            sample
                .timestamp()
                .wall
                .format("%Y-%m-%d %H:%M:%S%.6f")
                .to_string(),
        )
        .chain(sample.values().iter().map(|v| v.to_string()))
        .collect();
        writer.write_record(&row)?;
        writer
            .into_inner()
            .map_err(|e| GloveError::Persist(format!("encoding row: {e}")))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), GloveError> {
        if self.target.is_none() {
            let mut target = (self.opener)(&self.path)?;
            target.truncate(self.committed)?;
            if self.committed == 0 {
                log::info!("Recording started: {}", self.path.display());
            }
            self.target = Some(target);
        }
        let target = self
            .target
            .as_mut()
            .ok_or_else(|| GloveError::Persist("log file is not open".into()))?;
        target.write_all(bytes)?;
        target.flush()?;
        self.committed += bytes.len() as u64;
        Ok(())
    }
}

impl SampleSink for CsvRecorder {
    fn record(&mut self, sample: &Sample) -> Result<(), GloveError> {
        let bytes = self.encode(sample)?;
        if let Err(first) = self.write_bytes(&bytes) {
            log::warn!("Writing log row failed ({first}); reopening and retrying once");
            self.target = None;
            self.write_bytes(&bytes).map_err(|second| {
                self.target = None;
                GloveError::Persist(format!("{}: {second}", self.path.display()))
            })?;
        }
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), GloveError> {
        if let Some(mut target) = self.target.take() {
            target.flush()?;
            log::info!(
                "Recording saved: {} rows in {}",
                self.rows,
                self.path.display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::Timestamp;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::rc::Rc;

    #[test]
    fn writes_header_once_then_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CsvRecorder::new(dir.path().join("log.csv"));
        for i in 0..3 {
            let sample = Sample::new(Timestamp::now(), vec![i as f64, 0.5]);
            recorder.record(&sample).unwrap();
        }
        recorder.finish().unwrap();
        let text = fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Timestamp,Channel_1,Channel_2");
        for (i, line) in lines[1..].iter().enumerate() {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[1], i.to_string());
            assert_eq!(fields[2], "0.5");
        }
        assert_eq!(recorder.rows_written(), 3);
    }

    #[test]
    fn replaces_a_stale_file_with_the_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "leftover\n").unwrap();
        let mut recorder = CsvRecorder::new(&path);
        recorder
            .record(&Sample::new(Timestamp::now(), vec![1.0]))
            .unwrap();
        recorder.finish().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Timestamp,Channel_1\n"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn session_file_name_uses_start_time() {
        let started = Local::now();
        let recorder = CsvRecorder::for_session(Path::new("logs"), started);
        let expected = format!("adc_data_{}.csv", started.format("%Y%m%d_%H%M%S"));
        assert_eq!(recorder.path(), Path::new("logs").join(expected));
    }

    #[test]
    fn surfaces_failure_after_one_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CsvRecorder::new(dir.path().join("missing").join("log.csv"));
        let err = recorder
            .record(&Sample::new(Timestamp::now(), vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, GloveError::Persist(_)));
        assert_eq!(recorder.rows_written(), 0);
    }

    #[test]
    fn finish_without_rows_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CsvRecorder::new(dir.path().join("log.csv"));
        recorder.finish().unwrap();
        assert!(!recorder.path().exists());
    }

    /// In-memory file whose next write stores half its bytes and then fails.
    struct Disk {
        bytes: Rc<RefCell<Vec<u8>>>,
        fail_next: Rc<Cell<bool>>,
    }

    impl Write for Disk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_next.replace(false) {
                self.bytes.borrow_mut().extend_from_slice(&buf[..buf.len() / 2]);
                return Err(io::Error::new(io::ErrorKind::Other, "device busy"));
            }
            self.bytes.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogTarget for Disk {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.bytes.borrow_mut().truncate(len as usize);
            Ok(())
        }
    }

    fn recorder_on_disk() -> (CsvRecorder, Rc<RefCell<Vec<u8>>>, Rc<Cell<bool>>, Rc<Cell<u32>>) {
        let bytes = Rc::new(RefCell::new(Vec::new()));
        let fail_next = Rc::new(Cell::new(false));
        let opens = Rc::new(Cell::new(0));
        let (b, f, o) = (Rc::clone(&bytes), Rc::clone(&fail_next), Rc::clone(&opens));
        let recorder = CsvRecorder::with_opener(
            "mem.csv",
            Box::new(move |_: &Path| {
                o.set(o.get() + 1);
                Ok(Box::new(Disk {
                    bytes: Rc::clone(&b),
                    fail_next: Rc::clone(&f),
                }) as Box<dyn LogTarget>)
            }),
        );
        (recorder, bytes, fail_next, opens)
    }

    #[test]
    fn transient_write_failure_keeps_each_row_exactly_once() {
        let (mut recorder, bytes, fail_next, opens) = recorder_on_disk();
        recorder
            .record(&Sample::new(Timestamp::now(), vec![1.0]))
            .unwrap();
        fail_next.set(true);
        recorder
            .record(&Sample::new(Timestamp::now(), vec![2.0]))
            .unwrap();
        recorder
            .record(&Sample::new(Timestamp::now(), vec![3.0]))
            .unwrap();
        recorder.finish().unwrap();

        assert_eq!(opens.get(), 2);
        assert_eq!(recorder.rows_written(), 3);
        let text = String::from_utf8(bytes.borrow().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Timestamp,Channel_1");
        let values: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(values, vec!["1", "2", "3"]);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn failed_first_row_still_gets_a_single_header() {
        let (mut recorder, bytes, fail_next, _) = recorder_on_disk();
        fail_next.set(true);
        recorder
            .record(&Sample::new(Timestamp::now(), vec![4.0, 5.0]))
            .unwrap();
        let text = String::from_utf8(bytes.borrow().clone()).unwrap();
        assert_eq!(text.matches("Timestamp").count(), 1);
        assert_eq!(text.lines().count(), 2);
    }
}
