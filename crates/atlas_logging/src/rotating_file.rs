use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

use atlas_interface::errors::{AppError, Result};

/// Appends to a log file and rolls it over once it grows past `max_bytes`.
///
/// On rollover `file.N-1` becomes `file.N`, ..., `file` becomes `file.1`,
/// and whatever sat at `file.{backup_count}` is discarded. A `max_bytes` of
/// zero never rolls over; a `backup_count` of zero truncates in place.
///
/// Writes go through a mutex, so one formatted record is never interleaved
/// with another from a different thread of the same process.
#[derive(Debug)]
pub struct RotatingFileAppender {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backup_count: usize,
}

impl RotatingFileAppender {
    /// Opens `path` for appending. The parent directory must already exist.
    pub fn new(path: impl AsRef<Path>, max_bytes: u64, backup_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = open_append(&path).map_err(|e| AppError::ConfigurationError {
            msg: format!("cannot open log file '{}': {}", path.display(), e),
        })?;
        let written = file
            .metadata()
            .map_err(|e| AppError::ConfigurationError {
                msg: format!("cannot stat log file '{}': {}", path.display(), e),
            })?
            .len();

        Ok(Self {
            state: Mutex::new(State {
                path,
                file,
                written,
                max_bytes,
                backup_count,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `api.log` + 3 -> `api.log.3`
pub fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

impl State {
    fn should_roll_over(&self, incoming: usize) -> bool {
        self.max_bytes > 0 && self.written > 0 && self.written + incoming as u64 > self.max_bytes
    }

    fn roll_over(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backup_count == 0 {
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = backup_path(&self.path, self.backup_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backup_count).rev() {
            let source = backup_path(&self.path, index);
            if source.exists() {
                fs::rename(&source, backup_path(&self.path, index + 1))?;
            }
        }
        fs::rename(&self.path, backup_path(&self.path, 1))?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }

    fn write_record(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_roll_over(buf.len()) {
            self.roll_over()?;
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }
}

/// Handle returned by [`MakeWriter`]; holds the lock for one record.
pub struct RotatingFileWriter<'a> {
    state: MutexGuard<'a, State>,
}

impl Write for RotatingFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.write_record(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFileAppender {
    type Writer = RotatingFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileWriter { state: self.lock() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_line(appender: &RotatingFileAppender, line: &str) {
        let mut writer = appender.make_writer();
        writer.write_all(line.as_bytes()).unwrap();
    }

    fn backups(path: &Path) -> Vec<usize> {
        (1..=10).filter(|i| backup_path(path, *i).exists()).collect()
    }

    #[test]
    fn missing_directory_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("api.log");

        let result = RotatingFileAppender::new(&path, 10_000, 5);

        assert!(matches!(result, Err(AppError::ConfigurationError { .. })));
        assert!(!path.parent().unwrap().exists());
    }

    #[test]
    fn appends_to_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");
        fs::write(&path, "previous run\n").unwrap();

        let appender = RotatingFileAppender::new(&path, 10_000, 5).unwrap();
        write_line(&appender, "this run\n");

        assert_eq!(fs::read_to_string(&path).unwrap(), "previous run\nthis run\n");
    }

    #[test]
    fn rolls_over_once_the_size_limit_would_be_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");
        let appender = RotatingFileAppender::new(&path, 10_000, 5).unwrap();
        let line = format!("{}\n", "x".repeat(99)); // 100 bytes

        for _ in 0..100 {
            write_line(&appender, &line);
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), 10_000);
        assert!(backups(&path).is_empty());

        write_line(&appender, &line);

        assert_eq!(backups(&path), vec![1]);
        assert_eq!(fs::metadata(backup_path(&path, 1)).unwrap().len(), 10_000);
        assert_eq!(fs::read_to_string(&path).unwrap(), line);
    }

    #[test]
    fn keeps_at_most_backup_count_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.log");
        let appender = RotatingFileAppender::new(&path, 100_000, 5).unwrap();
        let chunk = "y".repeat(100_000);

        // The first chunk fills the file, each following one rolls it over.
        for rollover in 0..=6 {
            write_line(&appender, &format!("{}{}", rollover, &chunk[1..]));
        }

        assert_eq!(backups(&path), vec![1, 2, 3, 4, 5]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 6);
        assert!(fs::read_to_string(&path).unwrap().starts_with('6'));
        assert!(fs::read_to_string(backup_path(&path, 1)).unwrap().starts_with('5'));
        assert!(fs::read_to_string(backup_path(&path, 5)).unwrap().starts_with('1'));
    }

    #[test]
    fn concurrent_writers_never_interleave_records() {
        const THREADS: usize = 8;
        const LINES: usize = 200;
        const LINE_LEN: usize = 50;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");
        let appender = RotatingFileAppender::new(&path, 2_000, 64).unwrap();

        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let appender = &appender;
                scope.spawn(move || {
                    for index in 0..LINES {
                        let head = format!("t{:02}-{:04}-", thread, index);
                        let line = format!("{:z<width$}\n", head, width = LINE_LEN - 1);
                        write_line(appender, &line);
                    }
                });
            }
        });

        let mut files = vec![path.clone()];
        files.extend(
            (1..=64)
                .map(|i| backup_path(&path, i))
                .filter(|backup| backup.exists()),
        );
        assert!(files.len() > 1, "the writes should have rolled over");

        let mut seen = std::collections::HashSet::new();
        for file in &files {
            let contents = fs::read_to_string(file).unwrap();
            assert!(contents.len() as u64 <= 2_000);
            assert!(contents.ends_with('\n'));

            for line in contents.lines() {
                assert_eq!(line.len(), LINE_LEN - 1, "torn line {:?}", line);
                assert!(line.starts_with('t'));
                assert!(line[9..].chars().all(|c| c == 'z'), "mixed line {:?}", line);
                assert!(seen.insert(line[..9].to_string()), "duplicate {:?}", line);
            }
        }

        assert_eq!(seen.len(), THREADS * LINES);
    }

    #[test]
    fn zero_backups_truncates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");
        let appender = RotatingFileAppender::new(&path, 10, 0).unwrap();

        write_line(&appender, "0123456789");
        write_line(&appender, "abc");

        assert!(backups(&path).is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "abc");
    }

    #[test]
    fn zero_max_bytes_never_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");
        let appender = RotatingFileAppender::new(&path, 0, 5).unwrap();

        for _ in 0..50 {
            write_line(&appender, "0123456789");
        }

        assert!(backups(&path).is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), 500);
    }

    #[test]
    fn oversized_record_on_empty_file_is_written_without_rolling_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");
        let appender = RotatingFileAppender::new(&path, 10, 5).unwrap();

        write_line(&appender, "this record is longer than ten bytes");

        assert!(backups(&path).is_empty());
    }
}
