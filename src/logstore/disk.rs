use crate::logstore::{AppendOutcome, InMemoryLogStore, LogEntry, LogId, LogStore};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOG_FILE_NAME: &str = "repl.log";

/// Durable log store: an `InMemoryLogStore` mirror plus an append-only file
/// of line-delimited JSON entries. Disk interaction is synchronous; appends
/// happen under the write serializer, so at most one writer touches the file.
pub struct DiskLogStore {
    logger: slog::Logger,
    mirror: InMemoryLogStore,
    writer: BufWriter<File>,
    path: PathBuf,
}

impl DiskLogStore {
    /// Opens (creating if needed) the log file under `directory` and replays
    /// it into the in-memory mirror. Stale or unparseable lines are skipped
    /// with a warning rather than failing the whole store.
    pub fn open(directory: &Path, logger: slog::Logger) -> io::Result<Self> {
        fs::create_dir_all(directory)?;
        let path = directory.join(LOG_FILE_NAME);

        let mut mirror = InMemoryLogStore::new();
        if path.exists() {
            Self::replay(&path, &mut mirror, &logger)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        slog::info!(
            logger,
            "Opened log store '{}' with {} entries, last log id {}",
            path.display(),
            mirror.len(),
            mirror.last_log_id()
        );

        Ok(DiskLogStore {
            logger,
            mirror,
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path, mirror: &mut InMemoryLogStore, logger: &slog::Logger) -> io::Result<()> {
        let reader = BufReader::new(File::open(path)?);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => {
                    let outcome = mirror.append(entry)?;
                    if outcome != AppendOutcome::Appended {
                        slog::warn!(
                            logger,
                            "Skipped {:?} entry at line {} of '{}'",
                            outcome,
                            line_no + 1,
                            path.display()
                        );
                    }
                }
                Err(e) => {
                    slog::warn!(
                        logger,
                        "Skipped unparseable entry at line {} of '{}': {}",
                        line_no + 1,
                        path.display(),
                        e
                    );
                }
            }
        }
        Ok(())
    }
}

impl LogStore for DiskLogStore {
    fn append(&mut self, entry: LogEntry) -> io::Result<AppendOutcome> {
        let encoded = serde_json::to_string(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let outcome = self.mirror.append(entry)?;
        if outcome == AppendOutcome::Appended {
            self.writer.write_all(encoded.as_bytes())?;
            self.writer.write_all(b"\n")?;
            self.writer.flush()?;
        } else {
            slog::warn!(self.logger, "Not persisting {:?} append", outcome);
        }
        Ok(outcome)
    }

    fn last_log_id(&self) -> LogId {
        self.mirror.last_log_id()
    }

    fn is_valid_log_id(&self, id: LogId) -> bool {
        self.mirror.is_valid_log_id(id)
    }

    fn entries_after(&self, id: LogId, max_count: usize) -> Vec<LogEntry> {
        self.mirror.entries_after(id, max_count)
    }
}
