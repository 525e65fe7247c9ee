//! # Run journal: append-only JSONL persistence.
//!
//! When a state directory is configured, every instance gets one file
//! `<instance-id>.jsonl` under it: a header line followed by one line per
//! transition (see [`record`]). Files are flushed per line, so the journal
//! never trails the in-memory state by more than the write in progress.
//!
//! ## Rules
//! - Appends are best-effort from the state machine's point of view: an
//!   I/O error is reported to the caller, who logs it and proceeds.
//! - Loading is lenient: a torn tail line stops that file, a file without
//!   a valid header is skipped, neither aborts recovery.

mod record;

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::error::JournalError;
use crate::events::Event;
use crate::instance::InstanceId;
use crate::jobs::JobDefinition;
use crate::policies::RestartPolicy;

pub(crate) use record::{JournalRecord, RunHeader};

/// One journaled run, as read back by [`Journal::load_all`].
#[derive(Debug)]
pub(crate) struct LoadedRun {
    pub(crate) header: RunHeader,
    pub(crate) events: Vec<Event>,
}

/// Everything found in the state directory.
#[derive(Debug, Default)]
pub(crate) struct LoadedJournal {
    pub(crate) runs: Vec<LoadedRun>,
    /// Highest event sequence number on disk, if any event exists.
    pub(crate) max_seq: Option<u64>,
}

/// Handle on the state directory.
#[derive(Debug)]
pub(crate) struct Journal {
    dir: PathBuf,
}

impl Journal {
    /// Opens (creating if needed) the state directory.
    pub(crate) fn open(dir: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| JournalError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Creates the run file for a fresh instance and writes its header.
    ///
    /// `restart` and `timeout` are the values in force for the run, which
    /// may differ from the definition's when the submission overrode them.
    pub(crate) fn writer(
        &self,
        instance: InstanceId,
        created_at: SystemTime,
        def: &JobDefinition,
        restart: RestartPolicy,
        timeout: Option<Duration>,
    ) -> Result<JournalWriter, JournalError> {
        let path = self.file_path(instance);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| JournalError::Io {
                path: path.clone(),
                source,
            })?;
        let header = JournalRecord::Header(RunHeader {
            instance,
            job: def.id().clone(),
            created_at,
            definition: def.clone(),
            restart,
            timeout,
        });
        let line = serde_json::to_vec(&header)?;
        write_line(&mut file, &line, &path)?;
        Ok(JournalWriter {
            path,
            file: Mutex::new(file),
        })
    }

    /// Reopens an existing run file for appending (recovery path).
    pub(crate) fn reopen(&self, instance: InstanceId) -> Result<JournalWriter, JournalError> {
        let path = self.file_path(instance);
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|source| JournalError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(JournalWriter {
            path,
            file: Mutex::new(file),
        })
    }

    /// Reads every run file in the directory.
    pub(crate) fn load_all(&self) -> Result<LoadedJournal, JournalError> {
        let mut loaded = LoadedJournal::default();
        let entries = std::fs::read_dir(&self.dir).map_err(|source| JournalError::Io {
            path: self.dir.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            match read_run(&path) {
                Some(run) => {
                    for ev in &run.events {
                        loaded.max_seq = Some(loaded.max_seq.map_or(ev.seq, |m| m.max(ev.seq)));
                    }
                    loaded.runs.push(run);
                }
                None => {
                    tracing::warn!(path = %path.display(), "skipping journal file without a valid header");
                }
            }
        }
        Ok(loaded)
    }

    fn file_path(&self, instance: InstanceId) -> PathBuf {
        self.dir.join(format!("{instance}.jsonl"))
    }
}

/// Reads one run file; `None` when the first line is not a header.
fn read_run(path: &std::path::Path) -> Option<LoadedRun> {
    let file = File::open(path).ok()?;
    let mut lines = BufReader::new(file).lines();

    let first = lines.next()?.ok()?;
    let header = match serde_json::from_str(&first) {
        Ok(JournalRecord::Header(header)) => header,
        _ => return None,
    };

    let mut events = Vec::new();
    for line in lines {
        let Ok(line) = line else { break };
        match serde_json::from_str(&line) {
            Ok(JournalRecord::Transition(ev)) => events.push(ev),
            _ => {
                // Torn tail from an interrupted write; everything before it
                // is intact.
                tracing::warn!(path = %path.display(), "stopping at unreadable journal line");
                break;
            }
        }
    }
    Some(LoadedRun { header, events })
}

/// Append handle for one run file.
#[derive(Debug)]
pub(crate) struct JournalWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl JournalWriter {
    /// Appends one transition line and flushes it.
    pub(crate) fn append(&self, ev: &Event) -> Result<(), JournalError> {
        let line = serde_json::to_vec(&JournalRecord::Transition(ev.clone()))?;
        let mut file = self.lock();
        write_line(&mut file, &line, &self.path)
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_line(file: &mut File, line: &[u8], path: &std::path::Path) -> Result<(), JournalError> {
    let io_err = |source| JournalError::Io {
        path: path.to_path_buf(),
        source,
    };
    file.write_all(line).map_err(io_err)?;
    file.write_all(b"\n").map_err(io_err)?;
    file.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Phase;
    use crate::jobs::JobId;

    fn def(id: &str) -> JobDefinition {
        JobDefinition::builder(id, "/bin/true").build().unwrap()
    }

    fn writer_for(journal: &Journal, instance: InstanceId, d: &JobDefinition) -> JournalWriter {
        journal
            .writer(instance, SystemTime::now(), d, RestartPolicy::Never, None)
            .unwrap()
    }

    fn ev(instance: InstanceId, job: &JobId, from: Phase, to: Phase) -> Event {
        Event::new(instance, job.clone(), from, to, 1, None)
    }

    #[test]
    fn written_run_loads_back_intact() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let d = def("loop");
        let instance = InstanceId::new();

        let writer = writer_for(&journal, instance, &d);
        let first = ev(instance, d.id(), Phase::Created, Phase::Pending);
        let second = ev(instance, d.id(), Phase::Pending, Phase::Running);
        writer.append(&first).unwrap();
        writer.append(&second).unwrap();

        let loaded = journal.load_all().unwrap();
        assert_eq!(loaded.runs.len(), 1);
        let run = &loaded.runs[0];
        assert_eq!(run.header.instance, instance);
        assert_eq!(run.header.job.as_str(), "loop");
        assert_eq!(run.events.len(), 2);
        assert_eq!(loaded.max_seq, Some(first.seq.max(second.seq)));
    }

    #[test]
    fn torn_tail_keeps_the_intact_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let d = def("torn");
        let instance = InstanceId::new();

        let writer = writer_for(&journal, instance, &d);
        writer.append(&ev(instance, d.id(), Phase::Created, Phase::Pending)).unwrap();
        {
            let mut raw = OpenOptions::new()
                .append(true)
                .open(dir.path().join(format!("{instance}.jsonl")))
                .unwrap();
            raw.write_all(b"{\"record\":\"transiti").unwrap();
        }

        let loaded = journal.load_all().unwrap();
        assert_eq!(loaded.runs.len(), 1);
        assert_eq!(loaded.runs[0].events.len(), 1);
    }

    #[test]
    fn file_without_header_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("stray.jsonl"), b"{\"not\":\"a header\"}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored entirely\n").unwrap();

        let loaded = journal.load_all().unwrap();
        assert!(loaded.runs.is_empty());
        assert_eq!(loaded.max_seq, None);
    }

    #[test]
    fn reopen_appends_without_a_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let d = def("resume");
        let instance = InstanceId::new();

        let writer = writer_for(&journal, instance, &d);
        writer.append(&ev(instance, d.id(), Phase::Created, Phase::Pending)).unwrap();
        drop(writer);

        let writer = journal.reopen(instance).unwrap();
        writer.append(&ev(instance, d.id(), Phase::Pending, Phase::Running)).unwrap();

        let loaded = journal.load_all().unwrap();
        assert_eq!(loaded.runs.len(), 1);
        assert_eq!(loaded.runs[0].events.len(), 2);
    }

    #[test]
    fn runs_of_different_instances_stay_separate() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let d = def("many");
        let one = InstanceId::new();
        let two = InstanceId::new();
        writer_for(&journal, one, &d);
        writer_for(&journal, two, &d);

        let loaded = journal.load_all().unwrap();
        assert_eq!(loaded.runs.len(), 2);
        assert!(loaded.runs.iter().all(|r| r.events.is_empty()));
    }
}
