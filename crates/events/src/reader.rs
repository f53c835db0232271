//! JSONL evidence reader
//!
//! Reads files produced by `HashChain::export_jsonl` so a chain can be verified
//! away from the live database, e.g. by an examiner holding only the export.

use crate::error::EventError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use trustcore_ledger::{AuditEvent, MemoryEventStore};

/// Sequential reader over one or more exported event files
pub struct EventReader {
    files: Vec<PathBuf>,
}

impl EventReader {
    /// Reader over a single export file
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            files: vec![path.as_ref().to_path_buf()],
        }
    }

    /// Reader over every `.jsonl` export in `dir`, in file name order.
    ///
    /// A missing directory yields a reader with no files.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, EventError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Self { files: Vec::new() });
        }

        let mut files = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .filter(|path| {
                path.as_ref()
                    .map_or(true, |p| p.extension().is_some_and(|ext| ext == "jsonl"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        files.sort_unstable();

        Ok(Self { files })
    }

    /// Read all events from all files in order
    pub fn read_all(&self) -> Result<Vec<AuditEvent>, EventError> {
        let mut events = Vec::new();

        for file_path in &self.files {
            let file = File::open(file_path)?;
            let reader = BufReader::new(file);

            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                events.push(parse_line(file_path, index + 1, &line)?);
            }
        }

        Ok(events)
    }

    /// Load everything into an in-memory store, ready for verification
    pub fn into_store(&self) -> Result<MemoryEventStore, EventError> {
        Ok(MemoryEventStore::from_events(self.read_all()?))
    }

    /// Last event across all files.
    ///
    /// Streams the files from the back and parses only the final non-empty
    /// line of the last file that has one.
    pub fn last_event(&self) -> Result<Option<AuditEvent>, EventError> {
        for file_path in self.files.iter().rev() {
            let reader = BufReader::new(File::open(file_path)?);

            let mut last = None;
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if !line.trim().is_empty() {
                    last = Some((index + 1, line));
                }
            }

            if let Some((line_no, line)) = last {
                return parse_line(file_path, line_no, &line).map(Some);
            }
        }
        Ok(None)
    }
}

fn parse_line(file_path: &Path, line_no: usize, line: &str) -> Result<AuditEvent, EventError> {
    serde_json::from_str(line).map_err(|e| EventError::InvalidFile {
        path: file_path.display().to_string(),
        line: line_no,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::tempdir;
    use trustcore_core::TrustConfig;
    use trustcore_ledger::{CancelToken, EventDraft, EventFilter, HashChain, VerifyRange};

    fn exported(n: u64) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let chain = HashChain::new(Arc::new(MemoryEventStore::new()), &TrustConfig::default());
        for i in 0..n {
            chain
                .append(EventDraft::new("u-1", "admin", "export_test").payload(json!({ "i": i })))
                .unwrap();
        }

        let path = dir.path().join("evidence.jsonl");
        let mut file = File::create(&path).unwrap();
        chain.export_jsonl(&EventFilter::new(), &mut file).unwrap();
        (dir, path)
    }

    fn verify(store: MemoryEventStore) -> trustcore_ledger::VerifyReport {
        HashChain::new(Arc::new(store), &TrustConfig::default())
            .verify(&VerifyRange::full(), &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_exported_chain_verifies_offline() {
        let (_dir, path) = exported(12);
        let reader = EventReader::from_file(&path);

        assert_eq!(reader.last_event().unwrap().map(|e| e.id), Some(11));
        let report = verify(reader.into_store().unwrap());
        assert!(report.is_ok());
        assert_eq!(report.events_checked, 12);
    }

    #[test]
    fn test_edited_export_fails_verification() {
        let (_dir, path) = exported(5);
        let content = std::fs::read_to_string(&path).unwrap();
        let edited = content.replacen("\"i\":3", "\"i\":30", 1);
        assert_ne!(content, edited);
        std::fs::write(&path, edited).unwrap();

        let report = verify(EventReader::from_file(&path).into_store().unwrap());
        assert!(!report.is_ok());
        assert_eq!(report.first_break_id, Some(3));
    }

    #[test]
    fn test_dropped_line_is_a_gap() {
        let (_dir, path) = exported(5);
        let content = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        std::fs::write(&path, kept.join("\n")).unwrap();

        let report = verify(EventReader::from_file(&path).into_store().unwrap());
        assert_eq!(report.first_break_id, Some(1));
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{not json").unwrap();

        let err = EventReader::from_file(&path).read_all().unwrap_err();
        assert!(matches!(err, EventError::InvalidFile { line: 2, .. }));
    }

    #[test]
    fn test_directory_reads_sorted_files() {
        let dir = tempdir().unwrap();
        let (_src, path) = exported(3);
        let lines: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        std::fs::write(dir.path().join("b.jsonl"), format!("{}\n", lines[2])).unwrap();
        std::fs::write(dir.path().join("a.jsonl"), format!("{}\n{}\n", lines[0], lines[1])).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let events = EventReader::from_directory(dir.path()).unwrap().read_all().unwrap();
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_last_event_reads_only_the_tail() {
        let dir = tempdir().unwrap();
        let (_src, path) = exported(3);
        let lines: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        // earlier lines are never parsed
        std::fs::write(dir.path().join("a.jsonl"), format!("{{not json\n{}\n", lines[0])).unwrap();
        std::fs::write(dir.path().join("b.jsonl"), format!("garbage\n{}\n\n", lines[2])).unwrap();
        std::fs::write(dir.path().join("c.jsonl"), "\n\n").unwrap();

        let reader = EventReader::from_directory(dir.path()).unwrap();
        assert_eq!(reader.last_event().unwrap().map(|e| e.id), Some(2));

        std::fs::write(dir.path().join("d.jsonl"), "{\"id\":\n").unwrap();
        let err = EventReader::from_directory(dir.path()).unwrap().last_event().unwrap_err();
        assert!(matches!(err, EventError::InvalidFile { line: 1, .. }));

        let empty = tempdir().unwrap();
        assert!(EventReader::from_directory(empty.path()).unwrap().last_event().unwrap().is_none());
    }
}
