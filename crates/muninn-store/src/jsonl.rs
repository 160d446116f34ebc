use muninn_core::{MuninnError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::Path;

/// Records read from an append-only JSONL file plus the number of corrupt
/// lines that were isolated along the way.
#[derive(Debug)]
pub struct ReadOutcome<T> {
    pub records: Vec<T>,
    pub corrupt: usize,
}

/// Append one serialized record as a JSONL line.
///
/// Before appending, the previous record is validated: an unterminated or
/// unparsable trailing fragment (a prior partial write) is sealed off with a
/// lone newline so it stays isolated as a single corrupt line instead of
/// merging with the new record. The file itself is never rewritten.
pub fn append_jsonl<T: Serialize>(path: &Path, store: &str, record: &T, fsync: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MuninnError::io("create dir", parent, e))?;
    }

    let needs_terminator = check_tail(path, store)?;

    let json = serde_json::to_string(record).map_err(|e| MuninnError::Serialize {
        store: store.to_string(),
        source: e,
    })?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| MuninnError::io("open append", path, e))?;
    if needs_terminator {
        writeln!(file).map_err(|e| MuninnError::io("append", path, e))?;
    }
    writeln!(file, "{json}").map_err(|e| MuninnError::io("append", path, e))?;
    if fsync {
        file.sync_all().map_err(|e| MuninnError::io("fsync", path, e))?;
    }
    Ok(())
}

/// Inspect the last line of the file. Returns whether the file ends in an
/// unterminated fragment that must be sealed off before appending.
fn check_tail(path: &Path, store: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| MuninnError::io("read", path, e))?;
    if content.is_empty() {
        return Ok(false);
    }
    let terminated = content.ends_with('\n');
    if let Some(last) = content.lines().rev().find(|l| !l.trim().is_empty()) {
        if serde_json::from_str::<serde_json::Value>(last).is_err() {
            tracing::warn!(
                store,
                path = %path.display(),
                "isolating corrupt trailing record before append"
            );
        }
    }
    Ok(!terminated)
}

/// Read all records from a JSONL file, oldest first. A missing file is an
/// empty sequence. Unparsable lines are isolated: each is logged at `warn`
/// and counted, and surrounding valid records remain usable.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path, store: &str) -> Result<ReadOutcome<T>> {
    if !path.exists() {
        return Ok(ReadOutcome {
            records: Vec::new(),
            corrupt: 0,
        });
    }
    let file = std::fs::File::open(path).map_err(|e| MuninnError::io("open", path, e))?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    let mut corrupt = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MuninnError::io("read line", path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(rec) => records.push(rec),
            Err(e) => {
                corrupt += 1;
                tracing::warn!(
                    store,
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping corrupt record"
                );
            }
        }
    }
    Ok(ReadOutcome { records, corrupt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Rec {
        n: u32,
    }

    #[test]
    fn append_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        append_jsonl(&path, "test", &Rec { n: 1 }, false).unwrap();
        append_jsonl(&path, "test", &Rec { n: 2 }, true).unwrap();
        let out: ReadOutcome<Rec> = read_jsonl(&path, "test").unwrap();
        assert_eq!(out.records, vec![Rec { n: 1 }, Rec { n: 2 }]);
        assert_eq!(out.corrupt, 0);
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let out: ReadOutcome<Rec> = read_jsonl(&tmp.path().join("none.jsonl"), "test").unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.corrupt, 0);
    }

    #[test]
    fn corrupt_line_is_isolated_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        std::fs::write(&path, "{\"n\":1}\nnot json\n{\"n\":3}\n").unwrap();
        let out: ReadOutcome<Rec> = read_jsonl(&path, "test").unwrap();
        assert_eq!(out.records, vec![Rec { n: 1 }, Rec { n: 3 }]);
        assert_eq!(out.corrupt, 1);
    }

    #[test]
    fn partial_trailing_write_is_sealed_off_on_append() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        // Simulate a crash mid-append: no trailing newline, half a record.
        std::fs::write(&path, "{\"n\":1}\n{\"n\":").unwrap();
        append_jsonl(&path, "test", &Rec { n: 2 }, false).unwrap();

        let out: ReadOutcome<Rec> = read_jsonl(&path, "test").unwrap();
        assert_eq!(out.records, vec![Rec { n: 1 }, Rec { n: 2 }]);
        assert_eq!(out.corrupt, 1);
    }

    #[test]
    fn unterminated_valid_record_is_not_merged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        std::fs::write(&path, "{\"n\":1}").unwrap();
        append_jsonl(&path, "test", &Rec { n: 2 }, false).unwrap();
        let out: ReadOutcome<Rec> = read_jsonl(&path, "test").unwrap();
        assert_eq!(out.records, vec![Rec { n: 1 }, Rec { n: 2 }]);
        assert_eq!(out.corrupt, 0);
    }
}
