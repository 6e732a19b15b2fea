use crate::error::Result;
use crate::history::{History, Turn};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveReason {
    Clear,
    Shutdown,
}

#[derive(Serialize)]
struct Entry<'a> {
    saved_at: DateTime<Local>,
    reason: SaveReason,
    preamble: &'a str,
    turns: &'a [Turn],
}

/// Append-only JSON-lines log, one file per server run.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    /// `<dir>/chat-<date>-<time>-<port>.jsonl`
    pub fn for_run(dir: impl AsRef<Path>, port: u16, started: DateTime<Local>) -> Self {
        let name = format!("chat-{}-{port}.jsonl", started.format("%Y%m%d-%H%M%S"));
        Self { path: dir.as_ref().join(name) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a snapshot of `history`. Empty histories are skipped.
    pub fn save(&self, history: &History, reason: SaveReason) -> Result<()> {
        if history.is_empty() {
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let entry = Entry {
            saved_at: Local::now(),
            reason,
            preamble: history.preamble(),
            turns: history.turns(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        tracing::info!(path = %self.path.display(), ?reason, turns = history.turns().len(), "transcript saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;
    use chrono::TimeZone;

    #[test]
    fn file_name_carries_date_time_and_port() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let log = TranscriptLog::for_run("logs", 4321, at);
        assert_eq!(log.path(), Path::new("logs/chat-20240305-070809-4321.jsonl"));
    }

    #[test]
    fn saves_append_one_line_each() {
        let dir = tempfile::tempdir().unwrap();
        let log = TranscriptLog::for_run(dir.path().join("nested"), 1234, Local::now());
        let mut h = History::new("X");

        log.save(&h, SaveReason::Clear).unwrap();
        assert!(!log.path().exists());

        h.push(Role::User, "hello");
        h.push(Role::Assistant, "hi");
        log.save(&h, SaveReason::Clear).unwrap();
        log.save(&h, SaveReason::Shutdown).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["reason"], "clear");
        assert_eq!(lines[1]["reason"], "shutdown");
        assert_eq!(lines[0]["preamble"], "X");
        assert_eq!(lines[0]["turns"][0]["role"], "user");
        assert_eq!(lines[0]["turns"][1]["text"], "hi");
    }
}
