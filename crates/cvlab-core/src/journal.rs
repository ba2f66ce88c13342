use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::store::JsonDocument;
use crate::util::second_stamp;

const MARKDOWN_HEADER: &str = "# CVLab Development Journal\n\n";

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEvent {
    pub timestamp: String,
    pub event_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl JournalEvent {
    pub fn new(
        event_type: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: second_stamp(Local::now()),
            event_type: event_type.into(),
            title: title.into(),
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn render_markdown(&self) -> String {
        let mut out = format!("## [{}] {}\n\n{}\n\n", self.timestamp, self.title, self.description);
        if !self.metadata.is_empty() {
            out.push_str("**Details:**\n");
            for (key, value) in &self.metadata {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!("- {key}: {rendered}\n"));
            }
            out.push('\n');
        }
        out.push_str("---\n\n");
        out
    }
}

/// JSON event stream plus a Markdown mirror for humans.
pub struct Journal {
    events: JsonDocument<Vec<JournalEvent>>,
    markdown: PathBuf,
}

impl Journal {
    pub fn new(json_path: impl Into<PathBuf>, markdown_path: impl Into<PathBuf>) -> Self {
        Self {
            events: JsonDocument::new(json_path),
            markdown: markdown_path.into(),
        }
    }

    pub fn json_path(&self) -> &Path {
        self.events.path()
    }

    pub fn markdown_path(&self) -> &Path {
        &self.markdown
    }

    /// Append an event. A corrupt event file is an error, never silently reset.
    pub fn append(&self, event: JournalEvent) -> Result<()> {
        self.events.locked(|doc| {
            let mut events = doc.read()?.unwrap_or_default();
            events.push(event.clone());
            doc.write(&events)
        })?;
        self.append_markdown(&event)?;
        tracing::debug!(event_type = %event.event_type, "journal event appended");
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<JournalEvent>> {
        Ok(self.events.read()?.unwrap_or_default())
    }

    pub fn latest(&self) -> Result<Option<JournalEvent>> {
        Ok(self.read_all()?.pop())
    }

    /// Last `n` events, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<JournalEvent>> {
        let events = self.read_all()?;
        let skip = events.len().saturating_sub(n);
        Ok(events.into_iter().skip(skip).collect())
    }

    /// Best-effort append used by components whose primary write already succeeded.
    pub(crate) fn record(&self, event: JournalEvent) {
        let kind = event.event_type.clone();
        if let Err(err) = self.append(event) {
            tracing::warn!("journal append for {kind} failed: {err}");
        }
    }

    fn append_markdown(&self, event: &JournalEvent) -> Result<()> {
        if let Some(parent) = self.markdown.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let fresh = !self.markdown.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.markdown)?;
        if fresh {
            file.write_all(MARKDOWN_HEADER.as_bytes())?;
        }
        file.write_all(event.render_markdown().as_bytes())?;
        Ok(())
    }
}
