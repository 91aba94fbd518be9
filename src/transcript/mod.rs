//! Worker transcripts.
//!
//! A transcript is newline-delimited JSON in the editor's stream format. Each
//! record may carry `message.content`, which is either a plain string or a
//! list of typed blocks (`text`, `tool_use`, `tool_result`). Malformed lines
//! and unknown block types are skipped, never fatal.

pub mod extract;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

pub use extract::{
    PhaseArtifacts, TestRunnerCatalogue, extract_files_modified, extract_phase_artifacts,
    extract_test_output, extract_text,
};

/// One content block, normalised from the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Tool output flattened to text
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },

    #[serde(other)]
    Unknown,
}

impl RawBlock {
    fn normalize(self) -> Option<ContentBlock> {
        match self {
            RawBlock::Text { text } => Some(ContentBlock::Text { text }),
            RawBlock::ToolUse { name, input, id } => Some(ContentBlock::ToolUse { id, name, input }),
            RawBlock::ToolResult {
                tool_use_id,
                content,
            } => Some(ContentBlock::ToolResult {
                tool_use_id,
                content: flatten_result(&content),
            }),
            RawBlock::Unknown => None,
        }
    }
}

/// Tool results are a string or a list of `{"type":"text","text":...}` blocks.
fn flatten_result(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                other => other.get("text").and_then(|t| t.as_str()),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// One parsed transcript line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscriptRecord {
    /// Record type from the wire (`assistant`, `user`, ...)
    pub kind: Option<String>,
    pub blocks: Vec<ContentBlock>,
}

/// A parsed worker transcript.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub records: Vec<TranscriptRecord>,
    /// Lines that were not valid JSON objects
    pub skipped_lines: usize,
}

impl Transcript {
    /// Parse newline-delimited records, skipping anything unparseable.
    pub fn parse(content: &str) -> Self {
        let mut transcript = Transcript::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) if value.is_object() => transcript.records.push(parse_record(&value)),
                _ => transcript.skipped_lines += 1,
            }
        }

        if transcript.skipped_lines > 0 {
            tracing::debug!(skipped = transcript.skipped_lines, "skipped malformed transcript lines");
        }
        transcript
    }

    /// Read and parse a transcript file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    /// All blocks in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.records.iter().flat_map(|r| r.blocks.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn parse_record(value: &Value) -> TranscriptRecord {
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .map(str::to_string);

    let blocks = match value.get("message").and_then(|m| m.get("content")) {
        Some(Value::String(text)) => vec![ContentBlock::Text { text: text.clone() }],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value::<RawBlock>(item.clone()).ok())
            .filter_map(RawBlock::normalize)
            .collect(),
        _ => Vec::new(),
    };

    TranscriptRecord { kind, blocks }
}
