//! Minimal Jupyter notebook document model.
//!
//! Only the parts needed to locate cells, outputs, and embedded images are
//! typed. Every other field is carried through untouched via flattened maps
//! so a parsed document serialises back without losing information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Literal first line that marks a metadata cell.
pub const METADATA_MARKER: &str = "%META";

/// Output data keys that carry base64-encoded PNG payloads.
pub const IMAGE_OUTPUT_KEYS: [&str; 2] = ["image/png", "png"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookDocument {
    pub cells: Vec<Cell>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl NotebookDocument {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The leading metadata cell, when the document has one.
    pub fn metadata_cell(&self) -> Option<&Cell> {
        self.cells.first().filter(|cell| cell.is_metadata_cell())
    }

    /// Drop the leading metadata cell. Returns whether a cell was removed.
    pub fn strip_metadata_cell(&mut self) -> bool {
        if self.metadata_cell().is_some() {
            self.cells.remove(0);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Output>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Cell {
    /// Source lines in order, each still carrying its line terminator.
    pub fn lines(&self) -> Vec<&str> {
        self.source
            .as_ref()
            .map(Source::lines)
            .unwrap_or_default()
    }

    pub fn is_metadata_cell(&self) -> bool {
        self.lines()
            .first()
            .is_some_and(|line| normalize_line(line) == METADATA_MARKER)
    }
}

/// nbformat allows cell sources as either a list of lines or one string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Lines(Vec<String>),
    Text(String),
}

impl Source {
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Source::Lines(lines) => lines.iter().map(String::as_str).collect(),
            Source::Text(text) => text.split_inclusive('\n').collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Output {
    /// The first image payload on this output, as `(key, base64 text)`.
    ///
    /// Multi-line payloads (a list of strings) are joined.
    pub fn image_payload(&self) -> Option<(&str, String)> {
        let data = self.data.as_ref()?;
        data.iter().find_map(|(key, value)| {
            if !IMAGE_OUTPUT_KEYS.contains(&key.as_str()) {
                return None;
            }
            payload_text(value).map(|text| (key.as_str(), text))
        })
    }

    /// Replace the whole data mapping with a single markdown image tag.
    ///
    /// Any other keys on the output's data are discarded.
    pub fn replace_with_image(&mut self, url: &str) {
        let mut data = Map::new();
        data.insert(
            "text/markdown".to_string(),
            Value::String(format!("<img src='{url}' />")),
        );
        self.data = Some(data);
    }
}

fn payload_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => parts
            .iter()
            .map(|part| part.as_str())
            .collect::<Option<String>>(),
        _ => None,
    }
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
