//! Document Metadata Parser
//!
//! Splits a `---` delimited YAML front-matter block from a document body and
//! resolves title, feature, workstream and tags with a fixed precedence:
//! front-matter, then the filename's workstream token, then the first
//! Markdown heading, then the filename itself.

use std::sync::OnceLock;

use regex::Regex;
use serde_yaml::Value;

use crate::utils::error::{AppError, AppResult};

/// Metadata resolved for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Never empty
    pub title: String,
    pub feature_id: Option<String>,
    pub workstream_id: Option<String>,
    pub tags: Vec<String>,
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub metadata: DocumentMetadata,
    /// Content without the front-matter block (the whole input when the
    /// block was missing or malformed)
    pub body: String,
    /// Why the front-matter block was ignored, if it was
    pub front_matter_error: Option<String>,
}

#[derive(Debug, Default)]
struct FrontMatter {
    title: Option<String>,
    feature_id: Option<String>,
    ws_id: Option<String>,
    tags: Vec<String>,
}

fn workstream_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\D)(\d{2}-\d{3}-\d{2})(?:\D|$)").expect("workstream pattern is valid")
    })
}

fn workstream_parts_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-(\d{3})-\d{2}$").expect("workstream pattern is valid"))
}

/// First `NN-NNN-NN` token in `text`, e.g. `00-032-01`.
pub fn find_workstream_token(text: &str) -> Option<String> {
    workstream_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Feature ID encoded in a workstream ID: `00-032-01` -> `F032`.
pub fn feature_from_workstream(workstream_id: &str) -> Option<String> {
    workstream_parts_regex()
        .captures(workstream_id.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| format!("F{}", m.as_str()))
}

/// Parse `content` read from a file named `file_name`.
///
/// Total: malformed front-matter is reported in `front_matter_error` and the
/// whole input is treated as plain content.
pub fn parse_document(content: &str, file_name: &str) -> ParsedDocument {
    let (front_matter, body, front_matter_error) = match split_front_matter(content) {
        None => (FrontMatter::default(), content.to_string(), None),
        Some((block, body)) => match parse_front_matter(block) {
            Ok(fm) => (fm, body.to_string(), None),
            Err(err) => {
                tracing::warn!(
                    file = %file_name,
                    error = %err,
                    "Malformed front-matter, indexing as plain content"
                );
                (FrontMatter::default(), content.to_string(), Some(err.to_string()))
            }
        },
    };

    let workstream_id = front_matter
        .ws_id
        .clone()
        .or_else(|| find_workstream_token(file_name));
    let feature_id = front_matter
        .feature_id
        .clone()
        .or_else(|| workstream_id.as_deref().and_then(feature_from_workstream));
    let title = front_matter
        .title
        .clone()
        .or_else(|| first_heading(&body))
        .unwrap_or_else(|| title_from_file_name(file_name));

    ParsedDocument {
        metadata: DocumentMetadata {
            title,
            feature_id,
            workstream_id,
            tags: front_matter.tags,
        },
        body,
        front_matter_error,
    }
}

/// Returns `(block, body)` when `content` opens with a closed `---` block.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }

    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if line.trim_end() == "---" {
            let block = &content[block_start..offset];
            let body = content[offset + line.len()..].trim_start_matches(['\r', '\n']);
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

fn parse_front_matter(block: &str) -> AppResult<FrontMatter> {
    if block.trim().is_empty() {
        return Ok(FrontMatter::default());
    }

    let value: Value = serde_yaml::from_str(block)?;
    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(FrontMatter::default()),
        _ => return Err(AppError::validation("front-matter is not a key/value mapping")),
    };

    let field = |key: &str| mapping.get(key).and_then(scalar_to_string);
    let tags = match mapping.get("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(_) => {
            return Err(AppError::validation(
                "tags must be a list or a comma-separated string",
            ))
        }
    };

    Ok(FrontMatter {
        title: field("title"),
        feature_id: field("feature_id"),
        ws_id: field("ws_id"),
        tags,
    })
}

/// Non-empty string form of a YAML scalar
fn scalar_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Text of the first ATX heading outside fenced code blocks.
fn first_heading(body: &str) -> Option<String> {
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let hashes = trimmed.chars().take_while(|c| *c == '#').count();
        if !(1..=6).contains(&hashes) {
            continue;
        }
        let rest = &trimmed[hashes..];
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let text = rest.trim().trim_end_matches('#').trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    None
}

fn title_from_file_name(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .unwrap_or_default();
    if !stem.is_empty() {
        stem
    } else if !file_name.trim().is_empty() {
        file_name.trim().to_string()
    } else {
        "untitled".to_string()
    }
}
