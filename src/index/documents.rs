//! Document discovery in an extracted backup
//!
//! A chat export carries a `conversations.json` at its root; each conversation
//! becomes one document. Anything else is indexed file by file.

use crate::error::IndexError;
use chrono::DateTime;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use walkdir::WalkDir;

const CONVERSATIONS_FILE: &str = "conversations.json";

/// One unit of indexed text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// Conversation id, or path relative to the source root
    pub id: String,
    /// Display title
    pub title: String,
    /// RFC 3339 timestamp, empty when unknown
    pub timestamp: String,
    /// Searchable body
    pub content: String,
}

/// Collect the documents under `source`, which may be a directory or a single file
///
/// `extensions` lists the (lowercase, dot-less) file extensions considered
/// plain text when no conversation export is present.
pub fn discover_documents(source: &Path, extensions: &[String]) -> Result<Vec<Document>, IndexError> {
    if source.is_file() {
        if source.file_name().is_some_and(|n| n == CONVERSATIONS_FILE) {
            return load_conversations(source);
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(read_text_document(source, &name, extensions)
            .into_iter()
            .collect());
    }

    let conversations = source.join(CONVERSATIONS_FILE);
    if conversations.is_file() {
        return load_conversations(&conversations);
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| IndexError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        if let Some(doc) = read_text_document(entry.path(), &relative, extensions) {
            documents.push(doc);
        }
    }
    Ok(documents)
}

/// A file with a text extension and UTF-8 content, or `None`
fn read_text_document(path: &Path, id: &str, extensions: &[String]) -> Option<Document> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
        return None;
    }
    // binary or non-UTF-8 files are skipped
    let content = std::fs::read_to_string(path).ok()?;
    Some(Document {
        id: id.to_string(),
        title: path.file_name()?.to_string_lossy().into_owned(),
        timestamp: String::new(),
        content,
    })
}

fn load_conversations(path: &Path) -> Result<Vec<Document>, IndexError> {
    let reader = BufReader::new(File::open(path)?);
    let data: Value = serde_json::from_reader(reader).map_err(|e| IndexError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let list = match &data {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => ["conversations", "items", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    Ok(list
        .iter()
        .enumerate()
        .map(|(i, conversation)| conversation_document(i + 1, conversation))
        .collect())
}

fn conversation_document(position: usize, conversation: &Value) -> Document {
    let id = match conversation.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => position.to_string(),
    };
    let title = conversation
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_owned);
    let timestamp = ["create_time", "update_time"]
        .iter()
        .filter_map(|key| conversation.get(*key))
        .find(|v| !v.is_null())
        .map(format_timestamp)
        .unwrap_or_default();

    let mut parts: Vec<String> = title.iter().cloned().collect();
    if let Some(Value::Object(mapping)) = conversation.get("mapping") {
        let mut messages: Vec<&Value> = mapping
            .values()
            .filter_map(|node| node.get("message"))
            .filter(|m| m.is_object())
            .collect();
        messages.sort_by(|a, b| {
            let ta = a.get("create_time").and_then(Value::as_f64).unwrap_or(0.0);
            let tb = b.get("create_time").and_then(Value::as_f64).unwrap_or(0.0);
            ta.total_cmp(&tb)
        });
        for message in messages {
            let text = message_text(message);
            if text.is_empty() {
                continue;
            }
            let role = message
                .pointer("/author/role")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            parts.push(format!("{role}: {text}"));
        }
    }

    Document {
        id,
        title: title.unwrap_or_else(|| format!("Conversation {position}")),
        timestamp,
        content: parts.join("\n\n"),
    }
}

fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::Object(content)) => {
            if let Some(Value::Array(parts)) = content.get("parts")
                && !parts.is_empty()
            {
                join_parts(parts)
            } else {
                content
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            }
        }
        Some(Value::Array(parts)) => join_parts(parts),
        Some(Value::String(text)) => text.clone(),
        _ => String::new(),
    }
}

fn join_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            Value::String(s) => Some(s.trim()),
            Value::Object(obj) => obj
                .get("text")
                .or_else(|| obj.get("value"))
                .and_then(Value::as_str)
                .map(str::trim),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Epoch seconds to RFC 3339; other values are kept as text
fn format_timestamp(value: &Value) -> String {
    let seconds = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    match seconds {
        Some(secs) => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9) as u32;
            DateTime::from_timestamp(whole as i64, nanos)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default()
        }
        None => match value {
            Value::String(s) => s.clone(),
            _ => String::new(),
        },
    }
}
