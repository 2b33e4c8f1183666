//! Backend reply normalization.
//!
//! Replies are free text that usually, but not always, carries JSON. The
//! normalizer tries, in order:
//! 1. the contents of a fenced block tagged `json`
//! 2. the first balanced `{...}` or `[...]` substring that parses to a
//!    record; empty `{}`/`[]` and arrays without an object are passed over,
//!    and at most 64 of the remaining candidates are parsed
//! 3. a fallback record with every field at its sentinel and the reply kept
//!    verbatim in `additional_context`
//!
//! The first step that yields JSON wins. Normalization never fails.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::record::{
    is_meaningful, AnnotationRecord, CollectionField, PlayerEntry, ScalarField,
    NOTABLE_PLAYERS_KEY, UNKNOWN,
};

/// Candidate substrings that could hold a record parsed by the embedded-JSON scan.
const MAX_EMBEDDED_ATTEMPTS: usize = 64;
/// Keys under which some backends wrap a per-frame array.
const WRAPPER_KEYS: [&str; 3] = ["frames", "results", "annotations"];
const CONTEXT_KEYS: [&str; 2] = ["additional_context", "reasoning"];

/// Which step of the chain produced the records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    FencedBlock,
    EmbeddedJson,
    Fallback,
}

/// Records recovered from one reply.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    /// One record for an object reply, one per element for an array reply.
    pub records: Vec<AnnotationRecord>,
    /// True when the reply was a per-frame array.
    pub batch: bool,
    pub recovery: Recovery,
}

impl Normalized {
    /// The single record of an object reply, or the first of a batch.
    #[cfg(test)]
    pub fn first(&self) -> AnnotationRecord {
        self.records.first().cloned().unwrap_or_default()
    }
}

/// Normalize a raw backend reply.
pub fn normalize(raw_text: &str) -> Normalized {
    if let Some(value) = fenced_json(raw_text) {
        if let Some(normalized) = from_value(value, Recovery::FencedBlock) {
            return normalized;
        }
    }
    if let Some(normalized) = embedded_json(raw_text) {
        return normalized;
    }
    log::debug!(
        "no JSON recovered from reply ({} bytes), using fallback record",
        raw_text.len()
    );
    Normalized {
        records: vec![AnnotationRecord::fallback(raw_text)],
        batch: false,
        recovery: Recovery::Fallback,
    }
}

fn fenced_json(raw_text: &str) -> Option<Value> {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE_RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*(?i:json)[ \t]*\r?\n?(.*?)```").unwrap());
    re.captures_iter(raw_text)
        .filter_map(|captures| captures.get(1))
        .find_map(|body| serde_json::from_str(body.as_str().trim()).ok())
}

fn embedded_json(raw_text: &str) -> Option<Normalized> {
    raw_text
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .filter_map(|(start, _)| balanced_end(raw_text, start).map(|end| &raw_text[start..end]))
        .filter(|candidate| could_hold_record(candidate))
        .take(MAX_EMBEDDED_ATTEMPTS)
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find_map(|value| from_value(value, Recovery::EmbeddedJson))
}

/// Cheap pre-parse check on a balanced candidate.
///
/// Empty containers and arrays with no object inside (`[]`, `{ }`, `[12]`)
/// never yield a record.
fn could_hold_record(candidate: &str) -> bool {
    let inner = candidate[1..candidate.len() - 1].trim();
    if candidate.starts_with('[') {
        inner.contains('{')
    } else {
        !inner.is_empty()
    }
}

/// Byte offset just past the bracket that closes the one at `start`.
///
/// Brackets inside string literals are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn from_value(value: Value, recovery: Recovery) -> Option<Normalized> {
    match value {
        Value::Object(object) => {
            if let Some(elements) = wrapped_array(&object) {
                return Some(batch_from_elements(elements, recovery));
            }
            Some(Normalized {
                records: vec![record_from_object(&object)],
                batch: false,
                recovery,
            })
        }
        Value::Array(elements) => {
            if !elements.is_empty() && !elements.iter().any(Value::is_object) {
                return None;
            }
            Some(batch_from_elements(&elements, recovery))
        }
        _ => None,
    }
}

fn batch_from_elements(elements: &[Value], recovery: Recovery) -> Normalized {
    Normalized {
        records: elements
            .iter()
            .filter_map(Value::as_object)
            .map(record_from_object)
            .collect(),
        batch: true,
        recovery,
    }
}

/// `{"frames": [...]}` style wrappers, only when no schema key is present.
fn wrapped_array(object: &Map<String, Value>) -> Option<&Vec<Value>> {
    let has_schema_key = object.keys().any(|key| ScalarField::from_key(key).is_some());
    if has_schema_key {
        return None;
    }
    WRAPPER_KEYS.iter().find_map(|key| {
        lookup(object, key, &[])
            .and_then(Value::as_array)
            .filter(|elements| elements.iter().any(Value::is_object))
    })
}

fn lookup<'a>(object: &'a Map<String, Value>, key: &str, aliases: &[&str]) -> Option<&'a Value> {
    std::iter::once(key)
        .chain(aliases.iter().copied())
        .find_map(|wanted| {
            object
                .iter()
                .find(|(candidate, _)| candidate.trim().eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value)
        })
}

fn record_from_object(object: &Map<String, Value>) -> AnnotationRecord {
    let mut record = AnnotationRecord::default();
    for field in ScalarField::ALL {
        if let Some(value) = lookup(object, field.key(), field.aliases()) {
            *record.event.scalar_mut(field) = scalar_text(value);
        }
    }
    for field in CollectionField::ALL {
        if let Some(value) = lookup(object, field.key(), field.aliases()) {
            *record.event.collection_mut(field) = collection_texts(value);
        }
    }
    if let Some(value) = lookup(object, NOTABLE_PLAYERS_KEY, &["players_with_numbers"]) {
        record.event.notable_players_with_numbers = player_entries(value);
    }
    record.additional_context = CONTEXT_KEYS
        .iter()
        .filter_map(|key| lookup(object, key, &[]))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string);
    record
}

/// Scalar value as text, or the sentinel.
fn scalar_text(value: &Value) -> String {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        Value::Array(items) if items.is_empty() => String::new(),
        Value::Object(fields) if fields.is_empty() => String::new(),
        other => other.to_string(),
    };
    if is_meaningful(&text) {
        text
    } else {
        UNKNOWN.to_string()
    }
}

fn collection_texts(value: &Value) -> Vec<String> {
    let element_text = |element: &Value| -> Option<String> {
        let text = match element {
            Value::String(text) => text.trim().to_string(),
            Value::Number(number) => number.to_string(),
            Value::Object(fields) => fields.get("name").and_then(Value::as_str)?.trim().to_string(),
            _ => return None,
        };
        is_meaningful(&text).then_some(text)
    };
    match value {
        Value::Array(elements) => elements.iter().filter_map(element_text).collect(),
        single => element_text(single).into_iter().collect(),
    }
}

fn player_entries(value: &Value) -> Vec<PlayerEntry> {
    let entry = |element: &Value| -> Option<PlayerEntry> {
        match element {
            Value::Object(fields) => {
                let name = lookup(fields, "name", &["player"]).map(scalar_text)?;
                if !is_meaningful(&name) {
                    return None;
                }
                let jersey_number = lookup(fields, "jersey_number", &["jersey", "number"])
                    .map(scalar_text)
                    .unwrap_or_else(|| UNKNOWN.to_string());
                let team = lookup(fields, "team", &[])
                    .map(scalar_text)
                    .unwrap_or_else(|| UNKNOWN.to_string());
                Some(PlayerEntry {
                    name,
                    jersey_number,
                    team,
                })
            }
            Value::String(name) if is_meaningful(name) => {
                Some(PlayerEntry::new(name.trim(), UNKNOWN, UNKNOWN))
            }
            _ => None,
        }
    };
    match value {
        Value::Array(elements) => elements.iter().filter_map(entry).collect(),
        single => entry(single).into_iter().collect(),
    }
}
