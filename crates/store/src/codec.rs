// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry payload codec.
//!
//! Payloads are JSON with a lossy type escape shared with the other Skynet
//! bindings: symbol-like atoms travel as `":name"` strings, and bare
//! scalars are written as their YAML scalar text so integers, floats,
//! booleans, dates and times survive the trip. Anything unparseable comes
//! back as the raw string unchanged.

use chrono::{DateTime, FixedOffset, NaiveDate};
use thiserror::Error;

/// A decoded payload value. `Sym` is the internal form of the `":name"`
/// wire marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Sym(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(DateTime<FixedOffset>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn sym(s: impl Into<String>) -> Self {
        Value::Sym(s.into())
    }

    /// String view of `Str` and `Sym` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("map keys must be strings or symbols")]
    InvalidKey,

    #[error("cannot serialize a non-finite float")]
    NonFiniteFloat,
}

/// Serialize a value to its text payload.
pub fn encode(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Map(_) | Value::List(_) => {
            let json = to_json(value)?;
            // Maps and lists always serialize; only float edge cases error,
            // and those were caught by to_json above.
            serde_json::to_string(&json).map_err(|_| CodecError::NonFiniteFloat)
        }
        Value::Str(s) => Ok(s.clone()),
        Value::Sym(s) => Ok(format!(":{}", s)),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => encode_float(*f),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Date(d) => Ok(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => Ok(t.to_rfc3339()),
    }
}

/// Deserialize a text payload. Never fails: unparseable input is returned
/// as the raw string.
pub fn decode(text: &str) -> Value {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
            return from_json(json);
        }
    }
    decode_scalar(text)
}

fn encode_float(f: f64) -> Result<String, CodecError> {
    if !f.is_finite() {
        return Err(CodecError::NonFiniteFloat);
    }
    // Keep a decimal point so the text reads back as a float, not an int.
    if f == f.trunc() {
        Ok(format!("{:.1}", f))
    } else {
        Ok(f.to_string())
    }
}

fn decode_scalar(text: &str) -> Value {
    if let Some(name) = text.strip_prefix(':') {
        if !name.is_empty() && !name.contains('"') {
            return Value::Sym(name.to_string());
        }
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    if looks_numeric(text) {
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
    }
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Value::Time(t);
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Value::Date(d);
    }
    Value::Str(text.to_string())
}

/// Guard so words like "NaN" or "infinity" stay strings even though the
/// float parser would accept them.
fn looks_numeric(text: &str) -> bool {
    let rest = text.strip_prefix(['-', '+']).unwrap_or(text);
    rest.starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

fn to_json(value: &Value) -> Result<serde_json::Value, CodecError> {
    Ok(match value {
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Sym(s) => serde_json::Value::String(format!(":{}", s)),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(CodecError::NonFiniteFloat);
            }
            serde_json::Value::from(*f)
        }
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => serde_json::Value::String(t.to_rfc3339()),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(to_json(item)?);
            }
            serde_json::Value::Array(out)
        }
        Value::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (key, val) in entries {
                let key = match key {
                    Value::Str(s) => s.clone(),
                    Value::Sym(s) => format!(":{}", s),
                    _ => return Err(CodecError::InvalidKey),
                };
                map.insert(key, to_json(val)?);
            }
            serde_json::Value::Object(map)
        }
    })
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Str(String::new()),
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => decode_json_string(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.into_iter().map(|(k, v)| (decode_json_string(k), from_json(v))).collect(),
        ),
    }
}

fn decode_json_string(s: String) -> Value {
    match s.strip_prefix(':') {
        Some(name) if !name.is_empty() && !name.contains('"') => Value::Sym(name.to_string()),
        _ => Value::Str(s),
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
