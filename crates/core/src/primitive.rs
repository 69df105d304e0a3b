//! Primitive values wrapped by simple types
//!
//! This module defines:
//! - Primitive: the canonical internal representation of a simple value
//! - PrimitiveKind: the discriminant used by simple types to select a cast
//!
//! ## Primitive Model
//!
//! Five kinds only: String, Number, Boolean, Date, Object.
//!
//! - Numbers are IEEE-754 doubles: `NaN != NaN`, `-0.0 == 0.0`
//! - Dates are UTC instants, serialized as RFC 3339 strings with millisecond precision
//! - Objects are plain JSON objects kept opaque (never interpreted as specifications)
//! - Different kinds are NEVER equal

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::fmt;

/// Kind of a primitive value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// UTF-8 text
    String,
    /// 64-bit floating point
    Number,
    /// true / false
    Boolean,
    /// UTC instant
    Date,
    /// Plain JSON object
    Object,
}

impl PrimitiveKind {
    /// Lower-case name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Object => "object",
        }
    }
}

/// Canonical primitive value of a simple instance
#[derive(Debug, Clone)]
pub enum Primitive {
    /// UTF-8 string
    String(String),
    /// 64-bit floating point (IEEE-754)
    Number(f64),
    /// Boolean value
    Boolean(bool),
    /// UTC date-time
    Date(DateTime<Utc>),
    /// Plain JSON object
    Object(Map<String, Json>),
}

// Custom PartialEq implementation for IEEE-754 number semantics
impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Primitive::String(a), Primitive::String(b)) => a == b,
            (Primitive::Number(a), Primitive::Number(b)) => a == b,
            (Primitive::Boolean(a), Primitive::Boolean(b)) => a == b,
            (Primitive::Date(a), Primitive::Date(b)) => a == b,
            (Primitive::Object(a), Primitive::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Primitive {
    /// Kind of this primitive
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::String(_) => PrimitiveKind::String,
            Primitive::Number(_) => PrimitiveKind::Number,
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Date(_) => PrimitiveKind::Date,
            Primitive::Object(_) => PrimitiveKind::Object,
        }
    }

    /// Check if this is a plain object, which must never be mistaken for a specification
    pub fn is_object(&self) -> bool {
        matches!(self, Primitive::Object(_))
    }

    /// Get as &str if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as f64 if this is a Number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Primitive::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as bool if this is a Boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as a date if this is a Date
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Primitive::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Get as a JSON map if this is an Object
    pub fn as_object(&self) -> Option<&Map<String, Json>> {
        match self {
            Primitive::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The key of this primitive: its string form
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Generic ascending comparison
    ///
    /// Numbers and dates compare numerically, booleans with `false < true`,
    /// everything else lexicographically by string form.
    pub fn compare(&self, other: &Primitive) -> Ordering {
        match (self, other) {
            (Primitive::Number(a), Primitive::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Primitive::Date(a), Primitive::Date(b)) => a.cmp(b),
            (Primitive::Boolean(a), Primitive::Boolean(b)) => a.cmp(b),
            (Primitive::String(a), Primitive::String(b)) => a.cmp(b),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }

    /// Read a primitive from its JSON representation
    ///
    /// Strings, numbers, booleans and objects map to their kinds.
    /// `null` and arrays have no primitive representation.
    pub fn from_json(value: &Json) -> Option<Primitive> {
        match value {
            Json::String(s) => Some(Primitive::String(s.clone())),
            Json::Number(n) => n.as_f64().map(Primitive::Number),
            Json::Bool(b) => Some(Primitive::Boolean(*b)),
            Json::Object(o) => Some(Primitive::Object(o.clone())),
            Json::Null | Json::Array(_) => None,
        }
    }

    /// JSON representation of this primitive
    ///
    /// Integral numbers are emitted as JSON integers; non-finite numbers
    /// have no JSON form and become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            Primitive::String(s) => Json::String(s.clone()),
            Primitive::Number(n) => number_to_json(*n),
            Primitive::Boolean(b) => Json::Bool(*b),
            Primitive::Date(d) => Json::String(format_date(d)),
            Primitive::Object(o) => Json::Object(o.clone()),
        }
    }

    /// Create a date from milliseconds since the Unix epoch
    pub fn date_from_millis(millis: i64) -> Option<Primitive> {
        Utc.timestamp_millis_opt(millis).single().map(Primitive::Date)
    }
}

fn number_to_json(n: f64) -> Json {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::String(s) => write!(f, "{}", s),
            Primitive::Number(n) => write!(f, "{}", format_number(*n)),
            Primitive::Boolean(b) => write!(f, "{}", b),
            Primitive::Date(d) => write!(f, "{}", format_date(d)),
            Primitive::Object(o) => write!(f, "{}", Json::Object(o.clone())),
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::String(s.to_string())
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::String(s)
    }
}

impl From<f64> for Primitive {
    fn from(n: f64) -> Self {
        Primitive::Number(n)
    }
}

impl From<i64> for Primitive {
    fn from(n: i64) -> Self {
        Primitive::Number(n as f64)
    }
}

impl From<i32> for Primitive {
    fn from(n: i32) -> Self {
        Primitive::Number(n as f64)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Primitive {
    fn from(d: DateTime<Utc>) -> Self {
        Primitive::Date(d)
    }
}

impl From<Primitive> for Json {
    fn from(p: Primitive) -> Self {
        p.to_json()
    }
}

// JSON form; dates come back as strings.
impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Primitive {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Primitive::from_json(&json)
            .ok_or_else(|| serde::de::Error::custom(format!("{} is not a primitive", json)))
    }
}
