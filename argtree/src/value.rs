//! Primitive value kinds and the untyped `Value` returned by lookups.
//!
//! Every kind a flag can hold implements [`Scalar`]: it knows how to parse
//! its command-line grammar, how to print itself back, and how to travel
//! through the JSON snapshot carried by collection flags.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeDelta, Utc};
use serde_json::Value as Json;

use crate::cell::Destination;
use crate::duration;

// ============================================================================
// Value: untyped view of a flag's current content
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Duration(TimeDelta),
    Timestamp(DateTime<FixedOffset>),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Uint(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Duration(d) => f.write_str(&duration::format(d)),
            Value::Timestamp(t) => f.write_str(&t.to_rfc3339()),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

// ============================================================================
// Per-kind configuration
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BoolConfig {
    /// Mirrors the occurrence count into an application-owned slot.
    pub count: Option<Destination<usize>>,
}

/// `base` 0 auto-detects `0x`, `0o`, `0b` and leading-zero octal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegerConfig {
    pub base: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TimestampConfig {
    /// strftime layouts, tried in order. Empty means RFC 3339.
    pub layouts: Vec<String>,
    pub timezone: Option<FixedOffset>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringConfig {
    pub trim_space: bool,
}

// ============================================================================
// Scalar: one primitive kind
// ============================================================================

pub trait Scalar: Clone + fmt::Debug + 'static {
    type Config: Clone + Default + fmt::Debug + 'static;

    const TYPE_NAME: &'static str;
    const IS_BOOL: bool = false;
    /// Whether an empty value from a source is a legitimate value.
    const ACCEPTS_EMPTY: bool = false;

    fn zero() -> Self;

    fn parse(raw: &str, config: &Self::Config) -> Result<Self, String>;

    fn format(&self, config: &Self::Config) -> String;

    fn to_json(&self) -> Json;

    fn from_json(json: &Json, config: &Self::Config) -> Result<Self, String> {
        match json {
            Json::String(s) => Self::parse(s, config),
            other => Self::parse(&other.to_string(), config),
        }
    }

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;

    fn counter(_config: &Self::Config) -> Option<Destination<usize>> {
        None
    }
}

impl Scalar for bool {
    type Config = BoolConfig;

    const TYPE_NAME: &'static str = "bool";
    const IS_BOOL: bool = true;

    fn zero() -> Self {
        false
    }

    fn parse(raw: &str, _config: &BoolConfig) -> Result<Self, String> {
        const TRUTHY: [&str; 3] = ["1", "t", "true"];
        const FALSY: [&str; 3] = ["0", "f", "false"];
        if TRUTHY.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
            Ok(true)
        } else if FALSY.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
            Ok(false)
        } else {
            Err("invalid syntax".to_string())
        }
    }

    fn format(&self, _config: &BoolConfig) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Json {
        Json::Bool(*self)
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn counter(config: &BoolConfig) -> Option<Destination<usize>> {
        config.count.clone()
    }
}

fn split_sign(raw: &str) -> (bool, &str) {
    if let Some(rest) = raw.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = raw.strip_prefix('+') {
        (false, rest)
    } else {
        (false, raw)
    }
}

fn strip_underscores(digits: &str, after_prefix: bool) -> Result<String, String> {
    if !digits.contains('_') {
        return Ok(digits.to_string());
    }
    let parts: Vec<&str> = digits.split('_').collect();
    for (i, part) in parts.iter().enumerate() {
        let leading_ok = i == 0 && after_prefix;
        if part.is_empty() && !leading_ok {
            return Err("invalid syntax".to_string());
        }
    }
    Ok(parts.concat())
}

/// Parse an unsigned magnitude (no sign) in `base`, or auto-detect when 0.
fn parse_magnitude(body: &str, base: u32) -> Result<u64, String> {
    if body.is_empty() || body.starts_with(['+', '-']) {
        return Err("invalid syntax".to_string());
    }
    let digits = if base == 0 {
        let lower = body.get(..2).map(str::to_ascii_lowercase);
        let (radix, rest, prefixed) = match lower.as_deref() {
            Some("0x") => (16, &body[2..], true),
            Some("0o") => (8, &body[2..], true),
            Some("0b") => (2, &body[2..], true),
            _ if body.len() > 1 && body.starts_with('0') => (8, &body[1..], true),
            _ => (10, body, false),
        };
        let cleaned = strip_underscores(rest, prefixed)?;
        if cleaned.is_empty() || cleaned.starts_with(['+', '-']) {
            return Err("invalid syntax".to_string());
        }
        return u64::from_str_radix(&cleaned, radix).map_err(|e| e.to_string());
    } else if !(2..=36).contains(&base) {
        return Err(format!("invalid base {}", base));
    } else {
        body
    };
    u64::from_str_radix(digits, base).map_err(|e| e.to_string())
}

impl Scalar for i64 {
    type Config = IntegerConfig;

    const TYPE_NAME: &'static str = "i64";

    fn zero() -> Self {
        0
    }

    fn parse(raw: &str, config: &IntegerConfig) -> Result<Self, String> {
        let (negative, body) = split_sign(raw);
        let magnitude = parse_magnitude(body, config.base)? as i128;
        let signed = if negative { -magnitude } else { magnitude };
        i64::try_from(signed).map_err(|_| "value out of range".to_string())
    }

    fn format(&self, _config: &IntegerConfig) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Json {
        Json::from(*self)
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl Scalar for u64 {
    type Config = IntegerConfig;

    const TYPE_NAME: &'static str = "u64";

    fn zero() -> Self {
        0
    }

    fn parse(raw: &str, config: &IntegerConfig) -> Result<Self, String> {
        parse_magnitude(raw, config.base)
    }

    fn format(&self, _config: &IntegerConfig) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Json {
        Json::from(*self)
    }

    fn into_value(self) -> Value {
        Value::Uint(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uint(n) => Some(*n),
            _ => None,
        }
    }
}

impl Scalar for f64 {
    type Config = ();

    const TYPE_NAME: &'static str = "f64";

    fn zero() -> Self {
        0.0
    }

    fn parse(raw: &str, _config: &()) -> Result<Self, String> {
        raw.parse::<f64>().map_err(|e| e.to_string())
    }

    fn format(&self, _config: &()) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Json {
        serde_json::Number::from_f64(*self)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(self.to_string()))
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl Scalar for TimeDelta {
    type Config = ();

    const TYPE_NAME: &'static str = "Duration";

    fn zero() -> Self {
        TimeDelta::zero()
    }

    fn parse(raw: &str, _config: &()) -> Result<Self, String> {
        duration::parse(raw)
    }

    fn format(&self, _config: &()) -> String {
        duration::format(self)
    }

    fn to_json(&self) -> Json {
        Json::String(duration::format(self))
    }

    fn into_value(self) -> Value {
        Value::Duration(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

fn parse_with_layout(
    raw: &str,
    layout: &str,
    local: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_str(raw, layout) {
        return Some(dt);
    }
    let naive = NaiveDateTime::parse_from_str(raw, layout)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, layout)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    naive.and_local_timezone(local).single()
}

impl Scalar for DateTime<FixedOffset> {
    type Config = TimestampConfig;

    const TYPE_NAME: &'static str = "DateTime";

    fn zero() -> Self {
        DateTime::<Utc>::default().fixed_offset()
    }

    fn parse(raw: &str, config: &TimestampConfig) -> Result<Self, String> {
        let parsed = if config.layouts.is_empty() {
            DateTime::parse_from_rfc3339(raw).map_err(|e| e.to_string())?
        } else {
            let local = config.timezone.unwrap_or_else(|| Utc.fix());
            config
                .layouts
                .iter()
                .find_map(|layout| parse_with_layout(raw, layout, local))
                .ok_or_else(|| {
                    format!("does not match any layout ({})", config.layouts.join(", "))
                })?
        };
        Ok(match config.timezone {
            Some(tz) => parsed.with_timezone(&tz),
            None => parsed,
        })
    }

    fn format(&self, config: &TimestampConfig) -> String {
        match config.layouts.first() {
            Some(layout) => self.format(layout).to_string(),
            None => self.to_rfc3339(),
        }
    }

    fn to_json(&self) -> Json {
        Json::String(self.to_rfc3339())
    }

    fn from_json(json: &Json, config: &TimestampConfig) -> Result<Self, String> {
        let Json::String(s) = json else {
            return Err(format!("expected a timestamp string, got {}", json));
        };
        match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Ok(dt),
            Err(_) => Self::parse(s, config),
        }
    }

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl Scalar for String {
    type Config = StringConfig;

    const TYPE_NAME: &'static str = "String";
    const ACCEPTS_EMPTY: bool = true;

    fn zero() -> Self {
        String::new()
    }

    fn parse(raw: &str, config: &StringConfig) -> Result<Self, String> {
        if config.trim_space {
            Ok(raw.trim().to_string())
        } else {
            Ok(raw.to_string())
        }
    }

    fn format(&self, _config: &StringConfig) -> String {
        self.clone()
    }

    fn to_json(&self) -> Json {
        Json::String(self.clone())
    }

    fn from_json(json: &Json, _config: &StringConfig) -> Result<Self, String> {
        match json {
            Json::String(s) => Ok(s.clone()),
            other => Err(format!("expected a string, got {}", other)),
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

// ============================================================================
// FromValue: typed retrieval through Context::get
// ============================================================================

pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! scalar_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    <$ty as Scalar>::from_value(value)
                }
            }
        )*
    };
}

scalar_from_value!(bool, i64, u64, f64, TimeDelta, DateTime<FixedOffset>, String);

impl<T: Scalar> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: Scalar> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => None,
        }
    }
}
