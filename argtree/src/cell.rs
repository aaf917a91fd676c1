//! Value cells: the mutable slot behind every flag.
//!
//! A cell is created once per flag per run, seeded with the flag's default
//! (or the value a source supplied) and then mutated by each command-line
//! occurrence.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::value::{Scalar, Value};

/// Marks a raw value as a JSON snapshot of a whole collection.
pub const SERIALIZED_PREFIX: &str = "sl:::";

// ============================================================================
// ParseConfig: collection splitting
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConfig {
    pub separator: String,
    pub disable_separator: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            separator: ",".to_string(),
            disable_separator: false,
        }
    }
}

impl ParseConfig {
    pub fn split<'a>(&self, raw: &'a str) -> Vec<&'a str> {
        if self.disable_separator || self.separator.is_empty() {
            vec![raw]
        } else {
            raw.split(self.separator.as_str()).collect()
        }
    }
}

// ============================================================================
// Destination: application-owned write-through slot
// ============================================================================

/// Shared handle the library writes parsed values into.
///
/// Keep a clone, hand the other to a flag's `destination`, and read it back
/// after `run` returns.
pub struct Destination<T>(Rc<RefCell<T>>);

impl<T> Destination<T> {
    pub fn new(initial: T) -> Self {
        Destination(Rc::new(RefCell::new(initial)))
    }

    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }
}

impl<T: Clone> Destination<T> {
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for Destination<T> {
    fn clone(&self) -> Self {
        Destination(Rc::clone(&self.0))
    }
}

impl<T: Default> Default for Destination<T> {
    fn default() -> Self {
        Destination::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Destination<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Destination").field(&*self.0.borrow()).finish()
    }
}

// ============================================================================
// ValueCell
// ============================================================================

pub trait ValueCell {
    /// Parse `raw` and store it. The error is the bare reason; callers wrap
    /// it with the flag name and origin.
    fn set(&mut self, raw: &str) -> Result<(), String>;

    fn get(&self) -> Value;

    fn format(&self) -> String;

    fn is_bool(&self) -> bool {
        false
    }

    /// Number of successful `set` calls on a boolean cell.
    fn count(&self) -> usize {
        0
    }

    /// `sl:::` snapshot for collection cells.
    fn serialize(&self) -> Option<String> {
        None
    }
}

pub struct ScalarCell<T: Scalar> {
    value: T,
    config: T::Config,
    destination: Option<Destination<T>>,
    counter: Option<Destination<usize>>,
    count: usize,
}

impl<T: Scalar> ScalarCell<T> {
    pub fn new(value: T, config: T::Config, destination: Option<Destination<T>>) -> Self {
        if let Some(dest) = &destination {
            dest.set(value.clone());
        }
        let counter = T::counter(&config);
        if let Some(counter) = &counter {
            counter.set(0);
        }
        ScalarCell {
            value,
            config,
            destination,
            counter,
            count: 0,
        }
    }

    /// A cell bound to nothing, used to try a raw value out.
    pub fn detached(value: T, config: T::Config) -> Self {
        ScalarCell {
            value,
            config,
            destination: None,
            counter: None,
            count: 0,
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Scalar> ValueCell for ScalarCell<T> {
    fn set(&mut self, raw: &str) -> Result<(), String> {
        self.value = T::parse(raw, &self.config)?;
        if let Some(dest) = &self.destination {
            dest.set(self.value.clone());
        }
        if T::IS_BOOL {
            self.count += 1;
            if let Some(counter) = &self.counter {
                counter.set(self.count);
            }
        }
        Ok(())
    }

    fn get(&self) -> Value {
        self.value.clone().into_value()
    }

    fn format(&self) -> String {
        self.value.format(&self.config)
    }

    fn is_bool(&self) -> bool {
        T::IS_BOOL
    }

    fn count(&self) -> usize {
        self.count
    }
}

// ============================================================================
// Collections
// ============================================================================

fn snapshot(raw: &str) -> Option<Result<Json, String>> {
    raw.strip_prefix(SERIALIZED_PREFIX)
        .map(|json| serde_json::from_str(json).map_err(|e| format!("invalid snapshot: {}", e)))
}

pub struct SliceCell<T: Scalar> {
    items: Vec<T>,
    config: T::Config,
    parse: ParseConfig,
    destination: Option<Destination<Vec<T>>>,
    has_been_set: bool,
}

impl<T: Scalar> SliceCell<T> {
    pub fn new(
        items: Vec<T>,
        config: T::Config,
        parse: ParseConfig,
        destination: Option<Destination<Vec<T>>>,
    ) -> Self {
        let cell = SliceCell {
            items,
            config,
            parse,
            destination,
            has_been_set: false,
        };
        cell.sync();
        cell
    }

    pub fn detached(items: Vec<T>, config: T::Config, parse: ParseConfig) -> Self {
        SliceCell::new(items, config, parse, None)
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }

    fn sync(&self) {
        if let Some(dest) = &self.destination {
            dest.set(self.items.clone());
        }
    }
}

impl<T: Scalar> ValueCell for SliceCell<T> {
    fn set(&mut self, raw: &str) -> Result<(), String> {
        if let Some(json) = snapshot(raw) {
            let Json::Array(elements) = json? else {
                return Err("snapshot is not a JSON array".to_string());
            };
            self.items = elements
                .iter()
                .map(|e| T::from_json(e, &self.config))
                .collect::<Result<_, _>>()?;
            self.has_been_set = true;
            self.sync();
            return Ok(());
        }

        let parsed = self
            .parse
            .split(raw)
            .into_iter()
            .map(|token| T::parse(token.trim(), &self.config))
            .collect::<Result<Vec<_>, _>>()?;
        if !self.has_been_set {
            self.items.clear();
            self.has_been_set = true;
        }
        self.items.extend(parsed);
        self.sync();
        Ok(())
    }

    fn get(&self) -> Value {
        Value::List(self.items.iter().cloned().map(T::into_value).collect())
    }

    fn format(&self) -> String {
        let parts: Vec<String> = self.items.iter().map(|i| i.format(&self.config)).collect();
        format!("[{}]", parts.join(", "))
    }

    fn serialize(&self) -> Option<String> {
        let json = Json::Array(self.items.iter().map(T::to_json).collect());
        Some(format!("{}{}", SERIALIZED_PREFIX, json))
    }
}

pub struct MapCell<T: Scalar> {
    entries: BTreeMap<String, T>,
    config: T::Config,
    parse: ParseConfig,
    destination: Option<Destination<BTreeMap<String, T>>>,
    has_been_set: bool,
}

impl<T: Scalar> MapCell<T> {
    pub fn new(
        entries: BTreeMap<String, T>,
        config: T::Config,
        parse: ParseConfig,
        destination: Option<Destination<BTreeMap<String, T>>>,
    ) -> Self {
        let cell = MapCell {
            entries,
            config,
            parse,
            destination,
            has_been_set: false,
        };
        cell.sync();
        cell
    }

    pub fn detached(entries: BTreeMap<String, T>, config: T::Config, parse: ParseConfig) -> Self {
        MapCell::new(entries, config, parse, None)
    }

    pub fn into_inner(self) -> BTreeMap<String, T> {
        self.entries
    }

    fn sync(&self) {
        if let Some(dest) = &self.destination {
            dest.set(self.entries.clone());
        }
    }
}

impl<T: Scalar> ValueCell for MapCell<T> {
    fn set(&mut self, raw: &str) -> Result<(), String> {
        if let Some(json) = snapshot(raw) {
            let Json::Object(fields) = json? else {
                return Err("snapshot is not a JSON object".to_string());
            };
            self.entries = fields
                .iter()
                .map(|(k, v)| T::from_json(v, &self.config).map(|v| (k.clone(), v)))
                .collect::<Result<_, _>>()?;
            self.has_been_set = true;
            self.sync();
            return Ok(());
        }

        let mut parsed = Vec::new();
        for token in self.parse.split(raw) {
            let item = token.trim();
            let Some((key, value)) = item.split_once('=') else {
                return Err(format!("item {:?} is missing separator \"=\"", item));
            };
            parsed.push((key.to_string(), T::parse(value, &self.config)?));
        }
        if !self.has_been_set {
            self.entries.clear();
            self.has_been_set = true;
        }
        self.entries.extend(parsed);
        self.sync();
        Ok(())
    }

    fn get(&self) -> Value {
        Value::Map(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().into_value()))
                .collect(),
        )
    }

    fn format(&self) -> String {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.format(&self.config)))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }

    fn serialize(&self) -> Option<String> {
        let object: serde_json::Map<String, Json> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Some(format!("{}{}", SERIALIZED_PREFIX, Json::Object(object)))
    }
}
