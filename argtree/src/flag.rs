//! Flag declarations.
//!
//! A flag is built with `FlagBase<K>` (usually through one of the aliases
//! such as [`StringFlag`] or [`IntSliceFlag`]) and handed to a command as a
//! `Box<dyn Flag>`. Each run asks the flag to [`Flag::apply`] itself, which
//! resolves the value sources and produces a fresh cell.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, FixedOffset, TimeDelta};
use tracing::debug;

use crate::cell::{Destination, MapCell, ParseConfig, ScalarCell, SliceCell, ValueCell};
use crate::context::Context;
use crate::error::{BoxError, Error, Origin, ParseError, Result};
use crate::source::ValueSourceChain;
use crate::value::{FromValue, Scalar, Value};

// ============================================================================
// FlagKind: scalar, slice or map of a Scalar
// ============================================================================

pub trait FlagKind: 'static {
    type Output: Clone + fmt::Debug + 'static;
    type Config: Clone + Default + fmt::Debug + 'static;

    fn type_name() -> String;
    fn is_bool() -> bool;
    fn accepts_empty() -> bool;
    fn zero() -> Self::Output;
    fn format(value: &Self::Output, config: &Self::Config) -> String;

    fn create(
        value: Self::Output,
        config: &Self::Config,
        destination: Option<Destination<Self::Output>>,
        parse: &ParseConfig,
    ) -> Box<dyn ValueCell>;

    /// Parse `raw` on a scratch cell seeded with `value`.
    fn parse_scratch(
        raw: &str,
        value: Self::Output,
        config: &Self::Config,
        parse: &ParseConfig,
    ) -> std::result::Result<Self::Output, String>;

    fn extract(value: &Value) -> Option<Self::Output>;
}

pub struct SingleKind<T>(PhantomData<T>);
pub struct SliceKind<T>(PhantomData<T>);
pub struct MapKind<T>(PhantomData<T>);

impl<T: Scalar + FromValue> FlagKind for SingleKind<T> {
    type Output = T;
    type Config = T::Config;

    fn type_name() -> String {
        T::TYPE_NAME.to_string()
    }

    fn is_bool() -> bool {
        T::IS_BOOL
    }

    fn accepts_empty() -> bool {
        T::ACCEPTS_EMPTY
    }

    fn zero() -> T {
        T::zero()
    }

    fn format(value: &T, config: &T::Config) -> String {
        value.format(config)
    }

    fn create(
        value: T,
        config: &T::Config,
        destination: Option<Destination<T>>,
        _parse: &ParseConfig,
    ) -> Box<dyn ValueCell> {
        Box::new(ScalarCell::new(value, config.clone(), destination))
    }

    fn parse_scratch(
        raw: &str,
        value: T,
        config: &T::Config,
        _parse: &ParseConfig,
    ) -> std::result::Result<T, String> {
        let mut cell = ScalarCell::detached(value, config.clone());
        cell.set(raw)?;
        Ok(cell.into_inner())
    }

    fn extract(value: &Value) -> Option<T> {
        <T as FromValue>::from_value(value)
    }
}

impl<T: Scalar> FlagKind for SliceKind<T> {
    type Output = Vec<T>;
    type Config = T::Config;

    fn type_name() -> String {
        format!("Vec<{}>", T::TYPE_NAME)
    }

    fn is_bool() -> bool {
        false
    }

    fn accepts_empty() -> bool {
        T::ACCEPTS_EMPTY
    }

    fn zero() -> Vec<T> {
        Vec::new()
    }

    fn format(value: &Vec<T>, config: &T::Config) -> String {
        let parts: Vec<String> = value.iter().map(|v| v.format(config)).collect();
        format!("[{}]", parts.join(", "))
    }

    fn create(
        value: Vec<T>,
        config: &T::Config,
        destination: Option<Destination<Vec<T>>>,
        parse: &ParseConfig,
    ) -> Box<dyn ValueCell> {
        Box::new(SliceCell::new(value, config.clone(), parse.clone(), destination))
    }

    fn parse_scratch(
        raw: &str,
        value: Vec<T>,
        config: &T::Config,
        parse: &ParseConfig,
    ) -> std::result::Result<Vec<T>, String> {
        let mut cell = SliceCell::detached(value, config.clone(), parse.clone());
        cell.set(raw)?;
        Ok(cell.into_inner())
    }

    fn extract(value: &Value) -> Option<Vec<T>> {
        <Vec<T> as FromValue>::from_value(value)
    }
}

impl<T: Scalar> FlagKind for MapKind<T> {
    type Output = BTreeMap<String, T>;
    type Config = T::Config;

    fn type_name() -> String {
        format!("BTreeMap<String, {}>", T::TYPE_NAME)
    }

    fn is_bool() -> bool {
        false
    }

    fn accepts_empty() -> bool {
        false
    }

    fn zero() -> BTreeMap<String, T> {
        BTreeMap::new()
    }

    fn format(value: &BTreeMap<String, T>, config: &T::Config) -> String {
        let parts: Vec<String> = value
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.format(config)))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }

    fn create(
        value: BTreeMap<String, T>,
        config: &T::Config,
        destination: Option<Destination<BTreeMap<String, T>>>,
        parse: &ParseConfig,
    ) -> Box<dyn ValueCell> {
        Box::new(MapCell::new(value, config.clone(), parse.clone(), destination))
    }

    fn parse_scratch(
        raw: &str,
        value: BTreeMap<String, T>,
        config: &T::Config,
        parse: &ParseConfig,
    ) -> std::result::Result<BTreeMap<String, T>, String> {
        let mut cell = MapCell::detached(value, config.clone(), parse.clone());
        cell.set(raw)?;
        Ok(cell.into_inner())
    }

    fn extract(value: &Value) -> Option<BTreeMap<String, T>> {
        <BTreeMap<String, T> as FromValue>::from_value(value)
    }
}

// ============================================================================
// Flag: the object-safe face of every FlagBase<K>
// ============================================================================

/// A freshly applied flag: its cell for this run and whether a value source
/// supplied the initial content.
pub struct Applied {
    pub cell: Box<dyn ValueCell>,
    pub from_source: bool,
}

pub trait Flag {
    fn name(&self) -> &str;

    /// Primary name followed by aliases.
    fn names(&self) -> Vec<&str>;

    fn usage(&self) -> &str;

    fn type_name(&self) -> String;

    fn is_bool(&self) -> bool;

    fn is_required(&self) -> bool;

    fn is_persistent(&self) -> bool;

    fn is_hidden(&self) -> bool;

    fn sources(&self) -> &ValueSourceChain;

    /// The static default, formatted the way the cell would print it.
    fn default_text(&self) -> String;

    fn apply(&self, parse: &ParseConfig) -> Result<Applied>;

    fn has_action(&self) -> bool;

    /// Run the per-flag action with the flag's current value.
    fn run_action(&self, ctx: &Context<'_>, value: &Value) -> Result<()>;
}

pub type FlagAction<T> = Box<dyn Fn(&Context<'_>, &T) -> std::result::Result<(), BoxError>>;

pub struct FlagBase<K: FlagKind> {
    name: String,
    aliases: Vec<String>,
    usage: String,
    value: K::Output,
    destination: Option<Destination<K::Output>>,
    sources: ValueSourceChain,
    required: bool,
    persistent: bool,
    hidden: bool,
    config: K::Config,
    action: Option<FlagAction<K::Output>>,
}

impl<K: FlagKind> FlagBase<K> {
    pub fn new(name: impl Into<String>) -> Self {
        FlagBase {
            name: name.into(),
            aliases: Vec::new(),
            usage: String::new(),
            value: K::zero(),
            destination: None,
            sources: ValueSourceChain::new(),
            required: false,
            persistent: false,
            hidden: false,
            config: K::Config::default(),
            action: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Static default, used when no source supplies a value.
    pub fn value(mut self, value: K::Output) -> Self {
        self.value = value;
        self
    }

    pub fn destination(mut self, destination: Destination<K::Output>) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn sources(mut self, sources: ValueSourceChain) -> Self {
        self.sources = sources;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Make the flag visible (and settable) in every descendant command.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn config(mut self, config: K::Config) -> Self {
        self.config = config;
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Context<'_>, &K::Output) -> std::result::Result<(), BoxError> + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }
}

impl<K: FlagKind> Flag for FlagBase<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn names(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect()
    }

    fn usage(&self) -> &str {
        &self.usage
    }

    fn type_name(&self) -> String {
        K::type_name()
    }

    fn is_bool(&self) -> bool {
        K::is_bool()
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn is_persistent(&self) -> bool {
        self.persistent
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn sources(&self) -> &ValueSourceChain {
        &self.sources
    }

    fn default_text(&self) -> String {
        K::format(&self.value, &self.config)
    }

    fn apply(&self, parse: &ParseConfig) -> Result<Applied> {
        let mut initial = self.value.clone();
        let mut from_source = false;

        if let Some((raw, source)) = self.sources.lookup_with_source() {
            if !raw.is_empty() || K::accepts_empty() {
                initial = K::parse_scratch(&raw, self.value.clone(), &self.config, parse)
                    .map_err(|reason| ParseError {
                        raw: raw.clone(),
                        type_name: K::type_name(),
                        flag: self.name.clone(),
                        origin: Origin::Source(source.describe()),
                        reason,
                    })?;
                from_source = true;
                debug!(flag = %self.name, source = %source.describe(), "value taken from source");
            }
        }

        Ok(Applied {
            cell: K::create(initial, &self.config, self.destination.clone(), parse),
            from_source,
        })
    }

    fn has_action(&self) -> bool {
        self.action.is_some()
    }

    fn run_action(&self, ctx: &Context<'_>, value: &Value) -> Result<()> {
        let Some(action) = &self.action else {
            return Ok(());
        };
        let Some(typed) = K::extract(value) else {
            return Ok(());
        };
        action(ctx, &typed).map_err(Error::from_hook)
    }
}

impl<K: FlagKind> fmt::Debug for FlagBase<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagBase")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("type", &K::type_name())
            .field("value", &self.value)
            .field("sources", &self.sources)
            .field("required", &self.required)
            .field("persistent", &self.persistent)
            .field("hidden", &self.hidden)
            .finish()
    }
}

pub type BoolFlag = FlagBase<SingleKind<bool>>;
pub type IntFlag = FlagBase<SingleKind<i64>>;
pub type UintFlag = FlagBase<SingleKind<u64>>;
pub type FloatFlag = FlagBase<SingleKind<f64>>;
pub type DurationFlag = FlagBase<SingleKind<TimeDelta>>;
pub type TimestampFlag = FlagBase<SingleKind<DateTime<FixedOffset>>>;
pub type StringFlag = FlagBase<SingleKind<String>>;
pub type IntSliceFlag = FlagBase<SliceKind<i64>>;
pub type UintSliceFlag = FlagBase<SliceKind<u64>>;
pub type FloatSliceFlag = FlagBase<SliceKind<f64>>;
pub type DurationSliceFlag = FlagBase<SliceKind<TimeDelta>>;
pub type StringSliceFlag = FlagBase<SliceKind<String>>;
pub type StringMapFlag = FlagBase<MapKind<String>>;

// ============================================================================
// MutuallyExclusiveFlags
// ============================================================================

/// Groups of flags of which at most one group may be used.
///
/// Flags inside one group may be combined freely. With `required`, at least
/// one group must be used.
#[derive(Default)]
pub struct MutuallyExclusiveFlags {
    groups: Vec<Vec<Box<dyn Flag>>>,
    required: bool,
}

impl MutuallyExclusiveFlags {
    pub fn new() -> Self {
        MutuallyExclusiveFlags::default()
    }

    pub fn group(mut self, flags: Vec<Box<dyn Flag>>) -> Self {
        self.groups.push(flags);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn groups(&self) -> &[Vec<Box<dyn Flag>>] {
        &self.groups
    }

    pub fn flags(&self) -> impl Iterator<Item = &dyn Flag> {
        self.groups.iter().flatten().map(|f| f.as_ref())
    }

    pub(crate) fn check(&self, is_set: &dyn Fn(&str) -> bool) -> Result<()> {
        let mut chosen: Option<&str> = None;
        for group in &self.groups {
            let Some(hit) = group.iter().find(|f| is_set(f.name())) else {
                continue;
            };
            match chosen {
                Some(first) => {
                    return Err(Error::MutuallyExclusive {
                        first: first.to_string(),
                        second: hit.name().to_string(),
                    })
                }
                None => chosen = Some(hit.name()),
            }
        }
        if chosen.is_none() && self.required {
            let groups = self
                .groups
                .iter()
                .map(|g| {
                    g.iter()
                        .flat_map(|f| f.names())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            return Err(Error::RequiredGroup(groups));
        }
        Ok(())
    }
}
