//! The view a hook gets of the command being run.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, TimeDelta};
use tracing::trace;

use crate::command::{Command, SharedWriter};
use crate::error::{Error, Origin, ParseError, Result};
use crate::flagset::{Session, SharedEntry};
use crate::tree::App;
use crate::value::{FromValue, Value};

/// A command inside one run: its parsed flags, positional arguments and
/// ancestors.
///
/// Flag lookups search this command first, then each ancestor. Asking for
/// a flag that exists nowhere in the lineage calls the nearest
/// `invalid_flag_access` hook and yields the type's zero value.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    app: &'a App,
    session: &'a Session,
    node: usize,
}

impl<'a> Context<'a> {
    pub(crate) fn new(app: &'a App, session: &'a Session, node: usize) -> Self {
        Context { app, session, node }
    }

    pub(crate) fn node(&self) -> usize {
        self.node
    }

    pub(crate) fn session(&self) -> &'a Session {
        self.session
    }

    pub fn command(&self) -> &'a Command {
        &self.app.node(self.node).command
    }

    pub fn name(&self) -> &'a str {
        &self.command().name
    }

    /// Names from the root down to this command, space separated.
    pub fn full_name(&self) -> String {
        let mut names: Vec<&str> = self.lineage().iter().map(|c| c.name()).collect();
        names.reverse();
        names.join(" ")
    }

    pub fn parent(&self) -> Option<Context<'a>> {
        self.app
            .node(self.node)
            .parent
            .map(|p| Context::new(self.app, self.session, p))
    }

    pub fn root(&self) -> Context<'a> {
        Context::new(self.app, self.session, 0)
    }

    /// This command followed by each ancestor up to the root.
    pub fn lineage(&self) -> Vec<Context<'a>> {
        let mut out = vec![*self];
        let mut current = *self;
        while let Some(parent) = current.parent() {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Visible subcommands of this command.
    pub fn visible_commands(&self) -> Vec<&'a Command> {
        self.app
            .node(self.node)
            .children
            .iter()
            .map(|&c| &self.app.node(c).command)
            .filter(|c| !c.hidden)
            .collect()
    }

    /// Positional arguments left after flag parsing.
    pub fn args(&self) -> Vec<String> {
        self.session
            .flag_set(self.node)
            .map(|set| set.args().to_vec())
            .unwrap_or_default()
    }

    pub fn narg(&self) -> usize {
        self.args().len()
    }

    fn entry(&self, name: &str) -> Option<SharedEntry> {
        self.lineage().iter().find_map(|ctx| {
            ctx.session
                .flag_set(ctx.node)
                .and_then(|set| set.lookup(name).cloned())
        })
    }

    fn invalid_access(&self, name: &str) {
        trace!(flag = %name, command = %self.name(), "lookup of undefined flag");
        let hook = self
            .lineage()
            .into_iter()
            .find_map(|ctx| ctx.command().invalid_flag_access.as_ref());
        if let Some(hook) = hook {
            hook(self, name);
        }
    }

    /// Current value of a flag, untyped.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self.entry(name) {
            Some(entry) => Some(entry.borrow().cell.get()),
            None => {
                self.invalid_access(name);
                None
            }
        }
    }

    /// Current value of a flag as `T`; `None` when the flag is unknown or
    /// holds another kind.
    pub fn get<T: FromValue>(&self, name: &str) -> Option<T> {
        self.value(name).and_then(|v| T::from_value(&v))
    }

    pub fn bool(&self, name: &str) -> bool {
        self.get(name).unwrap_or_default()
    }

    pub fn int(&self, name: &str) -> i64 {
        self.get(name).unwrap_or_default()
    }

    pub fn uint(&self, name: &str) -> u64 {
        self.get(name).unwrap_or_default()
    }

    pub fn float(&self, name: &str) -> f64 {
        self.get(name).unwrap_or_default()
    }

    pub fn duration(&self, name: &str) -> TimeDelta {
        self.get(name).unwrap_or_else(TimeDelta::zero)
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        self.get(name)
    }

    pub fn string(&self, name: &str) -> String {
        self.get(name).unwrap_or_default()
    }

    pub fn int_slice(&self, name: &str) -> Vec<i64> {
        self.get(name).unwrap_or_default()
    }

    pub fn uint_slice(&self, name: &str) -> Vec<u64> {
        self.get(name).unwrap_or_default()
    }

    pub fn float_slice(&self, name: &str) -> Vec<f64> {
        self.get(name).unwrap_or_default()
    }

    pub fn duration_slice(&self, name: &str) -> Vec<TimeDelta> {
        self.get(name).unwrap_or_default()
    }

    pub fn string_slice(&self, name: &str) -> Vec<String> {
        self.get(name).unwrap_or_default()
    }

    pub fn string_map(&self, name: &str) -> BTreeMap<String, String> {
        self.get(name).unwrap_or_default()
    }

    /// How many times a boolean flag occurred on the command line.
    pub fn count(&self, name: &str) -> usize {
        match self.entry(name) {
            Some(entry) => entry.borrow().cell.count(),
            None => {
                self.invalid_access(name);
                0
            }
        }
    }

    /// True when the flag was given on the command line or a value source
    /// supplied it.
    pub fn is_set(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| e.borrow().is_set())
    }

    /// Set a flag as if it had been given on the command line.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        let Some(shared) = self.entry(name) else {
            return Err(Error::UnknownFlag(name.to_string()));
        };
        let mut entry = shared.borrow_mut();
        entry.cell.set(value).map_err(|reason| ParseError {
            raw: value.to_string(),
            type_name: entry.type_name.clone(),
            flag: name.to_string(),
            origin: Origin::CommandLine,
            reason,
        })?;
        entry.visited = true;
        Ok(())
    }

    /// Number of flags of this command given on the command line.
    pub fn num_flags(&self) -> usize {
        self.session.flag_set(self.node).map_or(0, |set| {
            set.entries().iter().filter(|e| e.borrow().visited).count()
        })
    }

    /// Primary names of this command's flags that are set.
    pub fn local_flag_names(&self) -> Vec<String> {
        self.session.flag_set(self.node).map_or_else(Vec::new, |set| {
            set.entries()
                .iter()
                .filter(|e| e.borrow().is_set())
                .map(|e| e.borrow().name.clone())
                .collect()
        })
    }

    /// Every flag name (aliases included) known from the root down to this
    /// command, without duplicates.
    pub fn flag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for ctx in self.lineage().iter().rev() {
            let Some(set) = ctx.session.flag_set(ctx.node) else {
                continue;
            };
            for entry in set.entries() {
                for name in &entry.borrow().names {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }

    /// Output for help and regular messages.
    pub fn writer(&self) -> SharedWriter {
        self.lineage()
            .into_iter()
            .find_map(|ctx| ctx.command().writer.clone())
            .unwrap_or_else(|| self.app.writer())
    }

    /// Output for usage errors.
    pub fn err_writer(&self) -> SharedWriter {
        self.lineage()
            .into_iter()
            .find_map(|ctx| ctx.command().err_writer.clone())
            .unwrap_or_else(|| self.app.err_writer())
    }
}
