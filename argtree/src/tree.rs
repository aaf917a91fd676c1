//! The command tree and the dispatch engine.
//!
//! `App::new` flattens a `Command` and its subcommands into an arena; each
//! node keeps the index of its parent. `App::run` walks the arena one level
//! per call of `run_node`: parse the node's flags, check them, run hooks,
//! then either descend into the selected child or run the node's action.

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::cell::ParseConfig;
use crate::command::{Command, SharedWriter};
use crate::context::Context;
use crate::error::{handle_exit_coder, Error, Result};
use crate::flag::{BoolFlag, Flag};
use crate::flagset::{FlagRef, FlagSet, Session, Slot};

const DEFAULT_ROOT_USAGE: &str = "A new cli application";
const HELP_NAMES: [&str; 2] = ["help", "h"];
const VERSION_NAMES: [&str; 2] = ["version", "v"];

/// Why `dispatch` failed.
enum Failure {
    /// Already seen by the exit handler, or not meant for it.
    Reported(Error),
    /// Raised by a hook of the dispatching command; handled after `after`.
    Hook(Error),
}

pub(crate) struct Node {
    pub command: Command,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub help_flag: bool,
    pub version_flag: bool,
}

/// A built command tree, ready to be run any number of times.
pub struct App {
    nodes: Vec<Node>,
    parse: ParseConfig,
    writer: SharedWriter,
    err_writer: SharedWriter,
}

impl App {
    pub fn new(mut root: Command) -> Result<App> {
        let mut parse = ParseConfig::default();
        if let Some(separator) = &root.slice_flag_separator {
            parse.separator = separator.clone();
        }
        parse.disable_separator = root.disable_slice_flag_separator;
        if root.usage.is_empty() {
            root.usage = DEFAULT_ROOT_USAGE.to_string();
        }

        let mut nodes = Vec::new();
        flatten(&mut nodes, root, None);

        for (index, node) in nodes.iter_mut().enumerate() {
            if !node.command.hide_help {
                node.help_flag = inject_bool(&mut node.command, &HELP_NAMES, "show help");
            }
            let has_version = node.command.version.as_deref().is_some_and(|v| !v.is_empty());
            if index == 0 && has_version {
                node.version_flag = inject_bool(&mut node.command, &VERSION_NAMES, "print the version");
            }
            check_duplicates(&node.command)?;
        }
        debug!(commands = nodes.len(), "command tree built");

        Ok(App {
            nodes,
            parse,
            writer: Rc::new(RefCell::new(io::stdout())),
            err_writer: Rc::new(RefCell::new(io::stderr())),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn parse_config(&self) -> &ParseConfig {
        &self.parse
    }

    pub(crate) fn writer(&self) -> SharedWriter {
        Rc::clone(&self.writer)
    }

    pub(crate) fn err_writer(&self) -> SharedWriter {
        Rc::clone(&self.err_writer)
    }

    /// Parent, grandparent, ... up to the root.
    pub(crate) fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut current = self.nodes[index].parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.nodes[parent].parent;
        }
        out
    }

    /// Own flags followed by the flags of mutually exclusive groups.
    pub(crate) fn local_flags(&self, index: usize) -> Vec<(FlagRef, &dyn Flag)> {
        let command = &self.nodes[index].command;
        let own = command.flags.iter().enumerate().map(|(i, f)| {
            let slot = Slot::Own(i);
            (FlagRef { node: index, slot }, f.as_ref())
        });
        let grouped = command
            .mutually_exclusive_flags
            .iter()
            .enumerate()
            .flat_map(move |(set, exclusive)| {
                exclusive.groups().iter().enumerate().flat_map(move |(group, flags)| {
                    flags.iter().enumerate().map(move |(i, f)| {
                        let slot = Slot::Exclusive { set, group, index: i };
                        (FlagRef { node: index, slot }, f.as_ref())
                    })
                })
            });
        own.chain(grouped).collect()
    }

    pub(crate) fn flag(&self, flag: FlagRef) -> &dyn Flag {
        let command = &self.nodes[flag.node].command;
        match flag.slot {
            Slot::Own(i) => command.flags[i].as_ref(),
            Slot::Exclusive { set, group, index } => {
                command.mutually_exclusive_flags[set].groups()[group][index].as_ref()
            }
        }
    }

    /// Run the tree. `args[0]` is the program name; it names the root
    /// command when the root was declared without a name.
    pub fn run<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = args.into_iter().map(Into::into).collect();
        if self.nodes[0].command.name.is_empty() {
            if let Some(program) = args.first() {
                let base = Path::new(program)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| program.clone());
                self.nodes[0].command.name = base;
            }
        }
        if args.is_empty() {
            args.push(self.nodes[0].command.name.clone());
        }

        let session = Session::new(self.nodes.len());
        self.run_node(&session, 0, &args)
    }

    fn run_node(&self, session: &Session, index: usize, args: &[String]) -> Result<()> {
        let node = &self.nodes[index];
        let command = &node.command;
        let ctx = Context::new(self, session, index);
        debug!(command = %ctx.full_name(), ?args, "running command");

        let tail = args.get(1..).unwrap_or_default();
        let parsed = match FlagSet::build(self, session, index) {
            Ok(mut set) => {
                let parsed = if command.skip_flag_parsing {
                    set.set_args(tail.to_vec());
                    Ok(())
                } else {
                    set.parse(tail, self.short_options(index))
                };
                session.store(index, set);
                parsed
            }
            Err(err) => {
                session.store(index, FlagSet::empty());
                Err(err)
            }
        };
        if let Err(err) = parsed {
            return self.usage_error(&ctx, err);
        }

        if node.help_flag && ctx.bool(HELP_NAMES[0]) {
            self.show_help(&ctx);
            return Ok(());
        }
        if node.version_flag && ctx.bool(VERSION_NAMES[0]) {
            self.show_version(&ctx);
            return Ok(());
        }

        if let Err(err) = self.check_required(&ctx).and_then(|()| self.check_exclusive(&ctx)) {
            debug!(command = %command.name, error = %err, "flag check failed");
            if !command.hide_help {
                self.show_help(&ctx);
            }
            return Err(err);
        }

        if let Some(before) = &command.before {
            trace!(command = %command.name, "running before hook");
            if let Err(e) = before(&ctx) {
                let err = Error::from_hook(e);
                self.handle_exit(&ctx, &err);
                return Err(err);
            }
        }

        // Errors from this command's own hooks reach the exit handler only
        // after `after` has run; errors from a child were handled there.
        let (reported, mut pending) = match self.dispatch(session, &ctx) {
            Ok(()) => (None, None),
            Err(Failure::Reported(err)) => (Some(err), None),
            Err(Failure::Hook(err)) => (None, Some(err)),
        };

        if let Some(after) = &command.after {
            trace!(command = %command.name, "running after hook");
            if let Err(e) = after(&ctx) {
                let err = Error::from_hook(e);
                pending = Some(match pending {
                    Some(first) => Error::combine(first, err),
                    None => err,
                });
            }
        }

        if let Some(err) = &pending {
            self.handle_exit(&ctx, err);
        }
        match (reported, pending) {
            (None, None) => Ok(()),
            (Some(err), None) | (None, Some(err)) => Err(err),
            (Some(first), Some(second)) => Err(Error::combine(first, second)),
        }
    }

    fn dispatch(&self, session: &Session, ctx: &Context<'_>) -> std::result::Result<(), Failure> {
        self.run_flag_actions(ctx).map_err(Failure::Hook)?;

        let positional = ctx.args();
        if let Some((child, child_args)) = self.resolve_child(ctx, &positional) {
            debug!(
                from = %ctx.name(),
                to = %self.nodes[child].command.name,
                "descending into subcommand"
            );
            return self
                .run_node(session, child, &child_args)
                .map_err(Failure::Reported);
        }

        match &ctx.command().action {
            Some(action) => {
                trace!(command = %ctx.name(), "running action");
                action(ctx).map_err(|e| Failure::Hook(Error::from_hook(e)))
            }
            None => self
                .default_action(ctx, &positional)
                .map_err(Failure::Reported),
        }
    }

    fn run_flag_actions(&self, ctx: &Context<'_>) -> Result<()> {
        let Some(set) = ctx_flag_set(ctx) else {
            return Ok(());
        };
        for shared in set.entries() {
            let (flag_ref, value) = {
                let mut entry = shared.borrow_mut();
                if !entry.is_set() || entry.action_ran {
                    continue;
                }
                entry.action_ran = true;
                (entry.flag, entry.cell.get())
            };
            let flag = self.flag(flag_ref);
            if flag.has_action() {
                trace!(flag = %flag.name(), "running flag action");
                flag.run_action(ctx, &value)?;
            }
        }
        Ok(())
    }

    /// Pick the child to descend into, with the arguments it receives
    /// (its own name first).
    fn resolve_child(&self, ctx: &Context<'_>, positional: &[String]) -> Option<(usize, Vec<String>)> {
        let index = ctx.node();
        let Some(token) = positional.first() else {
            if self.nodes[index].parent.is_some() {
                return None;
            }
            let default = self.default_child(index)?;
            debug!(command = %self.nodes[default].command.name, "no arguments; using default command");
            return Some((default, vec![self.nodes[default].command.name.clone()]));
        };

        if let Some(child) = self.find_child(index, token) {
            return Some((child, positional.to_vec()));
        }

        let default = self.default_child(index)?;
        let is_flag_name = ctx.flag_names().iter().any(|n| n == token);
        let names_default_child = self.find_exact(default, token).is_some();
        if !is_flag_name && !names_default_child {
            return None;
        }
        let mut args = Vec::with_capacity(positional.len() + 1);
        args.push(self.nodes[default].command.name.clone());
        args.extend(positional.iter().cloned());
        debug!(token = %token, command = %self.nodes[default].command.name, "falling back to default command");
        Some((default, args))
    }

    fn find_exact(&self, index: usize, token: &str) -> Option<usize> {
        self.nodes[index]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].command.has_name(token))
    }

    fn find_child(&self, index: usize, token: &str) -> Option<usize> {
        if let Some(child) = self.find_exact(index, token) {
            return Some(child);
        }
        if !self.nodes[index].command.prefix_match_commands || token.is_empty() {
            return None;
        }
        let mut matches = self.nodes[index].children.iter().copied().filter(|&c| {
            self.nodes[c]
                .command
                .names()
                .iter()
                .any(|n| n.starts_with(token))
        });
        let first = matches.next()?;
        if matches.next().is_some() {
            trace!(token = %token, "ambiguous command prefix");
            return None;
        }
        Some(first)
    }

    fn default_child(&self, index: usize) -> Option<usize> {
        let name = self.nodes[index].command.default_command.as_deref()?;
        self.find_exact(index, name)
    }

    fn default_action(&self, ctx: &Context<'_>, positional: &[String]) -> Result<()> {
        let has_children = !self.nodes[ctx.node()].children.is_empty();
        if let (Some(token), true) = (positional.first(), has_children) {
            let hook = ctx
                .lineage()
                .into_iter()
                .find_map(|c| c.command().command_not_found.as_ref());
            return match hook {
                Some(hook) => {
                    hook(ctx, token);
                    Ok(())
                }
                None => Err(Error::CommandNotFound(token.clone())),
            };
        }
        self.show_help(ctx);
        Ok(())
    }

    fn short_options(&self, index: usize) -> bool {
        std::iter::once(index)
            .chain(self.ancestors(index))
            .any(|i| self.nodes[i].command.use_short_option_handling)
    }

    fn check_required(&self, ctx: &Context<'_>) -> Result<()> {
        let command = ctx.command();
        let missing: Vec<String> = command
            .flags
            .iter()
            .filter(|f| f.is_required())
            .filter(|f| !f.names().iter().any(|n| ctx.is_set(n)))
            .map(|f| f.name().to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::RequiredFlags(missing))
        }
    }

    fn check_exclusive(&self, ctx: &Context<'_>) -> Result<()> {
        let is_set = |name: &str| ctx.is_set(name);
        for group in &ctx.command().mutually_exclusive_flags {
            group.check(&is_set)?;
        }
        Ok(())
    }

    fn usage_error(&self, ctx: &Context<'_>, err: Error) -> Result<()> {
        let command = ctx.command();
        debug!(command = %command.name, error = %err, "usage error");
        if let Some(hook) = &command.on_usage_error {
            let is_subcommand = self.nodes[ctx.node()].parent.is_some();
            let result = hook(ctx, err, is_subcommand);
            if let Err(e) = &result {
                self.handle_exit(ctx, e);
            }
            return result;
        }
        let _ = write!(ctx.root().err_writer().borrow_mut(), "Incorrect Usage: {}\n\n", err);
        if !command.hide_help {
            self.show_help(ctx);
        }
        Err(err)
    }

    fn handle_exit(&self, ctx: &Context<'_>, err: &Error) {
        match &self.nodes[0].command.exit_err_handler {
            Some(handler) => handler(ctx, err),
            None => handle_exit_coder(err),
        }
    }

    fn show_help(&self, ctx: &Context<'_>) {
        let printer = ctx
            .lineage()
            .into_iter()
            .find_map(|c| c.command().help_printer.as_ref());
        match printer {
            Some(printer) => printer(ctx),
            None => {
                let text = help_text(ctx);
                let _ = ctx.writer().borrow_mut().write_all(text.as_bytes());
            }
        }
    }

    fn show_version(&self, ctx: &Context<'_>) {
        let version = ctx.command().version.as_deref().unwrap_or_default();
        let _ = writeln!(ctx.writer().borrow_mut(), "{} version {}", ctx.name(), version);
    }
}

fn ctx_flag_set(ctx: &Context<'_>) -> Option<Rc<FlagSet>> {
    ctx.session().flag_set(ctx.node())
}

fn flatten(nodes: &mut Vec<Node>, mut command: Command, parent: Option<usize>) -> usize {
    let children = std::mem::take(&mut command.commands);
    let index = nodes.len();
    nodes.push(Node {
        command,
        parent,
        children: Vec::new(),
        help_flag: false,
        version_flag: false,
    });
    for child in children {
        let child_index = flatten(nodes, child, Some(index));
        nodes[index].children.push(child_index);
    }
    index
}

fn inject_bool(command: &mut Command, names: &[&str; 2], usage: &str) -> bool {
    let taken = |name: &str| command.flags.iter().any(|f| f.names().contains(&name));
    if taken(names[0]) {
        return false;
    }
    let mut flag = BoolFlag::new(names[0]).usage(usage);
    if !taken(names[1]) {
        flag = flag.alias(names[1]);
    }
    command.flags.push(Box::new(flag));
    true
}

fn check_duplicates(command: &Command) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    let grouped = command
        .mutually_exclusive_flags
        .iter()
        .flat_map(|m| m.flags());
    for flag in command.flags.iter().map(|f| f.as_ref()).chain(grouped) {
        for name in flag.names() {
            if seen.contains(&name) {
                return Err(Error::DuplicateFlag {
                    command: command.name.clone(),
                    name: name.to_string(),
                });
            }
            seen.push(name);
        }
    }
    Ok(())
}

fn flag_label(flag: &dyn Flag) -> String {
    let value = if flag.is_bool() { "" } else { " value" };
    flag.names()
        .iter()
        .map(|n| {
            let dashes = if n.chars().count() == 1 { "-" } else { "--" };
            format!("{}{}{}", dashes, n, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Minimal listing of a command, its subcommands and its flags.
fn help_text(ctx: &Context<'_>) -> String {
    let command = ctx.command();
    let mut out = String::new();
    out.push_str("NAME:\n");
    if command.usage.is_empty() {
        out.push_str(&format!("   {}\n", ctx.full_name()));
    } else {
        out.push_str(&format!("   {} - {}\n", ctx.full_name(), command.usage));
    }

    let commands = ctx.visible_commands();
    if !commands.is_empty() {
        out.push_str("\nCOMMANDS:\n");
        let rows: Vec<(String, &str)> = commands
            .iter()
            .map(|c| (c.names().join(", "), c.usage.as_str()))
            .collect();
        push_rows(&mut out, &rows);
    }

    let flags = command.visible_flags();
    if !flags.is_empty() {
        out.push_str("\nOPTIONS:\n");
        let rows: Vec<(String, String)> = flags
            .iter()
            .map(|f| {
                let default = f.default_text();
                let usage = if f.is_bool() || default.is_empty() {
                    f.usage().to_string()
                } else {
                    format!("{} (default: {})", f.usage(), default)
                };
                (flag_label(*f), usage.trim().to_string())
            })
            .collect();
        let rows: Vec<(String, &str)> = rows.iter().map(|(l, u)| (l.clone(), u.as_str())).collect();
        push_rows(&mut out, &rows);
    }
    out
}

fn push_rows(out: &mut String, rows: &[(String, &str)]) {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, text) in rows {
        let line = format!("   {:width$}   {}", label, text, width = width);
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

#[cfg(test)]
mod tests;
