//! Command declarations.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{BoxError, Error, Result};
use crate::flag::{Flag, MutuallyExclusiveFlags};
use crate::tree::App;

pub type SharedWriter = Rc<RefCell<dyn Write>>;

pub type Hook = Box<dyn Fn(&Context<'_>) -> std::result::Result<(), BoxError>>;
pub type UsageErrorHook = Box<dyn Fn(&Context<'_>, Error, bool) -> Result<()>>;
pub type CommandNotFoundHook = Box<dyn Fn(&Context<'_>, &str)>;
pub type InvalidFlagAccessHook = Box<dyn Fn(&Context<'_>, &str)>;
pub type ExitErrHandler = Box<dyn Fn(&Context<'_>, &Error)>;
pub type HelpPrinter = Box<dyn Fn(&Context<'_>)>;

/// A node of the command tree, built with chained setters.
///
/// ```no_run
/// use argtree::{BoolFlag, Command};
///
/// Command::new("greet")
///     .flag(BoolFlag::new("loud").alias("l"))
///     .action(|ctx| {
///         let who = ctx.args().first().cloned().unwrap_or_default();
///         println!("hello {}{}", who, if ctx.bool("loud") { "!" } else { "" });
///         Ok(())
///     })
///     .run(std::env::args())
///     .unwrap();
/// ```
#[derive(Default)]
pub struct Command {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) usage: String,
    pub(crate) version: Option<String>,
    pub(crate) default_command: Option<String>,
    pub(crate) commands: Vec<Command>,
    pub(crate) flags: Vec<Box<dyn Flag>>,
    pub(crate) mutually_exclusive_flags: Vec<MutuallyExclusiveFlags>,
    pub(crate) hide_help: bool,
    pub(crate) hidden: bool,
    pub(crate) use_short_option_handling: bool,
    pub(crate) prefix_match_commands: bool,
    pub(crate) skip_flag_parsing: bool,
    pub(crate) slice_flag_separator: Option<String>,
    pub(crate) disable_slice_flag_separator: bool,
    pub(crate) before: Option<Hook>,
    pub(crate) after: Option<Hook>,
    pub(crate) action: Option<Hook>,
    pub(crate) on_usage_error: Option<UsageErrorHook>,
    pub(crate) command_not_found: Option<CommandNotFoundHook>,
    pub(crate) invalid_flag_access: Option<InvalidFlagAccessHook>,
    pub(crate) exit_err_handler: Option<ExitErrHandler>,
    pub(crate) help_printer: Option<HelpPrinter>,
    pub(crate) writer: Option<SharedWriter>,
    pub(crate) err_writer: Option<SharedWriter>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            ..Command::default()
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

    /// Adds `--version`/`-v` to the root command.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Subcommand run when no other one matches.
    pub fn default_command(mut self, name: impl Into<String>) -> Self {
        self.default_command = Some(name.into());
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn commands(mut self, commands: Vec<Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    pub fn flag(mut self, flag: impl Flag + 'static) -> Self {
        self.flags.push(Box::new(flag));
        self
    }

    pub fn flags(mut self, flags: Vec<Box<dyn Flag>>) -> Self {
        self.flags.extend(flags);
        self
    }

    pub fn mutually_exclusive_flags(mut self, group: MutuallyExclusiveFlags) -> Self {
        self.mutually_exclusive_flags.push(group);
        self
    }

    pub fn hide_help(mut self) -> Self {
        self.hide_help = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Split `-abc` into `-a -b -c` here and in every descendant.
    ///
    /// Every letter must be a boolean flag. Letters may repeat, so `-vvv`
    /// sets `-v` three times and counts 3. A token that is itself a flag
    /// name is never split.
    pub fn use_short_option_handling(mut self) -> Self {
        self.use_short_option_handling = true;
        self
    }

    /// Accept an unambiguous prefix of a subcommand name or alias.
    ///
    /// The prefix selects a subcommand only when exactly one subcommand has
    /// a name or alias starting with it; `st` matches nothing when both
    /// `status` and `stash` exist. Exact names always win.
    pub fn prefix_match_commands(mut self) -> Self {
        self.prefix_match_commands = true;
        self
    }

    /// Treat every argument as positional.
    pub fn skip_flag_parsing(mut self) -> Self {
        self.skip_flag_parsing = true;
        self
    }

    /// Separator for collection flags. Only read on the root command.
    pub fn slice_flag_separator(mut self, separator: impl Into<String>) -> Self {
        self.slice_flag_separator = Some(separator.into());
        self
    }

    /// Keep each collection flag value whole. Only read on the root command.
    pub fn disable_slice_flag_separator(mut self) -> Self {
        self.disable_slice_flag_separator = true;
        self
    }

    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    pub fn action<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context<'_>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.action = Some(Box::new(hook));
        self
    }

    /// Replaces the default "Incorrect Usage" report. The flag is true when
    /// the failing command is a subcommand.
    pub fn on_usage_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context<'_>, Error, bool) -> Result<()> + 'static,
    {
        self.on_usage_error = Some(Box::new(hook));
        self
    }

    pub fn command_not_found<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context<'_>, &str) + 'static,
    {
        self.command_not_found = Some(Box::new(hook));
        self
    }

    pub fn invalid_flag_access<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context<'_>, &str) + 'static,
    {
        self.invalid_flag_access = Some(Box::new(hook));
        self
    }

    /// Called with every hook error. Only read on the root command; without
    /// it, errors carrying an exit code terminate the process.
    pub fn exit_err_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Context<'_>, &Error) + 'static,
    {
        self.exit_err_handler = Some(Box::new(handler));
        self
    }

    pub fn help_printer<F>(mut self, printer: F) -> Self
    where
        F: Fn(&Context<'_>) + 'static,
    {
        self.help_printer = Some(Box::new(printer));
        self
    }

    pub fn writer(mut self, writer: SharedWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn err_writer(mut self, writer: SharedWriter) -> Self {
        self.err_writer = Some(writer);
        self
    }

    // ------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage_text(&self) -> &str {
        &self.usage
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Name followed by aliases.
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect()
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    pub fn visible_flags(&self) -> Vec<&dyn Flag> {
        self.flags
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| !f.is_hidden())
            .collect()
    }

    /// Declared subcommands that are not hidden. Once the command is part
    /// of an `App`, use `Context::visible_commands` instead.
    pub fn visible_commands(&self) -> Vec<&Command> {
        self.commands.iter().filter(|c| !c.hidden).collect()
    }

    /// Build the tree and run it once.
    pub fn run<I, S>(self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        App::new(self)?.run(args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("flags", &self.flags.iter().map(|f| f.name()).collect::<Vec<_>>())
            .field("commands", &self.commands)
            .field("default_command", &self.default_command)
            .finish_non_exhaustive()
    }
}
