//! Per-run flag sets and the command-line flag parser.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::cell::ValueCell;
use crate::error::{Error, Origin, ParseError, Result};
use crate::tree::App;

/// Where a flag is declared inside the command arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlagRef {
    pub node: usize,
    pub slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Own(usize),
    Exclusive { set: usize, group: usize, index: usize },
}

pub(crate) struct Entry {
    pub flag: FlagRef,
    pub name: String,
    pub names: Vec<String>,
    pub type_name: String,
    pub cell: Box<dyn ValueCell>,
    pub visited: bool,
    pub from_source: bool,
    pub action_ran: bool,
}

impl Entry {
    pub fn is_set(&self) -> bool {
        self.visited || self.from_source
    }
}

pub(crate) type SharedEntry = Rc<RefCell<Entry>>;

/// The flags one command sees during one run: its own, plus the persistent
/// flags it inherits (shared with the ancestor that declared them).
pub(crate) struct FlagSet {
    entries: Vec<SharedEntry>,
    by_name: HashMap<String, usize>,
    args: Vec<String>,
}

impl FlagSet {
    /// A set with no flags, stored when a command's flags could not be
    /// applied.
    pub fn empty() -> FlagSet {
        FlagSet {
            entries: Vec::new(),
            by_name: HashMap::new(),
            args: Vec::new(),
        }
    }

    pub fn build(app: &App, session: &Session, node: usize) -> Result<FlagSet> {
        let command = &app.node(node).command;
        let mut set = FlagSet::empty();

        for (flag_ref, flag) in app.local_flags(node) {
            let applied = flag.apply(app.parse_config())?;
            let entry = Entry {
                flag: flag_ref,
                name: flag.name().to_string(),
                names: flag.names().into_iter().map(str::to_string).collect(),
                type_name: flag.type_name(),
                cell: applied.cell,
                visited: false,
                from_source: applied.from_source,
                action_ran: false,
            };
            set.insert(Rc::new(RefCell::new(entry)), &command.name)?;
        }

        for ancestor in app.ancestors(node) {
            let Some(parent_set) = session.flag_set(ancestor) else {
                continue;
            };
            for shared in &parent_set.entries {
                let inherit = {
                    let entry = shared.borrow();
                    entry.flag.node == ancestor
                        && app.flag(entry.flag).is_persistent()
                        && !entry.names.iter().any(|n| set.by_name.contains_key(n))
                };
                if inherit {
                    trace!(
                        flag = %shared.borrow().name,
                        from = %app.node(ancestor).command.name,
                        to = %command.name,
                        "inheriting persistent flag"
                    );
                    set.insert(Rc::clone(shared), &command.name)?;
                }
            }
        }

        Ok(set)
    }

    fn insert(&mut self, entry: SharedEntry, command: &str) -> Result<()> {
        let index = self.entries.len();
        for name in &entry.borrow().names {
            if self.by_name.insert(name.clone(), index).is_some() {
                return Err(Error::DuplicateFlag {
                    command: command.to_string(),
                    name: name.clone(),
                });
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&SharedEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[SharedEntry] {
        &self.entries
    }

    /// Positional arguments left after flag parsing.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn set_args(&mut self, args: Vec<String>) {
        self.args = args;
    }

    fn is_bool_flag(&self, name: &str) -> bool {
        self.lookup(name)
            .map(|e| e.borrow().cell.is_bool())
            .unwrap_or(false)
    }

    /// `-abc` → `-a -b -c` when every letter is a known boolean flag and
    /// `abc` itself is not a flag.
    fn expand_short(&self, body: &str) -> Option<Vec<String>> {
        if body.chars().count() < 2 || self.by_name.contains_key(body) {
            return None;
        }
        let all_bool = body
            .chars()
            .all(|c| self.is_bool_flag(c.encode_utf8(&mut [0; 4])));
        if !all_bool {
            return None;
        }
        Some(body.chars().map(|c| format!("-{}", c)).collect())
    }

    /// Consume flags from the front of `args`; the remainder become the
    /// positional arguments.
    pub fn parse(&mut self, args: &[String], short_options: bool) -> Result<()> {
        let mut queue: VecDeque<String> = args.iter().cloned().collect();

        while let Some(token) = queue.pop_front() {
            if token == "--" {
                break;
            }
            if token.len() < 2 || !token.starts_with('-') {
                queue.push_front(token);
                break;
            }

            let double_dash = token.starts_with("--");
            let body = if double_dash { &token[2..] } else { &token[1..] };
            if body.is_empty() || body.starts_with('-') || body.starts_with('=') {
                return Err(Error::BadFlagSyntax(token));
            }
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };

            if short_options && !double_dash && inline.is_none() {
                if let Some(expanded) = self.expand_short(name) {
                    trace!(token = %token, ?expanded, "expanding short options");
                    for piece in expanded.into_iter().rev() {
                        queue.push_front(piece);
                    }
                    continue;
                }
            }

            let Some(shared) = self.lookup(name).cloned() else {
                return Err(Error::UnknownFlag(name.to_string()));
            };
            let is_bool = shared.borrow().cell.is_bool();
            let raw = match inline {
                Some(value) => value.to_string(),
                None if is_bool => "true".to_string(),
                None => queue
                    .pop_front()
                    .ok_or_else(|| Error::MissingValue(name.to_string()))?,
            };

            let mut entry = shared.borrow_mut();
            if let Err(reason) = entry.cell.set(&raw) {
                return Err(ParseError {
                    raw,
                    type_name: entry.type_name.clone(),
                    flag: name.to_string(),
                    origin: Origin::CommandLine,
                    reason,
                }
                .into());
            }
            entry.visited = true;
            debug!(flag = %entry.name, value = %raw, "flag set from command line");
        }

        self.args = queue.into_iter().collect();
        Ok(())
    }
}

/// State of one `App::run`: the flag set of every command reached so far.
pub(crate) struct Session {
    sets: RefCell<Vec<Option<Rc<FlagSet>>>>,
}

impl Session {
    pub fn new(nodes: usize) -> Self {
        Session {
            sets: RefCell::new(vec![None; nodes]),
        }
    }

    pub fn store(&self, node: usize, set: FlagSet) {
        self.sets.borrow_mut()[node] = Some(Rc::new(set));
    }

    pub fn flag_set(&self, node: usize) -> Option<Rc<FlagSet>> {
        self.sets.borrow().get(node).cloned().flatten()
    }
}
