use std::fmt;

/// Error type returned by user hooks (`before`, `action`, `after`, flag actions).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Where a rejected raw value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    CommandLine,
    /// A value source, described the way it describes itself,
    /// e.g. `environment variable "DEBUG"`.
    Source(String),
}

/// A literal that could not be parsed as the flag's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub raw: String,
    pub type_name: String,
    pub flag: String,
    pub origin: Origin,
    pub reason: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Origin::CommandLine => write!(
                f,
                "invalid value {:?} for flag -{}: could not parse as {}: {}",
                self.raw, self.flag, self.type_name, self.reason
            ),
            Origin::Source(source) => write!(
                f,
                "could not parse {:?} as {} value from {} for flag {}: {}",
                self.raw, self.type_name, source, self.flag, self.reason
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// An error that asks the process to terminate with a specific status.
///
/// Return it (boxed) from any hook; the root command's exit handler decides
/// what to do with it. The default handler prints the message to stderr and
/// exits with `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitError {
    message: String,
    code: i32,
}

impl ExitError {
    pub fn new(message: impl Into<String>, code: i32) -> Self {
        ExitError {
            message: message.into(),
            code,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExitError {}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("flag provided but not defined: -{0}")]
    UnknownFlag(String),

    #[error("bad flag syntax: {0}")]
    BadFlagSyntax(String),

    #[error("flag needs an argument: -{0}")]
    MissingValue(String),

    #[error("flag redefined: {name} (command {command:?})")]
    DuplicateFlag { command: String, name: String },

    #[error("command not found: {0:?}")]
    CommandNotFound(String),

    #[error("{}", required_message(.0))]
    RequiredFlags(Vec<String>),

    #[error("option {first} cannot be set along with option {second}")]
    MutuallyExclusive { first: String, second: String },

    #[error("one of these flags needs to be provided: {}", .0.join(", "))]
    RequiredGroup(Vec<String>),

    #[error(transparent)]
    Exit(#[from] ExitError),

    #[error(transparent)]
    Action(BoxError),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<Error>),
}

fn required_message(names: &[String]) -> String {
    let quoted = names.join(", ");
    if names.len() == 1 {
        format!("Required flag {:?} not set", quoted)
    } else {
        format!("Required flags {:?} not set", quoted)
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Convert an error returned by a user hook back into a library error.
    ///
    /// `ExitError`s and library errors (e.g. from `Context::set`) keep their
    /// identity; anything else becomes `Error::Action`.
    pub fn from_hook(err: BoxError) -> Error {
        let err = match err.downcast::<ExitError>() {
            Ok(exit) => return Error::Exit(*exit),
            Err(other) => other,
        };
        match err.downcast::<Error>() {
            Ok(inner) => *inner,
            Err(other) => Error::Action(other),
        }
    }

    /// Combine two errors, flattening nested `Multiple`s.
    pub fn combine(first: Error, second: Error) -> Error {
        let mut errors = Vec::new();
        for e in [first, second] {
            match e {
                Error::Multiple(inner) => errors.extend(inner),
                other => errors.push(other),
            }
        }
        Error::Multiple(errors)
    }

    /// The process exit status carried by this error, if any.
    ///
    /// For combined errors the last exit-tagged error wins.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::Exit(e) => Some(e.code()),
            Error::Multiple(errors) => errors.iter().filter_map(Error::exit_code).last(),
            _ => None,
        }
    }

    /// True for errors caused by malformed input rather than by user code.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::UnknownFlag(_)
                | Error::BadFlagSyntax(_)
                | Error::MissingValue(_)
                | Error::DuplicateFlag { .. }
        )
    }
}

/// Default exit handling: terminate the process for exit-tagged errors.
pub fn handle_exit_coder(err: &Error) {
    let Some(code) = err.exit_code() else {
        return;
    };
    let message = err.to_string();
    if !message.is_empty() {
        eprintln!("{}", message);
    }
    std::process::exit(code);
}
