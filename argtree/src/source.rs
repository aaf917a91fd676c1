//! Where a flag's value can come from before the command line is parsed.

use std::fmt;
use std::path::PathBuf;

/// A place a flag's raw value may be found.
pub trait ValueSource {
    /// The raw value, or `None` when this source has nothing to offer.
    fn lookup(&self) -> Option<String>;

    /// Human-readable identifier used in error messages,
    /// e.g. `environment variable "DEBUG"`.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    key: String,
}

impl EnvVar {
    pub fn new(key: impl Into<String>) -> Self {
        EnvVar { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl ValueSource for EnvVar {
    fn lookup(&self) -> Option<String> {
        std::env::var(&self.key).ok().filter(|v| !v.is_empty())
    }

    fn describe(&self) -> String {
        format!("environment variable {:?}", self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        File { path: path.into() }
    }
}

impl ValueSource for File {
    fn lookup(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents.trim().to_string()),
            Err(e) => {
                tracing::trace!(path = %self.path.display(), error = %e, "file source skipped");
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("file {:?}", self.path.display().to_string())
    }
}

/// Ordered list of sources; the first one with a value wins.
#[derive(Default)]
pub struct ValueSourceChain {
    sources: Vec<Box<dyn ValueSource>>,
}

impl ValueSourceChain {
    pub fn new() -> Self {
        ValueSourceChain::default()
    }

    pub fn env(self, key: impl Into<String>) -> Self {
        self.source(EnvVar::new(key))
    }

    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        self.source(File::new(path))
    }

    pub fn source(mut self, source: impl ValueSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn lookup(&self) -> Option<String> {
        self.lookup_with_source().map(|(value, _)| value)
    }

    /// The first value found, with the source that produced it.
    pub fn lookup_with_source(&self) -> Option<(String, &dyn ValueSource)> {
        self.sources
            .iter()
            .find_map(|s| s.lookup().map(|value| (value, s.as_ref())))
    }

    /// Identifiers of every source, in probe order.
    pub fn describe(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.describe()).collect()
    }
}

impl fmt::Debug for ValueSourceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.describe()).finish()
    }
}

/// Chain of environment variables, probed in order.
pub fn env_vars<I, S>(keys: I) -> ValueSourceChain
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter().fold(ValueSourceChain::new(), |chain, key| chain.env(key))
}

/// Chain of files, probed in order.
pub fn files<I, P>(paths: I) -> ValueSourceChain
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths.into_iter().fold(ValueSourceChain::new(), |chain, path| chain.file(path))
}
