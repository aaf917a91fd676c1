//! Declarative command trees with typed flags.
//!
//! - `Command` declares a node: flags, subcommands and hooks
//! - `FlagBase<K>` aliases (`BoolFlag`, `IntSliceFlag`, `StringMapFlag`, ...)
//!   declare typed flags with defaults, destinations and value sources
//! - `App` flattens the tree once and runs it against an argument list
//! - `Context` gives hooks typed access to parsed values
//!
//! Values are resolved in precedence order: command line, then the flag's
//! value sources (environment variables, files, custom sources), then the
//! static default.

pub mod cell;
pub mod command;
pub mod context;
pub mod duration;
pub mod error;
pub mod flag;
mod flagset;
pub mod source;
pub mod tree;
pub mod value;

pub use cell::{Destination, ParseConfig, ValueCell, SERIALIZED_PREFIX};
pub use command::{Command, SharedWriter};
pub use context::Context;
pub use error::{handle_exit_coder, BoxError, Error, ExitError, Origin, ParseError, Result};
pub use flag::{
    BoolFlag, DurationFlag, DurationSliceFlag, Flag, FlagBase, FlagKind, FloatFlag,
    FloatSliceFlag, IntFlag, IntSliceFlag, MapKind, MutuallyExclusiveFlags, SingleKind,
    SliceKind, StringFlag, StringMapFlag, StringSliceFlag, TimestampFlag, UintFlag,
    UintSliceFlag,
};
pub use source::{env_vars, files, EnvVar, File, ValueSource, ValueSourceChain};
pub use tree::App;
pub use value::{
    BoolConfig, FromValue, IntegerConfig, Scalar, StringConfig, TimestampConfig, Value,
};
