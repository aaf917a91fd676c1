//! Command tree of the demo: a note taker that echoes what it parsed.

use std::io::Write;

use tracing::debug;

use argtree::{
    duration, env_vars, BoolFlag, BoxError, Command, Context, DurationFlag, ExitError, IntFlag,
    StringMapFlag, StringSliceFlag, TimestampConfig, TimestampFlag, UintFlag,
};

pub const NAME: &str = "argtree-demo";

const DUE_LAYOUT: &str = "%Y-%m-%d";

pub fn command() -> Command {
    Command::new(NAME)
        .usage("keep short notes")
        .version(env!("CARGO_PKG_VERSION"))
        .use_short_option_handling()
        .default_command("list")
        .flag(
            BoolFlag::new("verbose")
                .alias("V")
                .usage("more output, repeatable")
                .persistent(),
        )
        .command(add())
        .command(list())
}

// ============================================================================
// add
// ============================================================================

fn add() -> Command {
    Command::new("add")
        .alias("a")
        .usage("record a note")
        .flag(StringSliceFlag::new("tag").alias("t").usage("label, repeatable"))
        .flag(
            TimestampFlag::new("due")
                .usage("due date (YYYY-MM-DD)")
                .config(TimestampConfig {
                    layouts: vec![DUE_LAYOUT.to_string()],
                    timezone: None,
                }),
        )
        .flag(
            IntFlag::new("priority")
                .alias("p")
                .usage("higher is more urgent")
                .sources(env_vars(["NOTES_PRIORITY"])),
        )
        .flag(StringMapFlag::new("meta").usage("extra key=value pairs"))
        .action(run_add)
}

fn run_add(ctx: &Context<'_>) -> Result<(), BoxError> {
    let text = ctx.args().join(" ");
    if text.trim().is_empty() {
        return Err(ExitError::new("add: note text is empty", 2).into());
    }

    debug!(tags = ctx.string_slice("tag").len(), "adding note");
    let writer = ctx.writer();
    let mut out = writer.borrow_mut();
    writeln!(out, "text={}", text)?;
    writeln!(out, "tags={}", ctx.string_slice("tag").join(","))?;
    match ctx.timestamp("due") {
        Some(due) if ctx.is_set("due") => writeln!(out, "due={}", due.format(DUE_LAYOUT))?,
        _ => writeln!(out, "due=none")?,
    }
    writeln!(out, "priority={}", ctx.int("priority"))?;
    for (key, value) in ctx.string_map("meta") {
        writeln!(out, "meta.{}={}", key, value)?;
    }
    writeln!(out, "verbose={}", ctx.count("verbose"))?;
    Ok(())
}

// ============================================================================
// list
// ============================================================================

fn list() -> Command {
    Command::new("list")
        .alias("ls")
        .usage("show recent notes")
        .flag(
            UintFlag::new("limit")
                .alias("n")
                .usage("how many notes")
                .value(10),
        )
        .flag(DurationFlag::new("since").usage("only notes newer than this"))
        .action(run_list)
}

fn run_list(ctx: &Context<'_>) -> Result<(), BoxError> {
    debug!(limit = ctx.uint("limit"), filter = ?ctx.args(), "listing notes");
    let writer = ctx.writer();
    let mut out = writer.borrow_mut();
    writeln!(out, "limit={}", ctx.uint("limit"))?;
    if ctx.is_set("since") {
        writeln!(out, "since={}", duration::format(&ctx.duration("since")))?;
    } else {
        writeln!(out, "since=any")?;
    }
    if !ctx.args().is_empty() {
        writeln!(out, "filter={}", ctx.args().join(" "))?;
    }
    writeln!(out, "verbose={}", ctx.count("verbose"))?;
    Ok(())
}
