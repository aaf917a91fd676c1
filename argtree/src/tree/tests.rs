use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use chrono::TimeZone;

use super::*;
use crate::error::{BoxError, ExitError};
use crate::flag::{
    BoolFlag, DurationFlag, IntFlag, MutuallyExclusiveFlags, StringFlag, StringSliceFlag,
    TimestampFlag, UintFlag,
};
use crate::source::env_vars;
use crate::value::TimestampConfig;
use crate::Destination;

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

fn sink() -> SharedWriter {
    Rc::new(RefCell::new(io::sink()))
}

fn buffer() -> (Rc<RefCell<Vec<u8>>>, SharedWriter) {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let writer: SharedWriter = buf.clone();
    (buf, writer)
}

fn text(buf: &Rc<RefCell<Vec<u8>>>) -> String {
    String::from_utf8(buf.borrow().clone()).unwrap()
}

fn run(command: Command, args: &[&str]) -> Result<()> {
    command
        .writer(sink())
        .err_writer(sink())
        .run(args.iter().copied())
}

/// Action that logs `label:` followed by the positional arguments.
fn record(
    log: &Log,
    label: &'static str,
) -> impl Fn(&Context<'_>) -> std::result::Result<(), BoxError> + 'static {
    let log = log.clone();
    move |ctx| {
        log.borrow_mut()
            .push(format!("{}:{}", label, ctx.args().join(" ")));
        Ok(())
    }
}

// ── Group 1: dispatch basics ─────────────────────────────────

#[test]
fn action_receives_positional_args() {
    let log = log();
    run(
        Command::new("app").action(record(&log, "app")),
        &["app", "a", "b"],
    )
    .unwrap();
    assert_eq!(entries(&log), vec!["app:a b"]);
}

#[test]
fn subcommands_match_by_name_and_alias() {
    let log = log();
    let tree = || {
        Command::new("app")
            .command(Command::new("remove").alias("rm").action(record(&log, "remove")))
            .command(Command::new("add").action(record(&log, "add")))
    };
    run(tree(), &["app", "rm", "x"]).unwrap();
    run(tree(), &["app", "add", "y", "z"]).unwrap();
    assert_eq!(entries(&log), vec!["remove:x", "add:y z"]);
}

#[test]
fn nested_full_name_and_lineage() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app").command(Command::new("remote").command(
        Command::new("add").action(move |ctx| {
            inner.borrow_mut().push(ctx.full_name());
            let names: Vec<&str> = ctx.lineage().iter().map(|c| c.name()).collect();
            inner.borrow_mut().push(names.join(","));
            inner.borrow_mut().push(ctx.parent().unwrap().name().to_string());
            inner.borrow_mut().push(ctx.root().name().to_string());
            Ok(())
        }),
    ));
    run(tree, &["app", "remote", "add"]).unwrap();
    assert_eq!(
        entries(&log),
        vec!["app remote add", "add,remote,app", "remote", "app"]
    );
}

#[test]
fn root_name_defaults_to_program_basename() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("").action(move |ctx| {
        inner.borrow_mut().push(ctx.name().to_string());
        Ok(())
    });
    run(tree, &["/usr/local/bin/tool"]).unwrap();
    assert_eq!(entries(&log), vec!["tool"]);
}

#[test]
fn repeated_runs_start_fresh() {
    let log = log();
    let inner = log.clone();
    let mut app = App::new(
        Command::new("app")
            .writer(sink())
            .flag(StringSliceFlag::new("tag").value(vec!["none".to_string()]))
            .action(move |ctx| {
                inner.borrow_mut().push(ctx.string_slice("tag").join("+"));
                Ok(())
            }),
    )
    .unwrap();
    app.run(["app", "--tag", "a", "--tag", "b"]).unwrap();
    app.run(["app"]).unwrap();
    app.run(["app", "--tag", "c"]).unwrap();
    assert_eq!(entries(&log), vec!["a+b", "none", "c"]);
}

#[test]
fn skip_flag_parsing_keeps_everything_positional() {
    let log = log();
    let tree = Command::new("app").command(
        Command::new("exec")
            .skip_flag_parsing()
            .action(record(&log, "exec")),
    );
    run(tree, &["app", "exec", "--x", "-y", "--", "z"]).unwrap();
    assert_eq!(entries(&log), vec!["exec:--x -y -- z"]);
}

// ── Group 2: value precedence ────────────────────────────────

#[test]
fn command_line_beats_env_beats_default() {
    std::env::set_var("ARGTREE_TREE_TEST_LEVEL", "7");
    let log = log();
    let tree = |env: &str| {
        let inner = log.clone();
        Command::new("app")
            .flag(IntFlag::new("level").value(1).sources(env_vars([env])))
            .action(move |ctx| {
                inner.borrow_mut().push(ctx.int("level").to_string());
                Ok(())
            })
    };
    run(tree("ARGTREE_TREE_TEST_LEVEL"), &["app"]).unwrap();
    run(tree("ARGTREE_TREE_TEST_LEVEL"), &["app", "--level", "9"]).unwrap();
    run(tree("ARGTREE_TREE_TEST_LEVEL_UNSET"), &["app"]).unwrap();
    assert_eq!(entries(&log), vec!["7", "9", "1"]);
}

#[test]
fn destinations_hold_parsed_values_after_run() {
    let limit = Destination::new(0u64);
    let since = Destination::new(chrono::TimeDelta::zero());
    let tree = Command::new("app")
        .flag(UintFlag::new("limit").value(10).destination(limit.clone()))
        .flag(DurationFlag::new("since").destination(since.clone()));
    run(tree, &["app", "--since", "1h30m"]).unwrap();
    assert_eq!(limit.get(), 10);
    assert_eq!(since.get(), chrono::TimeDelta::minutes(90));
}

#[test]
fn timestamp_flag_uses_layouts() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .flag(TimestampFlag::new("due").config(TimestampConfig {
            layouts: vec!["%Y-%m-%d".to_string()],
            timezone: None,
        }))
        .action(move |ctx| {
            let due = ctx.timestamp("due").unwrap();
            let expected = chrono::Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap();
            inner.borrow_mut().push((due == expected.fixed_offset()).to_string());
            Ok(())
        });
    run(tree, &["app", "--due", "2024-05-17"]).unwrap();
    assert_eq!(entries(&log), vec!["true"]);
}

#[test]
fn env_parse_error_stops_the_run() {
    std::env::set_var("ARGTREE_TREE_TEST_BAD_BOOL", "maybe");
    let log = log();
    let tree = Command::new("app")
        .flag(BoolFlag::new("debug").sources(env_vars(["ARGTREE_TREE_TEST_BAD_BOOL"])))
        .action(record(&log, "app"));
    let err = run(tree, &["app"]).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert!(entries(&log).is_empty());
}

// ── Group 3: persistent flags ────────────────────────────────

#[test]
fn persistent_flag_visible_and_settable_in_child() {
    let log = log();
    let child_log = log.clone();
    let after_log = log.clone();
    let tree = Command::new("app")
        .flag(
            StringFlag::new("config")
                .alias("c")
                .persistent()
                .value("default.toml".to_string()),
        )
        .command(Command::new("sync").action(move |ctx| {
            child_log.borrow_mut().push(ctx.string("config"));
            ctx.set("config", "from-child")?;
            Ok(())
        }))
        .after(move |ctx| {
            after_log.borrow_mut().push(ctx.string("config"));
            Ok(())
        });
    run(tree, &["app", "sync", "-c", "x.toml"]).unwrap();
    assert_eq!(entries(&log), vec!["x.toml", "from-child"]);
}

#[test]
fn non_persistent_flag_is_not_inherited() {
    let tree = Command::new("app")
        .flag(BoolFlag::new("local"))
        .command(Command::new("sync"));
    let err = run(tree, &["app", "sync", "--local"]).unwrap_err();
    assert!(matches!(err, Error::UnknownFlag(name) if name == "local"));
}

#[test]
fn local_flag_shadows_persistent_one() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .flag(StringFlag::new("config").persistent())
        .command(
            Command::new("sync")
                .flag(IntFlag::new("config"))
                .action(move |ctx| {
                    inner.borrow_mut().push(ctx.int("config").to_string());
                    inner.borrow_mut().push(ctx.root().string("config"));
                    Ok(())
                }),
        );
    run(tree, &["app", "--config", "a.toml", "sync", "--config", "5"]).unwrap();
    assert_eq!(entries(&log), vec!["5", "a.toml"]);
}

#[test]
fn countable_bool_counts_across_levels_and_names() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .flag(BoolFlag::new("verbose").alias("V").persistent())
        .command(Command::new("sync").action(move |ctx| {
            inner.borrow_mut().push(ctx.count("verbose").to_string());
            inner.borrow_mut().push(ctx.bool("V").to_string());
            Ok(())
        }));
    run(tree, &["app", "-V", "sync", "--verbose", "-V"]).unwrap();
    assert_eq!(entries(&log), vec!["3", "true"]);
}

#[test]
fn count_destination_mirrors_occurrences() {
    let count = Destination::new(0usize);
    let tree = Command::new("app")
        .use_short_option_handling()
        .flag(BoolFlag::new("verbose").alias("v").config(crate::value::BoolConfig {
            count: Some(count.clone()),
        }));
    run(tree, &["app", "-vvv", "--verbose"]).unwrap();
    assert_eq!(count.get(), 4);
}

#[test]
fn short_option_handling_inherited_by_children() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app").use_short_option_handling().command(
        Command::new("ls")
            .flag(BoolFlag::new("a"))
            .flag(BoolFlag::new("l"))
            .action(move |ctx| {
                inner
                    .borrow_mut()
                    .push(format!("{} {}", ctx.bool("a"), ctx.bool("l")));
                Ok(())
            }),
    );
    run(tree, &["app", "ls", "-la"]).unwrap();
    assert_eq!(entries(&log), vec!["true true"]);
}

// ── Group 4: default command ─────────────────────────────────

fn notes(log: &Log) -> Command {
    Command::new("notes")
        .default_command("list")
        .flag(BoolFlag::new("all").persistent())
        .command(
            Command::new("list")
                .action(record(log, "list"))
                .command(Command::new("recent").action(record(log, "recent"))),
        )
        .command(Command::new("add").action(record(log, "add")))
}

#[test]
fn default_command_runs_without_arguments() {
    let log = log();
    run(notes(&log), &["notes"]).unwrap();
    assert_eq!(entries(&log), vec!["list:"]);
}

#[test]
fn default_command_gets_token_once() {
    let log = log();
    run(notes(&log), &["notes", "all", "x"]).unwrap();
    assert_eq!(entries(&log), vec!["list:all x"]);
}

#[test]
fn token_naming_default_child_routes_through_default() {
    let log = log();
    run(notes(&log), &["notes", "recent"]).unwrap();
    assert_eq!(entries(&log), vec!["recent:"]);
}

#[test]
fn unknown_token_is_command_not_found() {
    let log = log();
    let err = run(notes(&log), &["notes", "bogus"]).unwrap_err();
    assert!(matches!(err, Error::CommandNotFound(name) if name == "bogus"));
    assert!(entries(&log).is_empty());
}

#[test]
fn command_not_found_hook_replaces_error() {
    let log = log();
    let inner = log.clone();
    let tree = notes(&log).command_not_found(move |ctx, name| {
        inner
            .borrow_mut()
            .push(format!("{} has no {}", ctx.name(), name));
    });
    run(tree, &["notes", "bogus"]).unwrap();
    assert_eq!(entries(&log), vec!["notes has no bogus"]);
}

// ── Group 5: prefix matching ─────────────────────────────────

fn git(log: &Log) -> Command {
    Command::new("git")
        .prefix_match_commands()
        .command(Command::new("status").action(record(log, "status")))
        .command(Command::new("stash").action(record(log, "stash")))
        .command(Command::new("commit").alias("ci").action(record(log, "commit")))
}

#[test]
fn unique_prefix_selects_command() {
    let log = log();
    run(git(&log), &["git", "com", "-"]).unwrap();
    run(git(&log), &["git", "stat"]).unwrap();
    assert_eq!(entries(&log), vec!["commit:-", "status:"]);
}

#[test]
fn ambiguous_prefix_matches_nothing() {
    let log = log();
    let err = run(git(&log), &["git", "sta"]).unwrap_err();
    assert!(matches!(err, Error::CommandNotFound(_)));
}

#[test]
fn prefix_matching_is_opt_in() {
    let log = log();
    let tree = Command::new("git").command(Command::new("commit").action(record(&log, "commit")));
    assert!(run(tree, &["git", "com"]).is_err());
}

// ── Group 6: required and exclusive flags ────────────────────

#[test]
fn required_flags_reported_together() {
    let tree = Command::new("app")
        .flag(StringFlag::new("user").required())
        .flag(StringFlag::new("token").alias("t").required())
        .flag(StringFlag::new("optional"));
    let err = run(tree, &["app"]).unwrap_err();
    assert_eq!(err.to_string(), "Required flags \"user, token\" not set");
}

#[test]
fn required_flag_satisfied_by_alias_or_env() {
    std::env::set_var("ARGTREE_TREE_TEST_TOKEN", "s3cr3t");
    let tree = Command::new("app")
        .flag(StringFlag::new("user").alias("u").required())
        .flag(
            StringFlag::new("token")
                .required()
                .sources(env_vars(["ARGTREE_TREE_TEST_TOKEN"])),
        );
    run(tree, &["app", "-u", "me"]).unwrap();
}

#[test]
fn exclusive_groups_checked_during_run() {
    let tree = || {
        Command::new("app").mutually_exclusive_flags(
            MutuallyExclusiveFlags::new()
                .group(vec![Box::new(StringFlag::new("json"))])
                .group(vec![Box::new(StringFlag::new("yaml"))])
                .required(),
        )
    };
    let err = run(tree(), &["app", "--json", "a", "--yaml", "b"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "option json cannot be set along with option yaml"
    );
    let err = run(tree(), &["app"]).unwrap_err();
    assert!(matches!(err, Error::RequiredGroup(_)));
    run(tree(), &["app", "--yaml", "b"]).unwrap();
}

// ── Group 7: hooks ───────────────────────────────────────────

#[test]
fn before_action_after_order() {
    let log = log();
    let tree = Command::new("app")
        .before(record(&log, "before"))
        .action(record(&log, "action"))
        .after(record(&log, "after"));
    run(tree, &["app", "x"]).unwrap();
    assert_eq!(entries(&log), vec!["before:x", "action:x", "after:x"]);
}

#[test]
fn failing_before_skips_action_and_after() {
    let log = log();
    let tree = Command::new("app")
        .before(|_| Err("not ready".into()))
        .action(record(&log, "action"))
        .after(record(&log, "after"));
    let err = run(tree, &["app"]).unwrap_err();
    assert_eq!(err.to_string(), "not ready");
    assert!(entries(&log).is_empty());
}

#[test]
fn after_runs_when_action_fails_and_errors_combine() {
    let log = log();
    let after_log = log.clone();
    let tree = Command::new("app")
        .action(|_| Err("action failed".into()))
        .after(move |_| {
            after_log.borrow_mut().push("after".to_string());
            Err("after failed".into())
        });
    let err = run(tree, &["app"]).unwrap_err();
    assert_eq!(entries(&log), vec!["after"]);
    assert!(matches!(&err, Error::Multiple(errors) if errors.len() == 2));
    assert_eq!(err.to_string(), "action failed\nafter failed");
}

#[test]
fn parent_after_runs_after_child_action() {
    let log = log();
    let tree = Command::new("app")
        .before(record(&log, "app-before"))
        .after(record(&log, "app-after"))
        .command(Command::new("sub").action(record(&log, "sub")));
    run(tree, &["app", "sub", "z"]).unwrap();
    assert_eq!(
        entries(&log),
        vec!["app-before:sub z", "sub:z", "app-after:sub z"]
    );
}

#[test]
fn exit_errors_reach_root_handler() {
    let codes = Rc::new(RefCell::new(Vec::new()));
    let seen = codes.clone();
    let tree = Command::new("app")
        .exit_err_handler(move |_, err| seen.borrow_mut().push(err.exit_code()))
        .command(Command::new("sub").action(|_| Err(ExitError::new("bye", 3).into())));
    let err = run(tree, &["app", "sub"]).unwrap_err();
    assert_eq!(err.exit_code(), Some(3));
    assert_eq!(*codes.borrow(), vec![Some(3)]);
}

#[test]
fn after_runs_before_exit_handler() {
    let log = log();
    let handler_log = log.clone();
    let after_log = log.clone();
    let tree = Command::new("app")
        .exit_err_handler(move |_, err| {
            handler_log
                .borrow_mut()
                .push(format!("handler {:?}", err.exit_code()));
        })
        .action(|_| Err(ExitError::new("bye", 3).into()))
        .after(move |_| {
            after_log.borrow_mut().push("after".to_string());
            Ok(())
        });
    let err = run(tree, &["app"]).unwrap_err();
    assert_eq!(err.exit_code(), Some(3));
    assert_eq!(entries(&log), vec!["after", "handler Some(3)"]);
}

#[test]
fn child_error_handled_once_and_parent_after_error_separately() {
    let log = log();
    let handler_log = log.clone();
    let tree = Command::new("app")
        .exit_err_handler(move |_, err| handler_log.borrow_mut().push(err.to_string()))
        .after(|_| Err("parent after".into()))
        .command(Command::new("sub").action(|_| Err("child action".into())));
    let err = run(tree, &["app", "sub"]).unwrap_err();
    assert_eq!(entries(&log), vec!["child action", "parent after"]);
    assert_eq!(err.to_string(), "child action\nparent after");
}

#[test]
fn flag_actions_run_for_inherited_persistent_flags() {
    let log = log();
    let first = log.clone();
    let second = log.clone();
    let tree = Command::new("app")
        .flag(
            IntFlag::new("port")
                .persistent()
                .action(move |_, port| {
                    first.borrow_mut().push(format!("port={}", port));
                    Ok(())
                }),
        )
        .flag(StringFlag::new("host").action(move |_, host| {
            second.borrow_mut().push(format!("host={}", host));
            Ok(())
        }))
        .command(Command::new("serve").action(record(&log, "serve")));
    run(tree, &["app", "serve", "--port", "8080"]).unwrap();
    assert_eq!(entries(&log), vec!["port=8080", "serve:"]);
}

#[test]
fn flag_action_error_propagates() {
    let tree = Command::new("app").flag(IntFlag::new("port").action(|_, port| {
        if *port > 65535 {
            return Err(format!("port {} out of range", port).into());
        }
        Ok(())
    }));
    let err = run(tree, &["app", "--port", "70000"]).unwrap_err();
    assert_eq!(err.to_string(), "port 70000 out of range");
}

// ── Group 8: usage errors ────────────────────────────────────

#[test]
fn usage_error_reported_on_root_err_writer() {
    let (buf, writer) = buffer();
    let err = Command::new("app")
        .writer(sink())
        .err_writer(writer)
        .command(Command::new("sub"))
        .run(["app", "sub", "--nope"])
        .unwrap_err();
    assert!(err.is_usage());
    assert!(text(&buf).starts_with("Incorrect Usage: flag provided but not defined: -nope\n\n"));
}

#[test]
fn on_usage_error_hook_sees_subcommand_flag() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app").command(Command::new("sub").on_usage_error(
        move |ctx, err, is_subcommand| {
            inner
                .borrow_mut()
                .push(format!("{} {} {}", ctx.name(), err, is_subcommand));
            Ok(())
        },
    ));
    run(tree, &["app", "sub", "--depth"]).unwrap();
    assert_eq!(
        entries(&log),
        vec!["sub flag provided but not defined: -depth true"]
    );
}

#[test]
fn bad_source_value_goes_through_usage_error_hook() {
    std::env::set_var("ARGTREE_TREE_TEST_BAD_INT", "abc");
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .flag(IntFlag::new("n").sources(env_vars(["ARGTREE_TREE_TEST_BAD_INT"])))
        .on_usage_error(move |ctx, err, is_subcommand| {
            inner
                .borrow_mut()
                .push(format!("{} {} {}", ctx.name(), matches!(err, Error::Parse(_)), is_subcommand));
            Err(err)
        })
        .action(record(&log, "action"));
    let err = run(tree, &["app"]).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(entries(&log), vec!["app true false"]);
}

#[test]
fn bad_source_value_reported_as_incorrect_usage() {
    std::env::set_var("ARGTREE_TREE_TEST_BAD_UINT", "-1");
    let (buf, writer) = buffer();
    let err = Command::new("app")
        .writer(sink())
        .err_writer(writer)
        .command(
            Command::new("sub")
                .flag(UintFlag::new("limit").sources(env_vars(["ARGTREE_TREE_TEST_BAD_UINT"]))),
        )
        .run(["app", "sub"])
        .unwrap_err();
    assert!(err.is_usage());
    assert!(text(&buf).starts_with(
        "Incorrect Usage: could not parse \"-1\" as u64 value from environment variable \"ARGTREE_TREE_TEST_BAD_UINT\" for flag limit"
    ));
}

#[test]
fn invalid_flag_access_hook_sees_unknown_name() {
    let log = log();
    let hook_log = log.clone();
    let tree = Command::new("app")
        .invalid_flag_access(move |ctx, name| {
            hook_log
                .borrow_mut()
                .push(format!("{} asked for {}", ctx.name(), name));
        })
        .command(Command::new("sub").action(|ctx| {
            assert_eq!(ctx.int("missing"), 0);
            Ok(())
        }));
    run(tree, &["app", "sub"]).unwrap();
    assert_eq!(entries(&log), vec!["sub asked for missing"]);
}

// ── Group 9: help and version ────────────────────────────────

#[test]
fn help_flag_prints_listing() {
    let (buf, writer) = buffer();
    Command::new("app")
        .usage("test app")
        .writer(writer)
        .flag(IntFlag::new("depth").alias("d").usage("how deep").value(2))
        .flag(BoolFlag::new("secret").hidden())
        .command(Command::new("sub").usage("a subcommand"))
        .command(Command::new("internal").hidden())
        .run(["app", "--help"])
        .unwrap();
    let out = text(&buf);
    assert!(out.starts_with("NAME:\n   app - test app\n"));
    assert!(out.contains("sub   a subcommand"));
    assert!(!out.contains("internal"));
    assert!(out.contains("--depth value, -d value   how deep (default: 2)"));
    assert!(out.contains("--help, -h"));
    assert!(!out.contains("secret"));
}

#[test]
fn subcommand_help_uses_full_name() {
    let (buf, writer) = buffer();
    Command::new("app")
        .writer(writer)
        .command(Command::new("sub").usage("does things"))
        .run(["app", "sub", "-h"])
        .unwrap();
    assert!(text(&buf).starts_with("NAME:\n   app sub - does things\n"));
}

#[test]
fn leaf_without_action_prints_help() {
    let (buf, writer) = buffer();
    Command::new("app")
        .writer(writer)
        .command(Command::new("sub"))
        .run(["app", "sub"])
        .unwrap();
    assert!(text(&buf).starts_with("NAME:\n   app sub\n"));
}

#[test]
fn hidden_help_flag_is_unknown() {
    let tree = Command::new("app").hide_help();
    assert!(matches!(
        run(tree, &["app", "--help"]),
        Err(Error::UnknownFlag(_))
    ));
}

#[test]
fn custom_help_printer() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .help_printer(move |ctx| inner.borrow_mut().push(format!("help for {}", ctx.full_name())))
        .command(Command::new("sub"));
    run(tree, &["app", "sub", "--help"]).unwrap();
    assert_eq!(entries(&log), vec!["help for app sub"]);
}

#[test]
fn version_flag_on_root_only() {
    let (buf, writer) = buffer();
    Command::new("app")
        .version("1.2.3")
        .writer(writer)
        .command(Command::new("sub"))
        .run(["app", "-v"])
        .unwrap();
    assert_eq!(text(&buf), "app version 1.2.3\n");

    let err = run(
        Command::new("app").version("1.2.3").command(Command::new("sub")),
        &["app", "sub", "--version"],
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownFlag(_)));
}

#[test]
fn user_flag_named_v_keeps_version_long_form() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .version("0.1.0")
        .flag(BoolFlag::new("verbose").alias("v"))
        .action(move |ctx| {
            inner.borrow_mut().push(ctx.bool("verbose").to_string());
            Ok(())
        });
    run(tree, &["app", "-v"]).unwrap();
    assert_eq!(entries(&log), vec!["true"]);
}

// ── Group 10: context queries ────────────────────────────────

#[test]
fn set_and_names_queries() {
    std::env::set_var("ARGTREE_TREE_TEST_REGION", "eu");
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .flag(BoolFlag::new("debug").alias("d").persistent())
        .command(
            Command::new("deploy")
                .flag(StringFlag::new("region").sources(env_vars(["ARGTREE_TREE_TEST_REGION"])))
                .flag(IntFlag::new("replicas"))
                .flag(StringFlag::new("tag"))
                .action(move |ctx| {
                    let mut out = inner.borrow_mut();
                    out.push(ctx.num_flags().to_string());
                    out.push(ctx.local_flag_names().join(","));
                    out.push(ctx.flag_names().join(","));
                    out.push(format!("{} {}", ctx.is_set("region"), ctx.is_set("tag")));
                    out.push(ctx.narg().to_string());
                    Ok(())
                }),
        );
    run(tree, &["app", "deploy", "--replicas", "3", "-d", "x", "y"]).unwrap();
    assert_eq!(
        entries(&log),
        vec![
            "2",
            "region,replicas,debug",
            "debug,d,help,h,region,replicas,tag",
            "true false",
            "2",
        ]
    );
}

#[test]
fn context_set_rejects_bad_values() {
    let tree = Command::new("app")
        .flag(IntFlag::new("n"))
        .action(|ctx| {
            assert!(ctx.set("n", "x").is_err());
            assert!(matches!(ctx.set("nope", "1"), Err(Error::UnknownFlag(_))));
            ctx.set("n", "4")?;
            assert_eq!(ctx.int("n"), 4);
            assert!(ctx.is_set("n"));
            Ok(())
        });
    run(tree, &["app"]).unwrap();
}

// ── Group 11: collection separator ───────────────────────────

#[test]
fn separator_is_configured_per_app() {
    let log = log();
    let tree = |configure: fn(Command) -> Command| {
        let inner = log.clone();
        configure(
            Command::new("app")
                .flag(StringSliceFlag::new("tag"))
                .action(move |ctx| {
                    inner.borrow_mut().push(ctx.string_slice("tag").join("|"));
                    Ok(())
                }),
        )
    };
    run(tree(|c| c.slice_flag_separator(";")), &["app", "--tag", "a,b;c"]).unwrap();
    run(tree(|c| c.disable_slice_flag_separator()), &["app", "--tag", "a,b"]).unwrap();
    run(tree(|c| c), &["app", "--tag", "a,b"]).unwrap();
    assert_eq!(entries(&log), vec!["a,b|c", "a,b", "a|b"]);
}

#[test]
fn serialized_prefix_survives_disabled_separator() {
    let log = log();
    let inner = log.clone();
    let tree = Command::new("app")
        .disable_slice_flag_separator()
        .flag(StringSliceFlag::new("tag"))
        .action(move |ctx| {
            inner.borrow_mut().push(ctx.string_slice("tag").join("|"));
            Ok(())
        });
    run(tree, &["app", "--tag", "sl:::[\"x,y\",\"z\"]"]).unwrap();
    assert_eq!(entries(&log), vec!["x,y|z"]);
}
