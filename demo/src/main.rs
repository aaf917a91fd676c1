mod cli;

use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::command().run(std::env::args()) {
        // Usage errors were already reported together with the help text.
        if !e.is_usage() {
            eprintln!("{}: {}", cli::NAME, e);
        }
        std::process::exit(e.exit_code().unwrap_or(1));
    }
}
