mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod resource;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::{Path, PathBuf};

/// Expand a leading `~` in a path argument
fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: PathBuf,
    pub state: Option<PathBuf>,
    pub server_url: Option<String>,
    pub default_access_token: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: expand_path(&cli.config),
        state: cli.state.as_deref().map(expand_path),
        server_url: cli.server_url,
        default_access_token: cli.default_access_token,
    };

    match cli.command {
        Command::Plan(args) => commands::reconcile::plan(&ctx, args),
        Command::Apply(args) => commands::reconcile::apply(&ctx, args),
        Command::Destroy(args) => commands::reconcile::destroy(&ctx, args),
        Command::Show(args) => commands::show::run(&ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "mxform", &mut io::stdout());
            Ok(())
        }
    }
}
