use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use declarative::Target;
use std::path::PathBuf;

use crate::config::DEFAULT_MANIFEST;

#[derive(Parser)]
#[command(name = "mxform")]
#[command(version)]
#[command(about = "Declarative provisioning for Matrix homeservers", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest declaring users, content and rooms
    #[arg(short, long, global = true, env = "MXFORM_CONFIG", default_value = DEFAULT_MANIFEST)]
    pub config: PathBuf,

    /// State file (default: <manifest>.state.toml beside the manifest)
    #[arg(long, global = true, env = "MXFORM_STATE")]
    pub state: Option<PathBuf>,

    /// Homeserver client-server API base URL
    #[arg(long, global = true, env = "MATRIX_CLIENT_SERVER_URL")]
    pub server_url: Option<String>,

    /// Access token used for media uploads
    #[arg(long, global = true, env = "MATRIX_DEFAULT_ACCESS_TOKEN", hide_env_values = true)]
    pub default_access_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Make the homeserver match the manifest
    Apply(ApplyArgs),

    /// Tear down every recorded resource
    Destroy(DestroyArgs),

    /// Show recorded resources
    Show(ShowArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Limit to a kind or one resource (e.g. `room` or `room.lobby`)
    #[arg(short, long)]
    pub target: Option<Target>,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Limit to a kind or one resource (e.g. `room` or `room.lobby`)
    #[arg(short, long)]
    pub target: Option<Target>,

    /// Show the plan without applying it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct DestroyArgs {
    /// Limit to a kind or one resource (e.g. `room` or `room.lobby`)
    #[arg(short, long)]
    pub target: Option<Target>,

    /// Show the plan without destroying anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Limit to a kind or one resource (e.g. `room` or `room.lobby`)
    #[arg(short, long)]
    pub target: Option<Target>,

    /// Print JSON instead of a listing
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "mxform",
            "-vv",
            "--config",
            "prod.toml",
            "apply",
            "--target",
            "room.lobby",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("prod.toml"));
        match cli.command {
            Command::Apply(args) => {
                assert!(args.yes);
                assert!(!args.dry_run);
                let target = args.target.unwrap();
                assert_eq!(target.kind.as_deref(), Some("room"));
                assert_eq!(target.label.as_deref(), Some("lobby"));
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_bad_target_is_rejected() {
        assert!(Cli::try_parse_from(["mxform", "plan", "--target", "a.b.c"]).is_err());
    }
}
