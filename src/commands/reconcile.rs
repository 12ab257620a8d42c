//! Reconcile commands
//!
//! - `plan` - Refresh recorded resources and show what apply would change
//! - `apply` - Make the homeserver match the manifest
//! - `destroy` - Tear down every recorded resource

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{ExecuteOptions, ExecuteSummary};
use indicatif::ProgressBar;
use matrix_api::HttpBackend;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs, PlanArgs};
use crate::config::{Manifest, ProviderSettings};
use crate::engine::differ::display_plan;
use crate::engine::executor;
use crate::engine::planner::{Lifecycles, plan_apply, plan_teardown};
use crate::progress::{self, ApplyProgress};
use crate::state::MxformState;
use crate::ui;

/// Manifest, state and connection settings for one run
pub struct Workspace {
    pub manifest: Manifest,
    pub base_dir: PathBuf,
    pub state: MxformState,
    pub settings: ProviderSettings,
}

impl Workspace {
    pub fn open(ctx: &Context) -> Result<Self> {
        let manifest = Manifest::load(&ctx.config)?;
        let base_dir = ctx
            .config
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let state = MxformState::load(&state_path(ctx))?;
        let settings = manifest.provider_settings(
            ctx.server_url.as_deref(),
            ctx.default_access_token.as_deref(),
        )?;
        Ok(Self {
            manifest,
            base_dir,
            state,
            settings,
        })
    }

    pub fn connect(&self) -> Result<HttpBackend> {
        matrix_api::connect(&self.settings.client_server_url).with_context(|| {
            format!(
                "Invalid homeserver URL: {}",
                self.settings.client_server_url
            )
        })
    }
}

/// State file to use: `--state`, or the one beside the manifest
pub fn state_path(ctx: &Context) -> PathBuf {
    ctx.state
        .clone()
        .unwrap_or_else(|| MxformState::path_for_manifest(&ctx.config))
}

fn refreshing(ctx: &Context) -> Option<ProgressBar> {
    (!ctx.quiet).then(|| progress::spinner("Refreshing recorded resources..."))
}

fn finish(spinner: Option<ProgressBar>) {
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
}

fn check(summary: &ExecuteSummary) -> Result<()> {
    if !summary.is_success() {
        bail!("{} resource(s) failed", summary.failed);
    }
    Ok(())
}

// ============================================================================
// Plan Command
// ============================================================================

pub fn plan(ctx: &Context, args: PlanArgs) -> Result<()> {
    ui::header("mxform plan");

    let workspace = Workspace::open(ctx)?;
    let declarations = workspace.manifest.declarations(&workspace.base_dir)?;
    let backend = workspace.connect()?;
    let lifecycles = Lifecycles::new(
        &backend,
        workspace.settings.default_access_token.as_deref(),
    );

    let spinner = refreshing(ctx);
    let plan = plan_apply(
        &lifecycles,
        declarations,
        &workspace.state,
        args.target.as_ref(),
    );
    finish(spinner);

    display_plan(&plan?, &lifecycles);
    Ok(())
}

// ============================================================================
// Apply Command
// ============================================================================

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    ui::header("mxform apply");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let mut workspace = Workspace::open(ctx)?;
    let declarations = workspace.manifest.declarations(&workspace.base_dir)?;
    let backend = workspace.connect()?;
    let lifecycles = Lifecycles::new(
        &backend,
        workspace.settings.default_access_token.as_deref(),
    );

    let spinner = refreshing(ctx);
    let plan = plan_apply(
        &lifecycles,
        declarations,
        &workspace.state,
        args.target.as_ref(),
    );
    finish(spinner);

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        yes: args.yes,
    };
    let summary = executor::execute(
        &lifecycles,
        plan?,
        &mut workspace.state,
        &opts,
        &mut ui::PromptConfirm,
        &mut ApplyProgress::new(ctx.quiet),
    )?;
    check(&summary)
}

// ============================================================================
// Destroy Command
// ============================================================================

pub fn destroy(ctx: &Context, args: DestroyArgs) -> Result<()> {
    ui::header("mxform destroy");

    let mut workspace = Workspace::open(ctx)?;
    if workspace.state.is_empty() {
        ui::info(&format!(
            "Nothing recorded in {}",
            workspace.state.path().display()
        ));
        return Ok(());
    }

    let backend = workspace.connect()?;
    let lifecycles = Lifecycles::new(
        &backend,
        workspace.settings.default_access_token.as_deref(),
    );

    let spinner = refreshing(ctx);
    let plan = plan_teardown(&lifecycles, &workspace.state, args.target.as_ref());
    finish(spinner);

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        yes: args.yes,
    };
    let summary = executor::execute(
        &lifecycles,
        plan,
        &mut workspace.state,
        &opts,
        &mut ui::PromptConfirm,
        &mut ApplyProgress::new(ctx.quiet),
    )?;
    check(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context(config: PathBuf) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config,
            state: None,
            server_url: None,
            default_access_token: None,
        }
    }

    #[test]
    fn test_state_path_defaults_beside_manifest() {
        let ctx = context(PathBuf::from("deploy/prod.toml"));
        assert_eq!(state_path(&ctx), PathBuf::from("deploy/prod.state.toml"));

        let ctx = Context {
            state: Some(PathBuf::from("/tmp/other.toml")),
            ..context(PathBuf::from("deploy/prod.toml"))
        };
        assert_eq!(state_path(&ctx), PathBuf::from("/tmp/other.toml"));
    }

    #[test]
    fn test_workspace_open_resolves_settings() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("mxform.toml");
        fs::write(
            &config,
            "[provider]\nclient_server_url = \"https://hs.example\"\n",
        )
        .unwrap();

        let workspace = Workspace::open(&context(config)).unwrap();
        assert_eq!(workspace.settings.client_server_url, "https://hs.example");
        assert_eq!(workspace.base_dir, dir.path());
        assert!(workspace.state.is_empty());
        assert!(workspace.connect().is_ok());
    }

    #[test]
    fn test_workspace_open_requires_manifest() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path().join("missing.toml"));
        assert!(Workspace::open(&ctx).is_err());
    }

    #[test]
    fn test_check_fails_on_failed_resources() {
        assert!(check(&ExecuteSummary::default()).is_ok());
        let summary = ExecuteSummary {
            failed: 2,
            ..ExecuteSummary::default()
        };
        let err = check(&summary).unwrap_err();
        assert_eq!(err.to_string(), "2 resource(s) failed");
    }
}
