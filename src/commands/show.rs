//! `show` - print recorded resources without contacting the homeserver

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::matches_target;
use serde_json::Value;

use crate::Context;
use crate::cli::ShowArgs;
use crate::commands::reconcile::state_path;
use crate::state::MxformState;
use crate::ui;

/// Record fields holding access tokens
const SECRET_FIELDS: [&str; 2] = ["access_token", "member_access_token"];

pub fn run(ctx: &Context, args: ShowArgs) -> Result<()> {
    let state = MxformState::load(&state_path(ctx))?;
    let target = args.target.as_ref();

    if args.json {
        let json = serde_json::to_string_pretty(&redacted(&state, target)?)
            .context("Failed to serialize state")?;
        println!("{json}");
        return Ok(());
    }

    ui::header(&format!("State ({})", state.path().display()));
    if state.is_empty() {
        ui::dim("Nothing recorded yet");
        return Ok(());
    }

    let content: Vec<_> = state
        .content
        .iter()
        .filter(|(label, _)| matches_target(target, "content", label))
        .collect();
    if !content.is_empty() {
        ui::section("Content");
        for (label, record) in content {
            println!("  {} {}", "•".cyan(), format!("content.{label}").bold());
            ui::kv("mxc", &record.mxc);
            if !record.file_path.is_empty() {
                ui::kv("file", &record.file_path);
            }
        }
    }

    let users: Vec<_> = state
        .users
        .iter()
        .filter(|(label, _)| matches_target(target, "user", label))
        .collect();
    if !users.is_empty() {
        ui::section("Users");
        for (label, record) in users {
            println!("  {} {}", "•".cyan(), format!("user.{label}").bold());
            ui::kv("user_id", &record.user_id);
            ui::kv("access_token", ui::redact(&record.access_token));
            if !record.display_name.is_empty() {
                ui::kv("display_name", &record.display_name);
            }
            if !record.avatar_mxc.is_empty() {
                ui::kv("avatar_mxc", &record.avatar_mxc);
            }
        }
    }

    let rooms: Vec<_> = state
        .rooms
        .iter()
        .filter(|(label, _)| matches_target(target, "room", label))
        .collect();
    if !rooms.is_empty() {
        ui::section("Rooms");
        for (label, record) in rooms {
            println!("  {} {}", "•".cyan(), format!("room.{label}").bold());
            ui::kv("room_id", &record.room_id);
            if !record.name.is_empty() {
                ui::kv("name", &record.name);
            }
            if !record.topic.is_empty() {
                ui::kv("topic", &record.topic);
            }
            ui::kv("guests_allowed", &record.guests_allowed.to_string());
            if ctx.verbose > 0 {
                if !record.creator_user_id.is_empty() {
                    ui::kv("creator", &record.creator_user_id);
                }
                if let Some(preset) = &record.preset {
                    ui::kv("preset", preset);
                }
                if !record.invite_user_ids.is_empty() {
                    ui::kv("invited", &record.invite_user_ids.join(", "));
                }
                if let Some(alias) = &record.local_alias_localpart {
                    ui::kv("alias", alias);
                }
            }
            if let Some(step) = record.abandonment {
                ui::kv(
                    "teardown",
                    &format!("interrupted after {step}").yellow().to_string(),
                );
            }
        }
    }

    if !ctx.quiet {
        println!();
        ui::dim(&format!(
            "Last updated {}",
            state.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    Ok(())
}

/// State as JSON, filtered by target, with every token masked
fn redacted(state: &MxformState, target: Option<&declarative::Target>) -> Result<Value> {
    let mut value = serde_json::to_value(state).context("Failed to serialize state")?;
    if let Value::Object(kinds) = &mut value {
        for (field, kind) in [("content", "content"), ("users", "user"), ("rooms", "room")] {
            if let Some(Value::Object(records)) = kinds.get_mut(field) {
                records.retain(|label, _| matches_target(target, kind, label));
                for record in records.values_mut() {
                    mask(record);
                }
            }
        }
    }
    Ok(value)
}

fn mask(record: &mut Value) {
    if let Value::Object(fields) = record {
        for field in SECRET_FIELDS {
            if let Some(Value::String(secret)) = fields.get_mut(field) {
                *secret = ui::redact(secret).to_string();
            }
        }
    }
}
