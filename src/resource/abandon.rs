//! Room teardown
//!
//! Rooms cannot be deleted, so deleting one quarantines it instead: aliases
//! are unpublished, the door is locked, everyone else is removed and the
//! caller leaves and forgets the room. Message history is left as is.
//!
//! The sequence is a step-indexed machine. Progress is reported back after
//! every completed step so a failed teardown can be resumed later. Until the
//! caller has left, a resumed teardown replays every step from the start:
//! the lockout steps are safe to repeat and the room may have been reopened
//! since. Once the caller has left, only identity resolution and the
//! remaining steps run.

use super::error::{Error, Result};
use super::{state_path, whoami};
use matrix_api::types::{
    AliasesContent, GuestAccessContent, JOIN_RULE_INVITE, JoinRulesContent, KickRequest,
    MembersResponse, event_type, guest_access, membership,
};
use matrix_api::{ApiPath, Method, RemoteClient, RemoteClientExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Reason attached to every kick.
pub const KICK_REASON: &str = "This room is being deleted by its provisioner";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonStep {
    ResolveIdentity,
    FetchAliases,
    RemoveAliases,
    RestrictJoinRule,
    ForbidGuests,
    KickMembers,
    Leave,
    Forget,
}

impl AbandonStep {
    pub const ALL: [Self; 8] = [
        Self::ResolveIdentity,
        Self::FetchAliases,
        Self::RemoveAliases,
        Self::RestrictJoinRule,
        Self::ForbidGuests,
        Self::KickMembers,
        Self::Leave,
        Self::Forget,
    ];

    /// One-based position in the sequence
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ResolveIdentity => "resolve identity",
            Self::FetchAliases => "fetch aliases",
            Self::RemoveAliases => "remove aliases",
            Self::RestrictJoinRule => "restrict join rule",
            Self::ForbidGuests => "forbid guests",
            Self::KickMembers => "kick members",
            Self::Leave => "leave",
            Self::Forget => "forget",
        }
    }

    /// Whether a teardown that already completed `last_completed` must run this step
    fn pending(self, last_completed: Option<Self>) -> bool {
        match last_completed {
            Some(done) if done >= Self::Leave => self == Self::ResolveIdentity || self > done,
            _ => true,
        }
    }
}

impl fmt::Display for AbandonStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.label())
    }
}

/// Server name of a user id: `@local:host` gives `host`, `@local:host:port` gives `host:port`.
pub fn home_domain(user_id: &str) -> Result<String> {
    let malformed = || Error::MalformedUserId(user_id.to_string());
    let parts: Vec<&str> = user_id.split(':').collect();
    match parts.as_slice() {
        [local, host] if !local.is_empty() && !host.is_empty() => Ok((*host).to_string()),
        [local, host, port] if !local.is_empty() && !host.is_empty() && !port.is_empty() => {
            Ok(format!("{host}:{port}"))
        }
        _ => Err(malformed()),
    }
}

/// Data carried between steps
#[derive(Debug, Default)]
struct Teardown {
    user_id: String,
    domain: String,
    aliases: Vec<String>,
}

/// Quarantines one room on behalf of one member
pub struct Abandonment<'a> {
    client: &'a dyn RemoteClient,
    room_id: &'a str,
    access_token: &'a str,
}

impl<'a> Abandonment<'a> {
    pub fn new(client: &'a dyn RemoteClient, room_id: &'a str, access_token: &'a str) -> Self {
        Self {
            client,
            room_id,
            access_token,
        }
    }

    /// Run every pending step, recording each completed one in `progress`
    ///
    /// On failure `progress` holds the last completed step and the error
    /// names the step that failed.
    pub fn run(&self, progress: &mut Option<AbandonStep>) -> Result<()> {
        let resume_from = *progress;
        if let Some(done) = resume_from {
            log::info!("Resuming teardown of {} after {done}", self.room_id);
        }

        let mut teardown = Teardown::default();
        for step in AbandonStep::ALL {
            if !step.pending(resume_from) {
                log::debug!("Skipping completed {step}");
                continue;
            }
            log::debug!("Room {}: {step}", self.room_id);
            self.run_step(step, &mut teardown)
                .map_err(|source| Error::Abandonment {
                    step,
                    last_completed: *progress,
                    source: Box::new(source),
                })?;
            if progress.is_none_or(|done| step > done) {
                *progress = Some(step);
            }
        }
        Ok(())
    }

    fn run_step(&self, step: AbandonStep, teardown: &mut Teardown) -> Result<()> {
        match step {
            AbandonStep::ResolveIdentity => {
                teardown.user_id = whoami(self.client, self.access_token)?;
                teardown.domain = home_domain(&teardown.user_id)?;
            }
            AbandonStep::FetchAliases => teardown.aliases = self.fetch_aliases(&teardown.domain)?,
            AbandonStep::RemoveAliases => {
                for alias in &teardown.aliases {
                    log::debug!("Deleting room alias {alias}");
                    self.client.send_unit(
                        Method::Delete,
                        &ApiPath::client(["directory", "room", alias.as_str()]),
                        None,
                        Some(self.access_token),
                    )?;
                }
            }
            AbandonStep::RestrictJoinRule => self.put_state(
                event_type::JOIN_RULES,
                &JoinRulesContent {
                    rule: JOIN_RULE_INVITE.to_string(),
                },
            )?,
            AbandonStep::ForbidGuests => self.put_state(
                event_type::GUEST_ACCESS,
                &GuestAccessContent {
                    policy: guest_access::FORBIDDEN.to_string(),
                },
            )?,
            AbandonStep::KickMembers => self.kick_members(&teardown.user_id)?,
            AbandonStep::Leave => self.post_room("leave")?,
            AbandonStep::Forget => self.post_room("forget")?,
        }
        Ok(())
    }

    fn fetch_aliases(&self, domain: &str) -> Result<Vec<String>> {
        let path = state_path(self.room_id, event_type::ALIASES, domain);
        match self
            .client
            .get_json::<AliasesContent>(&path, Some(self.access_token))
        {
            Ok(content) => Ok(content.aliases),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn put_state<C: Serialize>(&self, kind: &str, content: &C) -> Result<()> {
        let body = serde_json::to_value(content).map_err(matrix_api::Error::from)?;
        self.client.send_unit(
            Method::Put,
            &state_path(self.room_id, kind, ""),
            Some(&body),
            Some(self.access_token),
        )?;
        Ok(())
    }

    fn post_room(&self, action: &str) -> Result<()> {
        self.client.send_unit(
            Method::Post,
            &ApiPath::client(["rooms", self.room_id, action]),
            Some(&json!({})),
            Some(self.access_token),
        )?;
        Ok(())
    }

    /// Kick every invited or joined member except the caller
    ///
    /// The whole member list is checked before the first kick, so a member
    /// event without content fails the step with nobody kicked.
    fn kick_members(&self, own_user_id: &str) -> Result<()> {
        let members: MembersResponse = self.client.get_json(
            &ApiPath::client(["rooms", self.room_id, "members"]),
            Some(self.access_token),
        )?;

        let mut targets = Vec::new();
        for event in &members.chunk {
            let Some(content) = &event.content else {
                return Err(Error::MalformedMemberEvent {
                    user_id: event.state_key.clone(),
                });
            };
            if event.state_key == own_user_id {
                continue;
            }
            if content.membership == membership::INVITE || content.membership == membership::JOIN {
                targets.push(event.state_key.as_str());
            }
        }

        let path = ApiPath::client(["rooms", self.room_id, "kick"]);
        for user_id in targets {
            log::debug!("Kicking {user_id} from {}", self.room_id);
            let request = KickRequest {
                user_id: user_id.to_string(),
                reason: KICK_REASON.to_string(),
            };
            let body = serde_json::to_value(&request).map_err(matrix_api::Error::from)?;
            self.client
                .send_unit(Method::Post, &path, Some(&body), Some(self.access_token))?;
        }
        Ok(())
    }
}
