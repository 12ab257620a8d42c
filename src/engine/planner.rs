//! Reconcile planning across every resource kind

use crate::config::Declarations;
use crate::resource::account::AccountLifecycle;
use crate::resource::content::ContentLifecycle;
use crate::resource::room::RoomLifecycle;
use crate::state::MxformState;
use anyhow::Result;
use declarative::{
    Action, Lifecycle, PlannedChange, Target, matches_target, plan_destroy, plan_resource,
};
use matrix_api::RemoteClient;
use std::collections::{BTreeMap, BTreeSet};

/// One lifecycle per resource kind, sharing a client
pub struct Lifecycles<'a> {
    pub content: ContentLifecycle<'a>,
    pub users: AccountLifecycle<'a>,
    pub rooms: RoomLifecycle<'a>,
}

impl<'a> Lifecycles<'a> {
    pub fn new(client: &'a dyn RemoteClient, default_access_token: Option<&'a str>) -> Self {
        Self {
            content: ContentLifecycle::new(client, default_access_token),
            users: AccountLifecycle::new(client),
            rooms: RoomLifecycle::new(client),
        }
    }
}

/// Planned changes for every kind, each list ordered by label
pub struct Plan<'a> {
    pub content: Vec<PlannedChange<ContentLifecycle<'a>>>,
    pub users: Vec<PlannedChange<AccountLifecycle<'a>>>,
    pub rooms: Vec<PlannedChange<RoomLifecycle<'a>>>,
}

impl Plan<'_> {
    fn actions(&self) -> impl Iterator<Item = &Action> {
        self.content
            .iter()
            .map(|c| &c.action)
            .chain(self.users.iter().map(|c| &c.action))
            .chain(self.rooms.iter().map(|c| &c.action))
    }

    /// Number of resources that would change
    pub fn change_count(&self) -> usize {
        self.actions().filter(|a| a.is_change()).count()
    }

    /// Number of resources whose existence could not be checked
    pub fn unverified_count(&self) -> usize {
        self.actions()
            .filter(|a| matches!(a, Action::Unverified { .. }))
            .count()
    }
}

/// Plan an apply: every declared or recorded resource matching `target`
pub fn plan_apply<'a>(
    lifecycles: &Lifecycles<'a>,
    declarations: Declarations,
    state: &MxformState,
    target: Option<&Target>,
) -> Result<Plan<'a>> {
    Ok(Plan {
        content: plan_kind(
            &lifecycles.content,
            declarations.content,
            &state.content,
            target,
        )?,
        users: plan_kind(&lifecycles.users, declarations.users, &state.users, target)?,
        rooms: plan_kind(&lifecycles.rooms, declarations.rooms, &state.rooms, target)?,
    })
}

/// Plan a destroy: every recorded resource matching `target`
pub fn plan_teardown<'a>(
    lifecycles: &Lifecycles<'a>,
    state: &MxformState,
    target: Option<&Target>,
) -> Plan<'a> {
    Plan {
        content: destroy_kind(&lifecycles.content, &state.content, target),
        users: destroy_kind(&lifecycles.users, &state.users, target),
        rooms: destroy_kind(&lifecycles.rooms, &state.rooms, target),
    }
}

fn plan_kind<L: Lifecycle>(
    lifecycle: &L,
    mut declared: BTreeMap<String, L::Desired>,
    recorded: &BTreeMap<String, L::Record>,
    target: Option<&Target>,
) -> Result<Vec<PlannedChange<L>>> {
    let labels: BTreeSet<String> = declared.keys().chain(recorded.keys()).cloned().collect();

    let mut planned = Vec::new();
    for label in labels {
        if !matches_target(target, lifecycle.kind(), &label) {
            continue;
        }
        let desired = declared.remove(&label);
        let record = recorded.get(&label).cloned();
        planned.push(plan_resource(lifecycle, &label, desired, record)?);
    }
    log::debug!("Planned {} {} resource(s)", planned.len(), lifecycle.kind());
    Ok(planned)
}

fn destroy_kind<L: Lifecycle>(
    lifecycle: &L,
    recorded: &BTreeMap<String, L::Record>,
    target: Option<&Target>,
) -> Vec<PlannedChange<L>> {
    recorded
        .iter()
        .filter(|(label, _)| matches_target(target, lifecycle.kind(), label))
        .map(|(label, record)| plan_destroy(lifecycle, label, record.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::content::{ContentRecord, DesiredContent};
    use crate::resource::room::RoomRecord;
    use matrix_api::backend::Reply;
    use matrix_api::{ApiPath, Method, MockBackend};
    use serde_json::json;
    use std::path::Path;

    fn existing_content(media_id: &str) -> DesiredContent {
        DesiredContent::Existing {
            origin: "hs.example".into(),
            media_id: media_id.into(),
        }
    }

    fn content_record(media_id: &str) -> ContentRecord {
        ContentRecord {
            mxc: format!("mxc://hs.example/{media_id}"),
            origin: "hs.example".into(),
            media_id: media_id.into(),
            ..ContentRecord::default()
        }
    }

    #[test]
    fn test_fresh_declarations_plan_creates_without_remote_calls() {
        let mock = MockBackend::new();
        let lifecycles = Lifecycles::new(&mock, None);
        let mut declarations = Declarations::default();
        declarations
            .content
            .insert("logo".into(), existing_content("logo"));

        let plan = plan_apply(
            &lifecycles,
            declarations,
            &MxformState::new(Path::new("unused.toml")),
            None,
        )
        .unwrap();

        assert_eq!(plan.content.len(), 1);
        assert_eq!(plan.content[0].action, Action::Create { reason: None });
        assert_eq!(plan.change_count(), 1);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_recorded_and_declared_labels_are_merged() {
        let mock = MockBackend::new();
        mock.add_media("hs.example", "kept", vec![1]);
        mock.add_media("hs.example", "dropped", vec![1]);
        let lifecycles = Lifecycles::new(&mock, None);

        let mut state = MxformState::new(Path::new("unused.toml"));
        state.content.insert("kept".into(), content_record("kept"));
        state
            .content
            .insert("dropped".into(), content_record("dropped"));
        state
            .content
            .insert("vanished".into(), content_record("vanished"));

        let mut declarations = Declarations::default();
        declarations
            .content
            .insert("kept".into(), existing_content("kept"));

        let plan = plan_apply(&lifecycles, declarations, &state, None).unwrap();
        let actions: Vec<(&str, &Action)> = plan
            .content
            .iter()
            .map(|c| (c.label.as_str(), &c.action))
            .collect();

        assert_eq!(actions[0], ("dropped", &Action::Delete));
        assert_eq!(actions[1], ("kept", &Action::NoChange));
        assert!(matches!(actions[2], ("vanished", Action::Forget { .. })));
        assert_eq!(plan.change_count(), 2);
    }

    #[test]
    fn test_target_limits_planning() {
        let mock = MockBackend::new();
        let lifecycles = Lifecycles::new(&mock, None);
        let mut declarations = Declarations::default();
        declarations.content.insert("a".into(), existing_content("a"));
        declarations.content.insert("b".into(), existing_content("b"));

        let target: Target = "content.b".parse().unwrap();
        let plan = plan_apply(
            &lifecycles,
            declarations,
            &MxformState::new(Path::new("unused.toml")),
            Some(&target),
        )
        .unwrap();

        assert_eq!(plan.content.len(), 1);
        assert_eq!(plan.content[0].label, "b");
    }

    #[test]
    fn test_unverified_room_is_counted_but_not_changed() {
        let mock = MockBackend::new();
        mock.script(
            Method::Get,
            &ApiPath::client(["account", "whoami"]),
            Reply::Timeout,
        );
        let lifecycles = Lifecycles::new(&mock, None);

        let mut state = MxformState::new(Path::new("unused.toml"));
        state.rooms.insert(
            "lobby".into(),
            RoomRecord {
                room_id: "!lobby:hs.example".into(),
                member_access_token: "tok".into(),
                ..RoomRecord::default()
            },
        );

        let plan = plan_apply(&lifecycles, Declarations::default(), &state, None).unwrap();
        assert_eq!(plan.unverified_count(), 1);
        assert_eq!(plan.change_count(), 0);
    }

    #[test]
    fn test_teardown_plans_every_record() {
        let mock = MockBackend::new();
        mock.add_media("hs.example", "logo", vec![1]);
        mock.reply(
            Method::Get,
            &ApiPath::client(["account", "whoami"]),
            json!({"user_id": "@alice:hs.example"}),
        );
        mock.reply(
            Method::Get,
            &ApiPath::client([
                "rooms",
                "!lobby:hs.example",
                "state",
                "m.room.member",
                "@alice:hs.example",
            ]),
            json!({"membership": "join"}),
        );
        let lifecycles = Lifecycles::new(&mock, None);

        let mut state = MxformState::new(Path::new("unused.toml"));
        state.content.insert("logo".into(), content_record("logo"));
        state.rooms.insert(
            "lobby".into(),
            RoomRecord {
                room_id: "!lobby:hs.example".into(),
                member_access_token: "tok".into(),
                ..RoomRecord::default()
            },
        );

        let plan = plan_teardown(&lifecycles, &state, None);
        assert_eq!(plan.content[0].action, Action::Delete);
        assert_eq!(plan.rooms[0].action, Action::Delete);
        assert!(plan.users.is_empty());

        let target: Target = "room".parse().unwrap();
        let plan = plan_teardown(&lifecycles, &state, Some(&target));
        assert!(plan.content.is_empty());
        assert_eq!(plan.rooms.len(), 1);
    }
}
