//! Matrix rooms
//!
//! A room is either created with one `createRoom` call carrying its initial
//! state, or adopted by id. Name, avatar, topic and guest access are updated
//! in place one state event at a time; everything fixed at creation forces
//! replacement. Deleting a room runs the [`abandon`](super::abandon) teardown.

use super::abandon::{AbandonStep, Abandonment};
use super::error::{Error, Result};
use super::{Sensitive, state_path, whoami};
use declarative::{ChangeSet, Created, Existence, Lifecycle, Refresh};
use matrix_api::types::{
    CreateContent, CreateRoomRequest, EventIdResponse, GuestAccessContent, MemberContent,
    RoomAvatarContent, RoomIdResponse, RoomNameContent, RoomTopicContent, StateEvent, event_type,
    guest_access, membership,
};
use matrix_api::{ApiPath, Method, RemoteClient, RemoteClientExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Where the room comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSource {
    /// Create a new room
    Create {
        creator_user_id: String,
        preset: Option<String>,
        invite_user_ids: Vec<String>,
        local_alias_localpart: Option<String>,
    },
    /// Adopt a room the member already belongs to
    Existing { room_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRoom {
    /// Token of the member acting on the room
    pub member_access_token: String,
    pub source: RoomSource,
    pub name: Option<String>,
    pub avatar_mxc: Option<String>,
    pub topic: Option<String>,
    pub guests_allowed: Option<bool>,
}

/// Durable room record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: String,
    pub member_access_token: String,
    #[serde(default)]
    pub creator_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invite_user_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_alias_localpart: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar_mxc: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub guests_allowed: bool,
    /// Last completed teardown step of an interrupted delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandonment: Option<AbandonStep>,
}

/// Room attributes as read from state events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedRoomAttributes {
    pub name: String,
    pub avatar_mxc: String,
    pub topic: String,
    pub guests_allowed: bool,
    pub creator_user_id: String,
}

fn guest_policy(allowed: bool) -> GuestAccessContent {
    let policy = if allowed {
        guest_access::CAN_JOIN
    } else {
        guest_access::FORBIDDEN
    };
    GuestAccessContent {
        policy: policy.to_string(),
    }
}

fn sorted(ids: &[String]) -> Vec<String> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids
}

/// Attributes updated in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutableField {
    Name,
    Avatar,
    Topic,
    GuestsAllowed,
}

impl MutableField {
    /// Write order
    const ALL: [Self; 4] = [Self::Name, Self::Avatar, Self::Topic, Self::GuestsAllowed];

    /// Field name used in change sets and errors
    fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Avatar => "avatar_mxc",
            Self::Topic => "topic",
            Self::GuestsAllowed => "guests_allowed",
        }
    }
}

/// Whether the member already left the room during an interrupted teardown
fn left_during_teardown(record: &RoomRecord) -> Option<AbandonStep> {
    record.abandonment.filter(|done| *done >= AbandonStep::Leave)
}

pub struct RoomLifecycle<'a> {
    client: &'a dyn RemoteClient,
}

impl<'a> RoomLifecycle<'a> {
    pub fn new(client: &'a dyn RemoteClient) -> Self {
        Self { client }
    }

    fn create_room(&self, desired: &DesiredRoom) -> Result<RoomRecord> {
        let (creator_user_id, preset, invite_user_ids, local_alias_localpart) = match &desired.source
        {
            RoomSource::Existing { room_id } => {
                log::info!("Adopted room {room_id}");
                return Ok(RoomRecord {
                    room_id: room_id.clone(),
                    member_access_token: desired.member_access_token.clone(),
                    ..RoomRecord::default()
                });
            }
            RoomSource::Create {
                creator_user_id,
                preset,
                invite_user_ids,
                local_alias_localpart,
            } => (creator_user_id, preset, invite_user_ids, local_alias_localpart),
        };

        let mut initial_state = Vec::new();
        if let Some(name) = &desired.name {
            let content = RoomNameContent { name: name.clone() };
            initial_state.push(StateEvent::room_level(event_type::NAME, &content)?);
        }
        if let Some(avatar) = &desired.avatar_mxc {
            let content = RoomAvatarContent {
                avatar_mxc: avatar.clone(),
            };
            initial_state.push(StateEvent::room_level(event_type::AVATAR, &content)?);
        }
        if let Some(topic) = &desired.topic {
            let content = RoomTopicContent {
                topic: topic.clone(),
            };
            initial_state.push(StateEvent::room_level(event_type::TOPIC, &content)?);
        }
        let guests_allowed = desired.guests_allowed.unwrap_or(false);
        initial_state.push(StateEvent::room_level(
            event_type::GUEST_ACCESS,
            &guest_policy(guests_allowed),
        )?);

        let request = CreateRoomRequest {
            preset: preset.clone(),
            alias_localpart: local_alias_localpart.clone(),
            invite_user_ids: invite_user_ids.clone(),
            initial_state,
            is_direct: false,
        };
        log::debug!("Creating room for {creator_user_id}");
        let response: RoomIdResponse = self.client.send_json(
            Method::Post,
            &ApiPath::client(["createRoom"]),
            &request,
            Some(&desired.member_access_token),
        )?;
        log::info!("Created room {}", response.room_id);

        Ok(RoomRecord {
            room_id: response.room_id,
            member_access_token: desired.member_access_token.clone(),
            creator_user_id: creator_user_id.clone(),
            preset: preset.clone(),
            invite_user_ids: invite_user_ids.clone(),
            local_alias_localpart: local_alias_localpart.clone(),
            name: desired.name.clone().unwrap_or_default(),
            avatar_mxc: desired.avatar_mxc.clone().unwrap_or_default(),
            topic: desired.topic.clone().unwrap_or_default(),
            guests_allowed,
            abandonment: None,
        })
    }

    /// Fetch one room-level state event, reading a missing event as its default
    fn state_or_default<C: DeserializeOwned + Default>(
        &self,
        room_id: &str,
        access_token: &str,
        kind: &str,
    ) -> Result<C> {
        match self
            .client
            .get_json(&state_path(room_id, kind, ""), Some(access_token))
        {
            Ok(content) => Ok(content),
            Err(err) if err.is_not_found() => {
                log::debug!("{room_id} has no {kind} event");
                Ok(C::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn observe(&self, room_id: &str, access_token: &str) -> Result<ObservedRoomAttributes> {
        let name: RoomNameContent = self.state_or_default(room_id, access_token, event_type::NAME)?;
        let avatar: RoomAvatarContent =
            self.state_or_default(room_id, access_token, event_type::AVATAR)?;
        let topic: RoomTopicContent =
            self.state_or_default(room_id, access_token, event_type::TOPIC)?;
        let guests: GuestAccessContent =
            self.state_or_default(room_id, access_token, event_type::GUEST_ACCESS)?;
        let create: CreateContent =
            self.state_or_default(room_id, access_token, event_type::CREATE)?;

        Ok(ObservedRoomAttributes {
            name: name.name,
            avatar_mxc: avatar.avatar_mxc,
            topic: topic.topic,
            guests_allowed: guests.policy == guest_access::CAN_JOIN,
            creator_user_id: create.creator_user_id,
        })
    }

    fn put_state<C: Serialize>(
        &self,
        room_id: &str,
        access_token: &str,
        kind: &str,
        content: &C,
    ) -> matrix_api::Result<()> {
        let _: EventIdResponse = self.client.send_json(
            Method::Put,
            &state_path(room_id, kind, ""),
            content,
            Some(access_token),
        )?;
        Ok(())
    }

    fn write_field(
        &self,
        room_id: &str,
        access_token: &str,
        field: MutableField,
        desired: &DesiredRoom,
    ) -> matrix_api::Result<()> {
        match field {
            MutableField::Name => self.put_state(
                room_id,
                access_token,
                event_type::NAME,
                &RoomNameContent {
                    name: desired.name.clone().unwrap_or_default(),
                },
            ),
            MutableField::Avatar => self.put_state(
                room_id,
                access_token,
                event_type::AVATAR,
                &RoomAvatarContent {
                    avatar_mxc: desired.avatar_mxc.clone().unwrap_or_default(),
                },
            ),
            MutableField::Topic => self.put_state(
                room_id,
                access_token,
                event_type::TOPIC,
                &RoomTopicContent {
                    topic: desired.topic.clone().unwrap_or_default(),
                },
            ),
            MutableField::GuestsAllowed => self.put_state(
                room_id,
                access_token,
                event_type::GUEST_ACCESS,
                &guest_policy(desired.guests_allowed.unwrap_or(false)),
            ),
        }
    }

    fn apply_changes(
        &self,
        record: &RoomRecord,
        desired: &DesiredRoom,
        changes: &ChangeSet,
    ) -> Result<RoomRecord> {
        let mut updated = record.clone();
        updated.member_access_token.clone_from(&desired.member_access_token);
        updated.abandonment = None;

        let mut committed = Vec::new();
        for field in MutableField::ALL {
            let name = field.as_str();
            if !changes.contains(name) {
                continue;
            }
            log::debug!("Updating {name} of {}", record.room_id);
            self.write_field(&record.room_id, &updated.member_access_token, field, desired)
                .map_err(|source| Error::RoomFieldUpdate {
                    field: name,
                    committed: committed.clone(),
                    source,
                })?;
            committed.push(name);
        }

        if let Some(name) = &desired.name {
            updated.name.clone_from(name);
        }
        if let Some(avatar) = &desired.avatar_mxc {
            updated.avatar_mxc.clone_from(avatar);
        }
        if let Some(topic) = &desired.topic {
            updated.topic.clone_from(topic);
        }
        if let Some(allowed) = desired.guests_allowed {
            updated.guests_allowed = allowed;
        }
        Ok(updated)
    }
}

impl Lifecycle for RoomLifecycle<'_> {
    type Desired = DesiredRoom;
    type Record = RoomRecord;

    fn kind(&self) -> &'static str {
        "room"
    }

    fn exists(&self, record: &RoomRecord) -> Existence {
        if let Some(done) = left_during_teardown(record) {
            // Membership is already `leave`; only the teardown can finish it.
            log::debug!("{} teardown interrupted after {done}", record.room_id);
            return Existence::Present;
        }
        let user_id = match whoami(self.client, &record.member_access_token) {
            Ok(user_id) => user_id,
            Err(err) => return Existence::Unverified { error: err.into() },
        };
        let path = state_path(&record.room_id, event_type::MEMBER, &user_id);
        match self
            .client
            .get_json::<MemberContent>(&path, Some(&record.member_access_token))
        {
            Ok(member) if member.membership == membership::JOIN => Existence::Present,
            Ok(member) => Existence::Gone {
                reason: format!("{user_id} is no longer joined (membership: {})", member.membership),
            },
            Err(err) => Existence::Gone {
                reason: format!("membership of {user_id} could not be fetched: {err}"),
            },
        }
    }

    fn create(&self, desired: &DesiredRoom) -> anyhow::Result<Created<RoomRecord>> {
        Ok(Created::ok(self.create_room(desired)?))
    }

    fn read(&self, record: &RoomRecord) -> anyhow::Result<Refresh<RoomRecord>> {
        if left_during_teardown(record).is_some() {
            return Ok(Refresh::Current(record.clone()));
        }
        let observed = self.observe(&record.room_id, &record.member_access_token)?;
        // Newer room versions drop the creator from m.room.create.
        let creator_user_id = if observed.creator_user_id.is_empty() {
            record.creator_user_id.clone()
        } else {
            observed.creator_user_id
        };
        Ok(Refresh::Current(RoomRecord {
            name: observed.name,
            avatar_mxc: observed.avatar_mxc,
            topic: observed.topic,
            guests_allowed: observed.guests_allowed,
            creator_user_id,
            abandonment: None,
            ..record.clone()
        }))
    }

    fn diff(&self, record: &RoomRecord, desired: &DesiredRoom) -> ChangeSet {
        let mut changes = ChangeSet::new();
        if let Some(done) = left_during_teardown(record) {
            changes.force_new(
                "abandonment",
                format!("interrupted after {done}").as_str(),
                "none",
            );
        }
        match &desired.source {
            RoomSource::Existing { room_id } => {
                changes.force_new("room_id", record.room_id.as_str(), room_id.as_str());
            }
            RoomSource::Create {
                creator_user_id,
                preset,
                invite_user_ids,
                local_alias_localpart,
            } => {
                changes.force_new(
                    "creator_user_id",
                    record.creator_user_id.as_str(),
                    creator_user_id.as_str(),
                );
                changes.force_new(
                    "preset",
                    record.preset.as_deref().unwrap_or_default(),
                    preset.as_deref().unwrap_or_default(),
                );
                changes.force_new_list(
                    "invite_user_ids",
                    &sorted(&record.invite_user_ids),
                    &sorted(invite_user_ids),
                );
                changes.force_new(
                    "local_alias_localpart",
                    record.local_alias_localpart.as_deref().unwrap_or_default(),
                    local_alias_localpart.as_deref().unwrap_or_default(),
                );
            }
        }
        changes.in_place(
            "member_access_token",
            &Sensitive(&record.member_access_token),
            &Sensitive(&desired.member_access_token),
        );
        if let Some(name) = &desired.name {
            changes.in_place("name", record.name.as_str(), name.as_str());
        }
        if let Some(avatar) = &desired.avatar_mxc {
            changes.in_place("avatar_mxc", record.avatar_mxc.as_str(), avatar.as_str());
        }
        if let Some(topic) = &desired.topic {
            changes.in_place("topic", record.topic.as_str(), topic.as_str());
        }
        if let Some(allowed) = &desired.guests_allowed {
            changes.in_place("guests_allowed", &record.guests_allowed, allowed);
        }
        changes
    }

    fn update(
        &self,
        record: &RoomRecord,
        desired: &DesiredRoom,
        changes: &ChangeSet,
    ) -> anyhow::Result<RoomRecord> {
        let forced = changes.force_new_fields();
        if !forced.is_empty() {
            return Err(Error::ForceNewRequired {
                fields: forced.into_iter().map(String::from).collect(),
            }
            .into());
        }
        Ok(self.apply_changes(record, desired, changes)?)
    }

    fn delete(&self, record: &mut RoomRecord) -> anyhow::Result<()> {
        let mut progress = record.abandonment;
        let result = Abandonment::new(self.client, &record.room_id, &record.member_access_token)
            .run(&mut progress);
        record.abandonment = progress;
        if let Err(err) = &result {
            if err.is_retryable() {
                log::warn!(
                    "Teardown of {} stopped on a transient failure; the next delete resumes it",
                    record.room_id
                );
            } else {
                log::error!("Teardown of {} needs manual attention: {err}", record.room_id);
            }
            if let Some(hint) = err.hint() {
                log::warn!("{hint}");
            }
        }
        result?;
        log::info!("Abandoned room {}", record.room_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_api::{ErrorCode, MockBackend, RemoteError};
    use serde_json::json;

    const ROOM: &str = "!room:hs.example";
    const TOKEN: &str = "member-token";
    const OWNER: &str = "@owner:hs.example";

    fn not_found() -> RemoteError {
        RemoteError::new(ErrorCode::NotFound, "Event not found.", 404)
    }

    fn whoami_path() -> ApiPath {
        ApiPath::client(["account", "whoami"])
    }

    fn created(name: Option<&str>, guests_allowed: Option<bool>) -> DesiredRoom {
        DesiredRoom {
            member_access_token: TOKEN.to_string(),
            source: RoomSource::Create {
                creator_user_id: OWNER.to_string(),
                preset: Some("private_chat".to_string()),
                invite_user_ids: vec!["@b:hs.example".to_string(), "@a:hs.example".to_string()],
                local_alias_localpart: None,
            },
            name: name.map(String::from),
            avatar_mxc: None,
            topic: None,
            guests_allowed,
        }
    }

    fn adopted() -> DesiredRoom {
        DesiredRoom {
            member_access_token: TOKEN.to_string(),
            source: RoomSource::Existing {
                room_id: ROOM.to_string(),
            },
            name: None,
            avatar_mxc: None,
            topic: None,
            guests_allowed: None,
        }
    }

    fn record() -> RoomRecord {
        RoomRecord {
            room_id: ROOM.to_string(),
            member_access_token: TOKEN.to_string(),
            creator_user_id: OWNER.to_string(),
            preset: Some("private_chat".to_string()),
            invite_user_ids: vec!["@a:hs.example".to_string(), "@b:hs.example".to_string()],
            name: "Lobby".to_string(),
            ..RoomRecord::default()
        }
    }

    /// Room state served for reads: a name, a creator and the given guest policies
    fn serve_state(mock: &MockBackend, name: &str, guest_policies: &[&str]) {
        mock.reply(
            Method::Get,
            &state_path(ROOM, event_type::NAME, ""),
            json!({"name": name}),
        );
        mock.fail(Method::Get, &state_path(ROOM, event_type::AVATAR, ""), not_found());
        mock.fail(Method::Get, &state_path(ROOM, event_type::TOPIC, ""), not_found());
        for policy in guest_policies {
            mock.reply(
                Method::Get,
                &state_path(ROOM, event_type::GUEST_ACCESS, ""),
                json!({"guest_access": policy}),
            );
        }
        mock.reply(
            Method::Get,
            &state_path(ROOM, event_type::CREATE, ""),
            json!({"creator": OWNER, "room_version": "6"}),
        );
    }

    fn current(refresh: Refresh<RoomRecord>) -> RoomRecord {
        match refresh {
            Refresh::Current(record) => record,
            Refresh::Gone { reason } => panic!("room unexpectedly gone: {reason}"),
        }
    }

    #[test]
    fn test_create_sends_initial_state_in_order() {
        let mock = MockBackend::new();
        mock.reply(Method::Post, &ApiPath::client(["createRoom"]), json!({"room_id": ROOM}));

        let desired = DesiredRoom {
            avatar_mxc: Some("mxc://hs.example/av".to_string()),
            topic: Some("Chatter".to_string()),
            source: RoomSource::Create {
                creator_user_id: OWNER.to_string(),
                preset: Some("public_chat".to_string()),
                invite_user_ids: vec!["@a:hs.example".to_string()],
                local_alias_localpart: Some("lobby".to_string()),
            },
            ..created(Some("Lobby"), None)
        };
        let record = RoomLifecycle::new(&mock).create(&desired).unwrap().record;
        assert_eq!(record.room_id, ROOM);
        assert_eq!(record.creator_user_id, OWNER);
        assert!(!record.guests_allowed);

        let calls = mock.calls();
        assert_eq!(calls[0].access_token.as_deref(), Some(TOKEN));
        assert_eq!(
            calls[0].body,
            Some(json!({
                "preset": "public_chat",
                "room_alias_name": "lobby",
                "invite": ["@a:hs.example"],
                "initial_state": [
                    {"type": "m.room.name", "state_key": "", "content": {"name": "Lobby"}},
                    {"type": "m.room.avatar", "state_key": "", "content": {"url": "mxc://hs.example/av"}},
                    {"type": "m.room.topic", "state_key": "", "content": {"topic": "Chatter"}},
                    {"type": "m.room.guest_access", "state_key": "", "content": {"guest_access": "forbidden"}},
                ],
                "is_direct": false,
            }))
        );
    }

    #[test]
    fn test_create_always_sends_guest_access() {
        let mock = MockBackend::new();
        mock.reply(Method::Post, &ApiPath::client(["createRoom"]), json!({"room_id": ROOM}));

        RoomLifecycle::new(&mock).create(&created(None, Some(true))).unwrap();

        let body = mock.calls()[0].body.clone().unwrap();
        assert_eq!(
            body["initial_state"],
            json!([{"type": "m.room.guest_access", "state_key": "", "content": {"guest_access": "can_join"}}])
        );
    }

    #[test]
    fn test_adopt_trusts_room_id() {
        let mock = MockBackend::new();
        let record = RoomLifecycle::new(&mock).create(&adopted()).unwrap().record;
        assert_eq!(record.room_id, ROOM);
        assert_eq!(record.member_access_token, TOKEN);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_exists_requires_joined_membership() {
        let member_path = state_path(ROOM, event_type::MEMBER, OWNER);

        let mock = MockBackend::new();
        mock.reply(Method::Get, &whoami_path(), json!({"user_id": OWNER}));
        mock.reply(Method::Get, &member_path, json!({"membership": "join"}));
        assert!(matches!(RoomLifecycle::new(&mock).exists(&record()), Existence::Present));

        let mock = MockBackend::new();
        mock.reply(Method::Get, &whoami_path(), json!({"user_id": OWNER}));
        mock.reply(Method::Get, &member_path, json!({"membership": "invite"}));
        assert!(matches!(RoomLifecycle::new(&mock).exists(&record()), Existence::Gone { .. }));

        let mock = MockBackend::new();
        mock.reply(Method::Get, &whoami_path(), json!({"user_id": OWNER}));
        mock.fail(
            Method::Get,
            &member_path,
            RemoteError::new(ErrorCode::Other("M_FORBIDDEN".into()), "not in room", 403),
        );
        assert!(matches!(RoomLifecycle::new(&mock).exists(&record()), Existence::Gone { .. }));
    }

    #[test]
    fn test_exists_unknown_identity_is_unverified() {
        let mock = MockBackend::new();
        mock.script(
            Method::Get,
            &whoami_path(),
            matrix_api::backend::Reply::Timeout,
        );
        assert!(matches!(
            RoomLifecycle::new(&mock).exists(&record()),
            Existence::Unverified { .. }
        ));
    }

    #[test]
    fn test_read_guest_access() {
        let mock = MockBackend::new();
        serve_state(&mock, "Lobby", &["can_join"]);
        let refreshed = current(RoomLifecycle::new(&mock).read(&record()).unwrap());
        assert!(refreshed.guests_allowed);
        assert_eq!(refreshed.name, "Lobby");
        assert_eq!(refreshed.topic, "");
        assert_eq!(refreshed.avatar_mxc, "");

        let mock = MockBackend::new();
        serve_state(&mock, "Lobby", &[]);
        mock.fail(Method::Get, &state_path(ROOM, event_type::GUEST_ACCESS, ""), not_found());
        let refreshed = current(RoomLifecycle::new(&mock).read(&record()).unwrap());
        assert!(!refreshed.guests_allowed);
    }

    #[test]
    fn test_read_other_failure_is_fatal() {
        let mock = MockBackend::new();
        serve_state(&mock, "Lobby", &["forbidden"]);
        mock.fail(
            Method::Get,
            &state_path(ROOM, event_type::TOPIC, ""),
            RemoteError::new(ErrorCode::Other("M_FORBIDDEN".into()), "no", 403),
        );
        // the not-found reply for the topic is consumed first
        let lifecycle = RoomLifecycle::new(&mock);
        current(lifecycle.read(&record()).unwrap());
        assert!(lifecycle.read(&record()).is_err());
    }

    #[test]
    fn test_read_keeps_recorded_creator_when_not_observed() {
        let mock = MockBackend::new();
        serve_state(&mock, "Lobby", &["forbidden"]);
        mock.reply(Method::Get, &state_path(ROOM, event_type::CREATE, ""), json!({"room_version": "11"}));
        let lifecycle = RoomLifecycle::new(&mock);
        current(lifecycle.read(&record()).unwrap());
        let refreshed = current(lifecycle.read(&record()).unwrap());
        assert_eq!(refreshed.creator_user_id, OWNER);
    }

    #[test]
    fn test_diff() {
        let mock = MockBackend::new();
        let lifecycle = RoomLifecycle::new(&mock);

        // undeclared attributes and invite order never drift
        assert!(lifecycle.diff(&record(), &created(None, None)).is_empty());

        let changes = lifecycle.diff(&record(), &created(Some("Hall"), Some(true)));
        assert_eq!(changes.len(), 2);
        assert!(!changes.requires_replace());

        let desired = DesiredRoom {
            member_access_token: "rotated".to_string(),
            ..created(None, None)
        };
        let changes = lifecycle.diff(&record(), &desired);
        assert!(!changes.requires_replace());
        assert!(!changes.get("member_access_token").unwrap().to_string().contains("rotated"));

        let desired = DesiredRoom {
            source: RoomSource::Create {
                creator_user_id: OWNER.to_string(),
                preset: Some("public_chat".to_string()),
                invite_user_ids: Vec::new(),
                local_alias_localpart: Some("lobby".to_string()),
            },
            ..created(None, None)
        };
        assert_eq!(
            lifecycle.diff(&record(), &desired).force_new_fields(),
            vec!["preset", "invite_user_ids", "local_alias_localpart"]
        );

        let desired = DesiredRoom {
            source: RoomSource::Existing {
                room_id: "!other:hs.example".to_string(),
            },
            ..adopted()
        };
        assert_eq!(lifecycle.diff(&record(), &desired).force_new_fields(), vec!["room_id"]);
    }

    #[test]
    fn test_update_stops_at_first_failed_field() {
        let mock = MockBackend::new();
        mock.reply(Method::Put, &state_path(ROOM, event_type::NAME, ""), json!({"event_id": "$n"}));
        mock.fail(
            Method::Put,
            &state_path(ROOM, event_type::TOPIC, ""),
            RemoteError::new(ErrorCode::Other("M_FORBIDDEN".into()), "power level", 403),
        );

        let lifecycle = RoomLifecycle::new(&mock);
        let desired = DesiredRoom {
            topic: Some("New topic".to_string()),
            ..created(Some("Hall"), Some(true))
        };
        let changes = lifecycle.diff(&record(), &desired);
        let err = lifecycle.update(&record(), &desired, &changes).unwrap_err();

        match err.downcast_ref::<Error>() {
            Some(Error::RoomFieldUpdate {
                field, committed, ..
            }) => {
                assert_eq!(*field, "topic");
                assert_eq!(committed, &vec!["name"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let guests = mock.calls_to(Method::Put, &state_path(ROOM, event_type::GUEST_ACCESS, ""));
        assert!(guests.is_empty());
    }

    #[test]
    fn test_update_refuses_force_new_changes() {
        let mock = MockBackend::new();
        let lifecycle = RoomLifecycle::new(&mock);
        let desired = DesiredRoom {
            source: RoomSource::Existing {
                room_id: "!other:hs.example".to_string(),
            },
            ..adopted()
        };
        let changes = lifecycle.diff(&record(), &desired);
        let err = lifecycle.update(&record(), &desired, &changes).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ForceNewRequired { .. })));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_token_rotation_only_touches_record() {
        let mock = MockBackend::new();
        let lifecycle = RoomLifecycle::new(&mock);
        let desired = DesiredRoom {
            member_access_token: "rotated".to_string(),
            ..created(None, None)
        };
        let changes = lifecycle.diff(&record(), &desired);
        let updated = lifecycle.update(&record(), &desired, &changes).unwrap();
        assert_eq!(updated.member_access_token, "rotated");
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_create_read_update_guests_read() {
        let mock = MockBackend::new();
        mock.reply(Method::Post, &ApiPath::client(["createRoom"]), json!({"room_id": ROOM}));
        serve_state(&mock, "Sample", &[guest_access::CAN_JOIN, guest_access::FORBIDDEN]);
        mock.reply(
            Method::Put,
            &state_path(ROOM, event_type::GUEST_ACCESS, ""),
            json!({"event_id": "$g"}),
        );

        let lifecycle = RoomLifecycle::new(&mock);
        let desired = created(Some("Sample"), Some(true));
        let record = lifecycle.create(&desired).unwrap().record;

        let observed = current(lifecycle.read(&record).unwrap());
        assert_eq!(observed.name, "Sample");
        assert!(observed.guests_allowed);

        let desired = created(Some("Sample"), Some(false));
        let changes = lifecycle.diff(&observed, &desired);
        assert_eq!(changes.len(), 1);
        mock.clear_calls();
        let updated = lifecycle.update(&observed, &desired, &changes).unwrap();
        assert!(!updated.guests_allowed);

        let writes = mock.calls_with(Method::Put);
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0].path,
            "/_matrix/client/r0/rooms/!room:hs.example/state/m.room.guest_access"
        );
        assert_eq!(writes[0].body, Some(json!({"guest_access": "forbidden"})));

        let observed = current(lifecycle.read(&updated).unwrap());
        assert!(!observed.guests_allowed);
        assert_eq!(observed.name, "Sample");
    }

    #[test]
    fn test_delete_records_teardown_progress_and_resumes() {
        let mock = MockBackend::new();
        mock.reply(Method::Get, &whoami_path(), json!({"user_id": OWNER}));
        mock.fail(
            Method::Get,
            &state_path(ROOM, event_type::ALIASES, "hs.example"),
            not_found(),
        );
        mock.reply(Method::Put, &state_path(ROOM, event_type::JOIN_RULES, ""), json!({}));
        mock.reply(Method::Put, &state_path(ROOM, event_type::GUEST_ACCESS, ""), json!({}));
        let members = ApiPath::client(["rooms", ROOM, "members"]);
        mock.script(Method::Get, &members, matrix_api::backend::Reply::Timeout);
        mock.reply(
            Method::Get,
            &members,
            json!({"chunk": [{"state_key": OWNER, "content": {"membership": "join"}}]}),
        );
        mock.reply(Method::Post, &ApiPath::client(["rooms", ROOM, "leave"]), json!({}));
        mock.reply(Method::Post, &ApiPath::client(["rooms", ROOM, "forget"]), json!({}));

        let lifecycle = RoomLifecycle::new(&mock);
        let mut record = record();
        let err = lifecycle.delete(&mut record).unwrap_err();
        assert!(err.to_string().contains("step 6 (kick members)"));
        assert_eq!(record.abandonment, Some(AbandonStep::ForbidGuests));

        mock.clear_calls();
        lifecycle.delete(&mut record).unwrap();
        assert_eq!(record.abandonment, Some(AbandonStep::Forget));
        let paths: Vec<String> = mock.calls().into_iter().map(|call| call.path).collect();
        assert_eq!(
            paths,
            vec![
                "/_matrix/client/r0/account/whoami",
                "/_matrix/client/r0/rooms/!room:hs.example/state/m.room.aliases/hs.example",
                "/_matrix/client/r0/rooms/!room:hs.example/state/m.room.join_rules",
                "/_matrix/client/r0/rooms/!room:hs.example/state/m.room.guest_access",
                "/_matrix/client/r0/rooms/!room:hs.example/members",
                "/_matrix/client/r0/rooms/!room:hs.example/leave",
                "/_matrix/client/r0/rooms/!room:hs.example/forget",
            ]
        );
    }

    #[test]
    fn test_destroy_after_leave_resumes_at_forget() {
        let mock = MockBackend::new();
        mock.reply(Method::Get, &whoami_path(), json!({"user_id": OWNER}));
        mock.reply(
            Method::Get,
            &state_path(ROOM, event_type::MEMBER, OWNER),
            json!({"membership": "leave"}),
        );
        let forget = ApiPath::client(["rooms", ROOM, "forget"]);
        mock.reply(Method::Post, &forget, json!({}));

        let lifecycle = RoomLifecycle::new(&mock);
        let interrupted = RoomRecord {
            abandonment: Some(AbandonStep::Leave),
            ..record()
        };
        let planned = declarative::plan_destroy(&lifecycle, "lobby", interrupted);
        assert_eq!(planned.action, declarative::Action::Delete);

        let (result, change) = declarative::apply_change(&lifecycle, planned);
        assert_eq!(result, declarative::ApplyResult::Removed);
        assert!(matches!(change, declarative::RecordChange::Remove));
        assert_eq!(mock.calls_to(Method::Post, &forget).len(), 1);
        assert!(
            mock.calls_to(Method::Post, &ApiPath::client(["rooms", ROOM, "leave"]))
                .is_empty()
        );
    }

    #[test]
    fn test_redeclared_room_after_leave_is_replaced() {
        let mock = MockBackend::new();
        let lifecycle = RoomLifecycle::new(&mock);
        let interrupted = RoomRecord {
            abandonment: Some(AbandonStep::Leave),
            ..record()
        };

        let refreshed = current(lifecycle.read(&interrupted).unwrap());
        assert_eq!(refreshed.abandonment, Some(AbandonStep::Leave));
        let changes = lifecycle.diff(&refreshed, &created(Some("Lobby"), None));
        assert!(changes.requires_replace());
        assert_eq!(changes.force_new_fields(), vec!["abandonment"]);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_redeclared_room_drops_stale_teardown_progress() {
        let mock = MockBackend::new();
        serve_state(&mock, "Lobby", &[guest_access::FORBIDDEN]);
        mock.reply(
            Method::Put,
            &state_path(ROOM, event_type::GUEST_ACCESS, ""),
            json!({"event_id": "$g"}),
        );
        let lifecycle = RoomLifecycle::new(&mock);
        let interrupted = RoomRecord {
            abandonment: Some(AbandonStep::ForbidGuests),
            ..record()
        };

        let refreshed = current(lifecycle.read(&interrupted).unwrap());
        assert_eq!(refreshed.abandonment, None);

        let desired = created(Some("Lobby"), Some(true));
        let changes = lifecycle.diff(&interrupted, &desired);
        let updated = lifecycle.update(&interrupted, &desired, &changes).unwrap();
        assert_eq!(updated.abandonment, None);
        assert!(updated.guests_allowed);
    }

    #[test]
    fn test_stale_teardown_progress_still_locks_room_before_kicking() {
        let mock = MockBackend::new();
        mock.reply(Method::Get, &whoami_path(), json!({"user_id": OWNER}));
        mock.fail(
            Method::Get,
            &state_path(ROOM, event_type::ALIASES, "hs.example"),
            not_found(),
        );
        mock.reply(Method::Put, &state_path(ROOM, event_type::JOIN_RULES, ""), json!({}));
        mock.reply(Method::Put, &state_path(ROOM, event_type::GUEST_ACCESS, ""), json!({}));
        mock.reply(
            Method::Get,
            &ApiPath::client(["rooms", ROOM, "members"]),
            json!({"chunk": [
                {"state_key": OWNER, "content": {"membership": "join"}},
                {"state_key": "@guest:hs.example", "content": {"membership": "join"}},
            ]}),
        );
        mock.reply(Method::Post, &ApiPath::client(["rooms", ROOM, "kick"]), json!({}));
        mock.reply(Method::Post, &ApiPath::client(["rooms", ROOM, "leave"]), json!({}));
        mock.reply(Method::Post, &ApiPath::client(["rooms", ROOM, "forget"]), json!({}));

        let lifecycle = RoomLifecycle::new(&mock);
        let mut stale = RoomRecord {
            guests_allowed: true,
            abandonment: Some(AbandonStep::ForbidGuests),
            ..record()
        };
        lifecycle.delete(&mut stale).unwrap();

        let join_rules = mock.calls_to(Method::Put, &state_path(ROOM, event_type::JOIN_RULES, ""));
        let guests = mock.calls_to(Method::Put, &state_path(ROOM, event_type::GUEST_ACCESS, ""));
        assert_eq!(join_rules.len(), 1);
        assert_eq!(guests.len(), 1);
        assert_eq!(guests[0].body, Some(json!({"guest_access": "forbidden"})));

        let order: Vec<String> = mock.calls().into_iter().map(|call| call.path).collect();
        let position = |suffix: &str| order.iter().position(|path| path.ends_with(suffix));
        assert!(position("m.room.guest_access") < position("/kick"));
    }
}
