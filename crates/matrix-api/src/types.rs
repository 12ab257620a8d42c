//! Wire types for the client-server API.
//!
//! Request bodies skip empty optional fields so the homeserver applies its
//! own defaults. Response types default missing fields, since state event
//! contents are frequently partial.

use serde::{Deserialize, Serialize};

/// Auth stage type that needs no user interaction.
pub const AUTH_TYPE_DUMMY: &str = "m.login.dummy";

/// Login type for username/password logins.
pub const LOGIN_TYPE_PASSWORD: &str = "m.login.password";

/// State event types touched by provisioning.
pub mod event_type {
    /// Room name.
    pub const NAME: &str = "m.room.name";
    /// Room topic.
    pub const TOPIC: &str = "m.room.topic";
    /// Room avatar.
    pub const AVATAR: &str = "m.room.avatar";
    /// Guest access policy.
    pub const GUEST_ACCESS: &str = "m.room.guest_access";
    /// Join rules.
    pub const JOIN_RULES: &str = "m.room.join_rules";
    /// Server-scoped alias list.
    pub const ALIASES: &str = "m.room.aliases";
    /// Room creation event.
    pub const CREATE: &str = "m.room.create";
    /// Membership.
    pub const MEMBER: &str = "m.room.member";
}

/// Membership values.
pub mod membership {
    /// Joined the room.
    pub const JOIN: &str = "join";
    /// Invited, not yet joined.
    pub const INVITE: &str = "invite";
}

/// Guest access policies.
pub mod guest_access {
    /// Guests may join.
    pub const CAN_JOIN: &str = "can_join";
    /// Guests are refused.
    pub const FORBIDDEN: &str = "forbidden";
}

/// Join rule that admits invited users only.
pub const JOIN_RULE_INVITE: &str = "invite";

// =============================================================================
// Accounts
// =============================================================================

/// Body of `POST /register`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Interactive-auth stage being completed.
    #[serde(rename = "auth", skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationData>,
    /// Desired localpart.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Desired password.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// The `auth` object of an interactive-auth request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticationData {
    /// Stage type, e.g. [`AUTH_TYPE_DUMMY`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Session issued by the challenge.
    pub session: String,
}

/// A 401 interactive-auth challenge.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct UiAuthChallenge {
    /// Session to thread into the next request.
    #[serde(default)]
    pub session: String,
    /// Acceptable flows.
    #[serde(default)]
    pub flows: Vec<UiAuthFlow>,
    /// Stages already completed in this session.
    #[serde(default)]
    pub completed: Vec<String>,
}

/// One acceptable sequence of auth stages.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct UiAuthFlow {
    /// Stage identifiers, in order.
    #[serde(default)]
    pub stages: Vec<String>,
}

/// Body of `POST /login`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginRequest {
    /// Login type, [`LOGIN_TYPE_PASSWORD`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Localpart or full user id.
    pub user: String,
    /// Password.
    pub password: String,
}

/// Identity returned by both registration and login.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Fully qualified user id.
    pub user_id: String,
    /// Access token for the new device.
    pub access_token: String,
    /// Device id, when the homeserver reports one.
    #[serde(default)]
    pub device_id: String,
}

/// Response of `GET /account/whoami`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WhoAmI {
    /// Owner of the presented token.
    pub user_id: String,
}

/// Response of `GET /profile/{userId}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Display name, empty when unset.
    #[serde(default, rename = "displayname")]
    pub display_name: String,
    /// Avatar locator, empty when unset.
    #[serde(default, rename = "avatar_url")]
    pub avatar_mxc: String,
}

/// Body of `PUT /profile/{userId}/displayname`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DisplayNameRequest {
    /// New display name.
    #[serde(rename = "displayname")]
    pub display_name: String,
}

/// Body of `PUT /profile/{userId}/avatar_url`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AvatarUrlRequest {
    /// New avatar locator.
    #[serde(rename = "avatar_url")]
    pub avatar_mxc: String,
}

// =============================================================================
// Media
// =============================================================================

/// Response of `POST /upload`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ContentUploadResponse {
    /// Locator of the stored content.
    pub content_uri: String,
}

// =============================================================================
// Rooms
// =============================================================================

/// Body of `POST /createRoom`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CreateRoomRequest {
    /// Preset such as `private_chat` or `public_chat`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Localpart of the local alias to publish.
    #[serde(rename = "room_alias_name", skip_serializing_if = "Option::is_none")]
    pub alias_localpart: Option<String>,
    /// Users to invite.
    #[serde(rename = "invite", skip_serializing_if = "Vec::is_empty")]
    pub invite_user_ids: Vec<String>,
    /// State events applied at creation, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub initial_state: Vec<StateEvent>,
    /// Always sent; provisioned rooms are never direct chats.
    pub is_direct: bool,
}

/// A state event in a `createRoom` body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub kind: String,
    /// State key, empty for room-level state.
    pub state_key: String,
    /// Event content.
    pub content: serde_json::Value,
}

impl StateEvent {
    /// A room-level state event (empty state key).
    pub fn room_level<C: Serialize>(kind: &str, content: &C) -> crate::Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            state_key: String::new(),
            content: serde_json::to_value(content)?,
        })
    }
}

/// Response carrying a room id.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RoomIdResponse {
    /// The room id.
    pub room_id: String,
}

/// Response carrying an event id.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EventIdResponse {
    /// The event id.
    #[serde(default)]
    pub event_id: String,
}

/// Any response whose body is irrelevant.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EmptyResponse {}

/// Content of `m.room.name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomNameContent {
    /// Room name.
    #[serde(default)]
    pub name: String,
}

/// Content of `m.room.topic`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomTopicContent {
    /// Room topic.
    #[serde(default)]
    pub topic: String,
}

/// Content of `m.room.avatar`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomAvatarContent {
    /// Avatar locator.
    #[serde(default, rename = "url")]
    pub avatar_mxc: String,
}

/// Content of `m.room.guest_access`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuestAccessContent {
    /// Policy, one of [`guest_access`].
    #[serde(default, rename = "guest_access")]
    pub policy: String,
}

/// Content of `m.room.join_rules`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRulesContent {
    /// Join rule.
    #[serde(default, rename = "join_rule")]
    pub rule: String,
}

/// Content of `m.room.aliases`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasesContent {
    /// Aliases published by one server.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Content of `m.room.create`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CreateContent {
    /// Creator of the room.
    #[serde(default, rename = "creator")]
    pub creator_user_id: String,
}

/// Content of `m.room.member`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberContent {
    /// Membership state.
    #[serde(default)]
    pub membership: String,
    /// Per-room display name.
    #[serde(default, rename = "displayname", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A membership event from `GET /rooms/{roomId}/members`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MemberEvent {
    /// Membership content; missing content is a data-integrity problem.
    #[serde(default)]
    pub content: Option<MemberContent>,
    /// The member's user id.
    #[serde(default)]
    pub state_key: String,
}

/// Response of `GET /rooms/{roomId}/members`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MembersResponse {
    /// Membership events.
    #[serde(default)]
    pub chunk: Vec<MemberEvent>,
}

/// Body of `POST /rooms/{roomId}/kick`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KickRequest {
    /// Target user.
    pub user_id: String,
    /// Reason shown to the target.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
}
