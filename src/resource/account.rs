//! Matrix user accounts
//!
//! An account is either registered (falling back to a login when the
//! username is taken) or adopted from an existing access token. Homeservers
//! offer no account deletion, so deleting only forgets the record.

use super::error::{Error, FieldFailure, Result};
use super::{Sensitive, whoami};
use declarative::{ChangeSet, Created, Existence, Lifecycle, Refresh};
use matrix_api::types::{
    AvatarUrlRequest, DisplayNameRequest, EmptyResponse, LOGIN_TYPE_PASSWORD, LoginRequest,
    Profile, Session,
};
use matrix_api::{ApiPath, ErrorCode, Method, RemoteClient, RemoteClientExt, uia};
use serde::{Deserialize, Serialize};

/// How the account is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCredentials {
    /// Register, or log in if the username already exists
    Password { username: String, password: String },
    /// Adopt whatever account this token belongs to
    ExistingToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredAccount {
    pub credentials: AccountCredentials,
    pub display_name: Option<String>,
    pub avatar_mxc: Option<String>,
}

/// Durable account record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub user_id: String,
    pub access_token: String,
    /// Set when the account came from a username and password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_mxc: String,
}

fn profile_path(user_id: &str) -> ApiPath {
    ApiPath::client(["profile", user_id])
}

fn profile_field_path(user_id: &str, field: &str) -> ApiPath {
    ApiPath::client(["profile", user_id, field])
}

pub struct AccountLifecycle<'a> {
    client: &'a dyn RemoteClient,
}

impl<'a> AccountLifecycle<'a> {
    pub fn new(client: &'a dyn RemoteClient) -> Self {
        Self { client }
    }

    fn establish(&self, credentials: &AccountCredentials) -> Result<AccountRecord> {
        match credentials {
            AccountCredentials::Password { username, password } => {
                let session = match uia::register(self.client, username, password) {
                    Ok(session) => session,
                    Err(err) if err.has_code(&ErrorCode::UserInUse) => {
                        log::info!("User {username} already exists, logging in");
                        self.login(username, password)?
                    }
                    Err(err) => return Err(err.into()),
                };
                log::info!("Signed in as {}", session.user_id);
                Ok(AccountRecord {
                    user_id: session.user_id,
                    access_token: session.access_token,
                    username: Some(username.clone()),
                    ..AccountRecord::default()
                })
            }
            AccountCredentials::ExistingToken(token) => {
                let user_id = whoami(self.client, token)
                    .map_err(|source| Error::InvalidExistingToken { source })?;
                log::info!("Adopted account {user_id}");
                Ok(AccountRecord {
                    user_id,
                    access_token: token.clone(),
                    ..AccountRecord::default()
                })
            }
        }
    }

    fn login(&self, username: &str, password: &str) -> Result<Session> {
        let request = LoginRequest {
            kind: LOGIN_TYPE_PASSWORD.to_string(),
            user: username.to_string(),
            password: password.to_string(),
        };
        self.client
            .send_json(Method::Post, &ApiPath::client(["login"]), &request, None)
            .map_err(|source| Error::LoginFailed {
                username: username.to_string(),
                source,
            })
    }

    /// Write each given profile field independently, collecting failures
    ///
    /// Fields that were written are copied into `record`.
    fn write_profile(
        &self,
        record: &mut AccountRecord,
        display_name: Option<&str>,
        avatar_mxc: Option<&str>,
    ) -> Vec<FieldFailure> {
        let mut failures = Vec::new();

        if let Some(name) = display_name {
            log::debug!("Setting display name of {}", record.user_id);
            let request = DisplayNameRequest {
                display_name: name.to_string(),
            };
            match self.client.send_json::<_, EmptyResponse>(
                Method::Put,
                &profile_field_path(&record.user_id, "displayname"),
                &request,
                Some(&record.access_token),
            ) {
                Ok(_) => record.display_name = name.to_string(),
                Err(source) => failures.push(FieldFailure {
                    field: "display_name",
                    source,
                }),
            }
        }

        if let Some(avatar) = avatar_mxc {
            log::debug!("Setting avatar of {}", record.user_id);
            let request = AvatarUrlRequest {
                avatar_mxc: avatar.to_string(),
            };
            match self.client.send_json::<_, EmptyResponse>(
                Method::Put,
                &profile_field_path(&record.user_id, "avatar_url"),
                &request,
                Some(&record.access_token),
            ) {
                Ok(_) => record.avatar_mxc = avatar.to_string(),
                Err(source) => failures.push(FieldFailure {
                    field: "avatar_mxc",
                    source,
                }),
            }
        }

        failures
    }
}

impl Lifecycle for AccountLifecycle<'_> {
    type Desired = DesiredAccount;
    type Record = AccountRecord;

    fn kind(&self) -> &'static str {
        "user"
    }

    fn exists(&self, record: &AccountRecord) -> Existence {
        match whoami(self.client, &record.access_token) {
            Ok(user_id) if user_id == record.user_id => Existence::Present,
            Ok(user_id) => Existence::Gone {
                reason: format!("access token now belongs to {user_id}"),
            },
            Err(err) if err.has_code(&ErrorCode::UnknownToken) => Existence::Gone {
                reason: "access token is no longer valid".to_string(),
            },
            Err(err) => Existence::Unverified { error: err.into() },
        }
    }

    fn create(&self, desired: &DesiredAccount) -> anyhow::Result<Created<AccountRecord>> {
        let mut record = self.establish(&desired.credentials)?;
        let failures = self.write_profile(
            &mut record,
            desired.display_name.as_deref(),
            desired.avatar_mxc.as_deref(),
        );
        if failures.is_empty() {
            Ok(Created::ok(record))
        } else {
            Ok(Created::with_warning(
                record,
                Error::ProfileUpdate { failures }.into(),
            ))
        }
    }

    fn read(&self, record: &AccountRecord) -> anyhow::Result<Refresh<AccountRecord>> {
        let profile: Profile = match self
            .client
            .get_json(&profile_path(&record.user_id), Some(&record.access_token))
        {
            Ok(profile) => profile,
            Err(err) if err.has_code(&ErrorCode::UnknownToken) => {
                return Ok(Refresh::Gone {
                    reason: "access token is no longer valid".to_string(),
                });
            }
            Err(err) => return Err(Error::from(err).into()),
        };
        Ok(Refresh::Current(AccountRecord {
            display_name: profile.display_name,
            avatar_mxc: profile.avatar_mxc,
            ..record.clone()
        }))
    }

    fn diff(&self, record: &AccountRecord, desired: &DesiredAccount) -> ChangeSet {
        let mut changes = ChangeSet::new();
        match &desired.credentials {
            AccountCredentials::Password { username, .. } => {
                changes.force_new(
                    "username",
                    record.username.as_deref().unwrap_or_default(),
                    username.as_str(),
                );
            }
            AccountCredentials::ExistingToken(token) => {
                changes.force_new(
                    "access_token",
                    &Sensitive(&record.access_token),
                    &Sensitive(token),
                );
            }
        }
        if let Some(name) = &desired.display_name {
            changes.in_place("display_name", record.display_name.as_str(), name.as_str());
        }
        if let Some(avatar) = &desired.avatar_mxc {
            changes.in_place("avatar_mxc", record.avatar_mxc.as_str(), avatar.as_str());
        }
        changes
    }

    fn update(
        &self,
        record: &AccountRecord,
        desired: &DesiredAccount,
        changes: &ChangeSet,
    ) -> anyhow::Result<AccountRecord> {
        let forced = changes.force_new_fields();
        if !forced.is_empty() {
            return Err(Error::ForceNewRequired {
                fields: forced.into_iter().map(String::from).collect(),
            }
            .into());
        }

        let mut updated = record.clone();
        let failures = self.write_profile(
            &mut updated,
            desired
                .display_name
                .as_deref()
                .filter(|_| changes.contains("display_name")),
            desired
                .avatar_mxc
                .as_deref()
                .filter(|_| changes.contains("avatar_mxc")),
        );
        if failures.is_empty() {
            Ok(updated)
        } else {
            Err(Error::ProfileUpdate { failures }.into())
        }
    }

    fn delete(&self, record: &mut AccountRecord) -> anyhow::Result<()> {
        log::info!(
            "Accounts cannot be deleted; forgetting {} without touching the homeserver",
            record.user_id
        );
        Ok(())
    }
}
