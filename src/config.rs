//! Manifest loading
//!
//! The manifest is a TOML file with a `[provider]` table and one table per
//! resource kind, keyed by label:
//!
//! ```toml
//! [provider]
//! client_server_url = "https://matrix.example.org"
//! default_access_token = "${MATRIX_ADMIN_TOKEN}"
//!
//! [user.alice]
//! username = "alice"
//! password = "${ALICE_PASSWORD}"
//! display_name = "Alice"
//!
//! [content.logo]
//! file_path = "assets/logo.png"
//! file_type = "image/png"
//!
//! [room.lobby]
//! member_access_token = "${ALICE_TOKEN}"
//! creator_user_id = "@alice:matrix.example.org"
//! name = "Lobby"
//! guests_allowed = false
//! ```
//!
//! Secrets may reference environment variables. Declarations are validated
//! and turned into desired states before any remote call is made.

use crate::resource::account::{AccountCredentials, DesiredAccount};
use crate::resource::content::DesiredContent;
use crate::resource::room::{DesiredRoom, RoomSource};
use crate::resource::{Error, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default manifest file name
pub const DEFAULT_MANIFEST: &str = "mxform.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_server_url: Option<String>,
    #[serde(default)]
    pub default_access_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserDecl {
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub display_name: Option<String>,
    pub avatar_mxc: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentDecl {
    pub origin: Option<String>,
    pub media_id: Option<String>,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomDecl {
    pub member_access_token: String,
    pub room_id: Option<String>,
    pub creator_user_id: Option<String>,
    pub preset: Option<String>,
    #[serde(default)]
    pub invite_user_ids: Vec<String>,
    pub local_alias_localpart: Option<String>,
    pub name: Option<String>,
    pub avatar_mxc: Option<String>,
    pub topic: Option<String>,
    pub guests_allowed: Option<bool>,
}

/// Parsed manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub user: BTreeMap<String, UserDecl>,
    #[serde(default)]
    pub content: BTreeMap<String, ContentDecl>,
    #[serde(default)]
    pub room: BTreeMap<String, RoomDecl>,
}

/// Connection settings after CLI and environment overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub client_server_url: String,
    pub default_access_token: Option<String>,
}

/// Every declaration, converted to desired state
#[derive(Debug, Default)]
pub struct Declarations {
    pub users: BTreeMap<String, DesiredAccount>,
    pub content: BTreeMap<String, DesiredContent>,
    pub rooms: BTreeMap<String, DesiredRoom>,
}

fn invalid(address: &str, reason: impl Into<String>) -> Error {
    Error::InvalidDeclaration {
        address: address.to_string(),
        reason: reason.into(),
    }
}

/// Expand `$VAR` / `${VAR}` references in a secret
fn expand_secret(address: &str, field: &str, value: &str) -> Result<String> {
    shellexpand::env(value)
        .map(|expanded| expanded.into_owned())
        .map_err(|err| invalid(address, format!("{field}: {err}")))
}

fn expand_optional_secret(address: &str, field: &str, value: Option<&str>) -> Result<Option<String>> {
    value
        .map(|value| expand_secret(address, field, value))
        .transpose()
}

fn check_label(kind: &str, label: &str) -> Result<String> {
    let address = format!("{kind}.{label}");
    if label.is_empty() || label.contains('.') {
        return Err(invalid(&address, "labels must be non-empty and may not contain '.'"));
    }
    Ok(address)
}

impl Manifest {
    /// Load a manifest from disk
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        log::debug!(
            "Loaded manifest from {} ({} users, {} content, {} rooms)",
            path.display(),
            manifest.user.len(),
            manifest.content.len(),
            manifest.room.len()
        );
        Ok(manifest)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve provider settings; flag and environment values win over the manifest
    pub fn provider_settings(
        &self,
        server_url: Option<&str>,
        default_access_token: Option<&str>,
    ) -> anyhow::Result<ProviderSettings> {
        let client_server_url = match server_url {
            Some(url) => url.to_string(),
            None => self.provider.client_server_url.clone().context(
                "No homeserver URL: set provider.client_server_url, --server-url or MATRIX_CLIENT_SERVER_URL",
            )?,
        };
        let default_access_token = match default_access_token {
            Some(token) => Some(token.to_string()),
            None => expand_optional_secret(
                "provider",
                "default_access_token",
                self.provider.default_access_token.as_deref(),
            )?,
        };
        Ok(ProviderSettings {
            client_server_url,
            default_access_token: default_access_token.filter(|t| !t.is_empty()),
        })
    }

    /// Validate every declaration and convert it into desired state
    ///
    /// Relative content paths are resolved against `base_dir`.
    pub fn declarations(&self, base_dir: &Path) -> Result<Declarations> {
        let mut declarations = Declarations::default();
        for (label, decl) in &self.user {
            let address = check_label("user", label)?;
            declarations
                .users
                .insert(label.clone(), decl.to_desired(&address)?);
        }
        for (label, decl) in &self.content {
            let address = check_label("content", label)?;
            declarations
                .content
                .insert(label.clone(), decl.to_desired(&address, base_dir)?);
        }
        for (label, decl) in &self.room {
            let address = check_label("room", label)?;
            declarations
                .rooms
                .insert(label.clone(), decl.to_desired(&address)?);
        }
        Ok(declarations)
    }
}

impl UserDecl {
    fn to_desired(&self, address: &str) -> Result<DesiredAccount> {
        let credentials = match (&self.username, &self.password, &self.access_token) {
            (Some(username), Some(password), None) => AccountCredentials::Password {
                username: username.clone(),
                password: expand_secret(address, "password", password)?,
            },
            (None, None, Some(token)) => {
                AccountCredentials::ExistingToken(expand_secret(address, "access_token", token)?)
            }
            (Some(_), None, None) => return Err(invalid(address, "username requires a password")),
            (None, Some(_), None) => return Err(invalid(address, "password requires a username")),
            (None, None, None) => {
                return Err(invalid(
                    address,
                    "declare either username and password, or access_token",
                ));
            }
            _ => {
                return Err(invalid(
                    address,
                    "access_token cannot be combined with username or password",
                ));
            }
        };
        Ok(DesiredAccount {
            credentials,
            display_name: self.display_name.clone(),
            avatar_mxc: self.avatar_mxc.clone(),
        })
    }
}

impl ContentDecl {
    fn to_desired(&self, address: &str, base_dir: &Path) -> Result<DesiredContent> {
        match (&self.origin, &self.media_id, &self.file_path) {
            (Some(origin), Some(media_id), None) => {
                if self.file_type.is_some() || self.file_name.is_some() {
                    return Err(invalid(
                        address,
                        "file_type and file_name only apply to uploaded files",
                    ));
                }
                Ok(DesiredContent::Existing {
                    origin: origin.clone(),
                    media_id: media_id.clone(),
                })
            }
            (None, None, Some(file_path)) => {
                let bytes = fs::read(resolve_path(base_dir, file_path))
                    .map_err(|err| invalid(address, format!("cannot read {file_path}: {err}")))?;
                Ok(DesiredContent::Upload {
                    file_path: file_path.clone(),
                    bytes,
                    file_type: self.file_type.clone(),
                    file_name: self.file_name.clone(),
                })
            }
            (None, None, None) => Err(invalid(
                address,
                "declare either origin and media_id, or file_path",
            )),
            (_, _, None) => Err(invalid(address, "origin and media_id must be declared together")),
            (_, _, Some(_)) => Err(invalid(
                address,
                "file_path cannot be combined with origin or media_id",
            )),
        }
    }
}

/// Expand `~` and anchor relative paths at the manifest directory
fn resolve_path(base_dir: &Path, file_path: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(file_path).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

impl RoomDecl {
    fn to_desired(&self, address: &str) -> Result<DesiredRoom> {
        let member_access_token =
            expand_secret(address, "member_access_token", &self.member_access_token)?;
        if member_access_token.is_empty() {
            return Err(invalid(address, "member_access_token is empty"));
        }

        let source = match (&self.room_id, &self.creator_user_id) {
            (Some(room_id), None) => {
                let creation_only = [
                    ("preset", self.preset.is_some()),
                    ("invite_user_ids", !self.invite_user_ids.is_empty()),
                    ("local_alias_localpart", self.local_alias_localpart.is_some()),
                ];
                if let Some((field, _)) = creation_only.iter().find(|(_, set)| *set) {
                    return Err(invalid(
                        address,
                        format!("{field} only applies to rooms created with creator_user_id"),
                    ));
                }
                RoomSource::Existing {
                    room_id: room_id.clone(),
                }
            }
            (None, Some(creator_user_id)) => RoomSource::Create {
                creator_user_id: creator_user_id.clone(),
                preset: self.preset.clone(),
                invite_user_ids: self.invite_user_ids.clone(),
                local_alias_localpart: self.local_alias_localpart.clone(),
            },
            (Some(_), Some(_)) => {
                return Err(invalid(
                    address,
                    "room_id and creator_user_id are mutually exclusive",
                ));
            }
            (None, None) => {
                return Err(invalid(address, "declare either room_id or creator_user_id"));
            }
        };

        Ok(DesiredRoom {
            member_access_token,
            source,
            name: self.name.clone(),
            avatar_mxc: self.avatar_mxc.clone(),
            topic: self.topic.clone(),
            guests_allowed: self.guests_allowed,
        })
    }
}
