//! Uploaded media
//!
//! Content is immutable once it has an `mxc://` locator: every declared
//! field forces replacement and nothing can be removed from the homeserver.

use super::error::{Error, Result};
use declarative::{ChangeSet, Created, Existence, Lifecycle, Refresh};
use matrix_api::backend::http::DEFAULT_CONTENT_TYPE;
use matrix_api::{RemoteClient, mxc};
use serde::{Deserialize, Serialize};
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredContent {
    /// Adopt media that is already on the homeserver
    Existing { origin: String, media_id: String },
    /// Upload a local file
    Upload {
        file_path: String,
        bytes: Vec<u8>,
        file_type: Option<String>,
        file_name: Option<String>,
    },
}

/// Durable content record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub mxc: String,
    pub origin: String,
    pub media_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_name: String,
}

impl ContentRecord {
    fn from_locator(locator: mxc::Mxc) -> Self {
        Self {
            mxc: locator.canonical,
            origin: locator.origin,
            media_id: locator.media_id,
            ..Self::default()
        }
    }
}

pub struct ContentLifecycle<'a> {
    client: &'a dyn RemoteClient,
    default_access_token: Option<&'a str>,
}

impl<'a> ContentLifecycle<'a> {
    pub fn new(client: &'a dyn RemoteClient, default_access_token: Option<&'a str>) -> Self {
        Self {
            client,
            default_access_token,
        }
    }

    fn adopt(origin: &str, media_id: &str) -> Result<ContentRecord> {
        let locator = mxc::parse(&mxc::format(origin, media_id))?;
        if locator.origin != origin {
            return Err(Error::AdoptionMismatch {
                field: "origin",
                expected: origin.to_string(),
                actual: locator.origin,
            });
        }
        if locator.media_id != media_id {
            return Err(Error::AdoptionMismatch {
                field: "media_id",
                expected: media_id.to_string(),
                actual: locator.media_id,
            });
        }
        log::info!("Adopted content {locator}");
        Ok(ContentRecord::from_locator(locator))
    }

    fn upload(
        &self,
        file_path: &str,
        bytes: &[u8],
        file_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<ContentRecord> {
        let token = self
            .default_access_token
            .ok_or(Error::MissingUploadCredential)?;
        let content_type = file_type
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        log::debug!("Uploading {file_path} ({} bytes)", bytes.len());
        let response = self.client.upload(bytes, file_name, content_type, token)?;
        let locator = mxc::parse(&response.content_uri)?;
        log::info!("Uploaded {file_path} as {locator}");

        Ok(ContentRecord {
            file_path: file_path.to_string(),
            file_type: content_type.to_string(),
            file_name: file_name.unwrap_or_default().to_string(),
            ..ContentRecord::from_locator(locator)
        })
    }
}

impl Lifecycle for ContentLifecycle<'_> {
    type Desired = DesiredContent;
    type Record = ContentRecord;

    fn kind(&self) -> &'static str {
        "content"
    }

    /// Media has no distinguishing error codes, so any failed download means gone.
    fn exists(&self, record: &ContentRecord) -> Existence {
        let drained = self
            .client
            .download(&record.origin, &record.media_id)
            .map_err(anyhow::Error::from)
            .and_then(|mut download| Ok(io::copy(&mut download.body, &mut io::sink())?));
        match drained {
            Ok(bytes) => {
                log::debug!("{} is still served ({bytes} bytes)", record.mxc);
                Existence::Present
            }
            Err(err) => Existence::Gone {
                reason: format!("download of {} failed: {err}", record.mxc),
            },
        }
    }

    fn create(&self, desired: &DesiredContent) -> anyhow::Result<Created<ContentRecord>> {
        let record = match desired {
            DesiredContent::Existing { origin, media_id } => Self::adopt(origin, media_id)?,
            DesiredContent::Upload {
                file_path,
                bytes,
                file_type,
                file_name,
            } => self.upload(
                file_path,
                bytes,
                file_type.as_deref(),
                file_name.as_deref(),
            )?,
        };
        Ok(Created::ok(record))
    }

    fn read(&self, record: &ContentRecord) -> anyhow::Result<Refresh<ContentRecord>> {
        let mut current = record.clone();
        if current.file_path.is_empty() {
            current.file_type.clear();
            current.file_name.clear();
        }
        Ok(Refresh::Current(current))
    }

    fn diff(&self, record: &ContentRecord, desired: &DesiredContent) -> ChangeSet {
        let mut changes = ChangeSet::new();
        match desired {
            DesiredContent::Existing { origin, media_id } => {
                changes.force_new("origin", record.origin.as_str(), origin.as_str());
                changes.force_new("media_id", record.media_id.as_str(), media_id.as_str());
            }
            DesiredContent::Upload {
                file_path,
                file_type,
                file_name,
                ..
            } => {
                changes.force_new("file_path", record.file_path.as_str(), file_path.as_str());
                if let Some(file_type) = file_type {
                    changes.force_new("file_type", record.file_type.as_str(), file_type.as_str());
                }
                if let Some(file_name) = file_name {
                    changes.force_new("file_name", record.file_name.as_str(), file_name.as_str());
                }
            }
        }
        changes
    }

    fn update(
        &self,
        _record: &ContentRecord,
        _desired: &DesiredContent,
        _changes: &ChangeSet,
    ) -> anyhow::Result<ContentRecord> {
        Err(Error::ImmutableResource.into())
    }

    fn delete(&self, record: &mut ContentRecord) -> anyhow::Result<()> {
        log::info!(
            "Content cannot be deleted; forgetting {} without touching the homeserver",
            record.mxc
        );
        Ok(())
    }
}
