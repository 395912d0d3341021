// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Confluent Schema Registry REST client.
//!
//! Endpoints used:
//!   GET    /subjects                         -> list_subjects
//!   GET    /subjects/{subject}/versions      -> list_versions
//!   GET    /subjects/{subject}/versions/{v}  -> get_schema
//!   GET    /config[/{subject}]               -> get_mode / get_mode_override
//!   PUT    /config[/{subject}]               -> set_mode
//!   DELETE /config/{subject}                 -> clear_mode
//!
//! Karapace and Redpanda expose the same API, so the client serves them too.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::mode::CompatibilityMode;
use crate::registry::{BackendKind, RegistryClient, RegistryError};
use crate::schema::{SchemaFormat, SchemaVersion};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry error code of a 404 for an unknown subject; other 404s on a
/// version path mean the version is gone.
const SUBJECT_NOT_FOUND: i64 = 40401;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: String,
    #[serde(rename = "schemaType", default)]
    schema_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigResponse {
    #[serde(rename = "compatibilityLevel", alias = "compatibility")]
    compatibility_level: String,
}

#[derive(Debug, Serialize)]
struct ConfigRequest<'a> {
    compatibility: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: i64,
    #[serde(default)]
    message: String,
}

/// Successful body, or a 404 with its registry error code.
enum Reply<T> {
    Found(T),
    NotFound(Option<i64>),
}

/// Map a `schemaType` value to a format; an absent type means Avro.
fn format_of(schema_type: Option<&str>) -> Result<SchemaFormat, String> {
    match schema_type.map(str::to_ascii_uppercase).as_deref() {
        None | Some("AVRO") => Ok(SchemaFormat::Avro),
        Some("JSON") => Ok(SchemaFormat::JsonSchema),
        Some("PROTOBUF") => Ok(SchemaFormat::Protobuf),
        Some(other) => Err(format!("unknown schemaType {}", other)),
    }
}

// ---------------------------------------------------------------------------
// ConfluentRegistry
// ---------------------------------------------------------------------------

/// [`RegistryClient`] over the Confluent REST API.
pub struct ConfluentRegistry {
    kind: BackendKind,
    base: Url,
    client: Client,
    auth: Option<(String, Option<String>)>,
}

impl ConfluentRegistry {
    /// Client for the registry at `url`, reported as `kind`.
    pub fn connect(kind: BackendKind, url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let base = Url::parse(url).map_err(|e| RegistryError::Backend {
            backend: kind,
            message: format!("invalid registry URL {}: {}", url, e),
        })?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::Backend {
                backend: kind,
                message: format!("registry URL {} cannot carry a path", url),
            });
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Backend {
                backend: kind,
                message: format!("HTTP client setup failed: {}", e),
            })?;

        info!(backend = %kind, url = %base, "registry client ready");
        Ok(ConfluentRegistry {
            kind,
            base,
            client,
            auth: None,
        })
    }

    /// Send HTTP basic credentials with every request.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some((username.into(), password));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `base` plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn config_endpoint(&self, subject: Option<&str>) -> Url {
        match subject {
            Some(name) => self.endpoint(&["config", name]),
            None => self.endpoint(&["config"]),
        }
    }

    fn error(&self, message: impl Into<String>) -> RegistryError {
        RegistryError::Backend {
            backend: self.kind,
            message: message.into(),
        }
    }

    fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Reply<T>, RegistryError> {
        let request = request
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE);
        let request = match &self.auth {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        };

        let response = request.send().map_err(|e| self.error(e.to_string()))?;
        let status = response.status();
        let url = response.url().clone();
        if status.is_success() {
            return response
                .json::<T>()
                .map(Reply::Found)
                .map_err(|e| RegistryError::Serialization(format!("{}: {}", url, e)));
        }

        let body = response.text().unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        if status == StatusCode::NOT_FOUND {
            debug!(%url, code = ?parsed.as_ref().map(|b| b.error_code), "not found");
            return Ok(Reply::NotFound(parsed.map(|b| b.error_code)));
        }
        let detail = match parsed {
            Some(b) => format!("{} (error {})", b.message, b.error_code),
            None => body,
        };
        Err(self.error(format!("{} {}: {}", status.as_u16(), url, detail)))
    }

    fn fetch_mode(&self, subject: Option<&str>) -> Result<Option<CompatibilityMode>, RegistryError> {
        let mut url = self.config_endpoint(subject);
        if subject.is_some() {
            url.query_pairs_mut().append_pair("defaultToGlobal", "false");
        }
        match self.call::<ConfigResponse>(self.client.get(url))? {
            Reply::Found(config) => config
                .compatibility_level
                .parse::<CompatibilityMode>()
                .map(Some)
                .map_err(|e| self.error(format!("registry reported {}", e))),
            Reply::NotFound(_) if subject.is_some() => Ok(None),
            Reply::NotFound(_) => Err(self.error("global config endpoint not found")),
        }
    }
}

impl RegistryClient for ConfluentRegistry {
    fn backend(&self) -> BackendKind {
        self.kind
    }

    fn list_subjects(&self, prefix: Option<&str>) -> Result<Vec<String>, RegistryError> {
        let mut subjects = match self.call::<Vec<String>>(self.client.get(self.endpoint(&["subjects"])))? {
            Reply::Found(subjects) => subjects,
            Reply::NotFound(_) => return Err(self.error("subjects endpoint not found")),
        };
        subjects.retain(|name| prefix.map_or(true, |p| name.starts_with(p)));
        subjects.sort();
        subjects.dedup();
        Ok(subjects)
    }

    fn list_versions(&self, subject: &str) -> Result<Vec<u32>, RegistryError> {
        let url = self.endpoint(&["subjects", subject, "versions"]);
        match self.call::<Vec<u32>>(self.client.get(url))? {
            Reply::Found(mut versions) => {
                versions.sort_unstable();
                Ok(versions)
            }
            Reply::NotFound(_) => Err(RegistryError::SubjectNotFound(subject.to_string())),
        }
    }

    fn get_schema(&self, subject: &str, version: u32) -> Result<SchemaVersion, RegistryError> {
        let url = self.endpoint(&["subjects", subject, "versions", &version.to_string()]);
        let body = match self.call::<SchemaResponse>(self.client.get(url))? {
            Reply::Found(body) => body,
            Reply::NotFound(Some(SUBJECT_NOT_FOUND)) => {
                return Err(RegistryError::SubjectNotFound(subject.to_string()))
            }
            Reply::NotFound(_) => {
                return Err(RegistryError::VersionNotFound {
                    subject: subject.to_string(),
                    version,
                })
            }
        };

        let format = format_of(body.schema_type.as_deref())
            .map_err(|e| self.error(format!("{} v{}: {}", subject, version, e)))?;
        SchemaVersion::parse(format, version, &body.schema).map_err(|source| RegistryError::SchemaParse {
            subject: subject.to_string(),
            version,
            source,
        })
    }

    fn get_mode(&self, subject: Option<&str>) -> Result<CompatibilityMode, RegistryError> {
        if let Some(name) = subject {
            if let Some(mode) = self.fetch_mode(Some(name))? {
                return Ok(mode);
            }
        }
        self.fetch_mode(None)?
            .ok_or_else(|| self.error("registry returned no global compatibility"))
    }

    fn get_mode_override(&self, subject: &str) -> Result<Option<CompatibilityMode>, RegistryError> {
        self.fetch_mode(Some(subject))
    }

    fn set_mode(&self, subject: Option<&str>, mode: CompatibilityMode) -> Result<(), RegistryError> {
        let request = self
            .client
            .put(self.config_endpoint(subject))
            .json(&ConfigRequest {
                compatibility: mode.as_str(),
            });
        match self.call::<serde_json::Value>(request)? {
            Reply::Found(_) => {
                debug!(subject = subject.unwrap_or("<global>"), %mode, "mode set");
                Ok(())
            }
            Reply::NotFound(_) => Err(match subject {
                Some(name) => RegistryError::SubjectNotFound(name.to_string()),
                None => self.error("global config endpoint not found"),
            }),
        }
    }

    fn clear_mode(&self, subject: &str) -> Result<(), RegistryError> {
        // A 404 means there was no override to clear.
        let request = self.client.delete(self.config_endpoint(Some(subject)));
        self.call::<serde_json::Value>(request).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
