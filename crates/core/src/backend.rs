//! The JSON-over-HTTP boundary to the records backend.
//!
//! Everything the pipeline sends goes through the [`Backend`] trait so the whole saga can be
//! driven against an in-memory backend in tests. [`HttpBackend`] is the production
//! implementation on top of `reqwest`.
//!
//! Status handling is uniform for every resource:
//!
//! - no response at all (connect, timeout, body read) becomes [`IntakeError::Transport`]
//! - a non-2xx answer to a create or update becomes [`IntakeError::Creation`] with the body
//! - a 2xx answer without the identifier field becomes [`IntakeError::Resolution`]

use crate::config::IntakeConfig;
use crate::constants::IDEMPOTENCY_HEADER;
use crate::{IntakeError, IntakeResult};
use async_trait::async_trait;
use intake_types::RawId;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

/// A backend resource: where it lives and which response field carries its primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub name: &'static str,
    pub path: &'static str,
    pub id_field: &'static str,
}

impl Resource {
    pub const fn new(name: &'static str, path: &'static str, id_field: &'static str) -> Self {
        Self {
            name,
            path,
            id_field,
        }
    }

    /// Path of one existing row, e.g. `familyplanning/fp_record/12/`.
    pub fn item_path(&self, id: &RawId) -> String {
        format!("{}{}/", self.path, id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    /// Relative to the configured base URL.
    pub path: String,
    pub body: Option<Value>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: u16,
    pub body: String,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportFailure(pub String);

#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, TransportFailure>;
}

/// `reqwest`-backed client configured once from [`IntakeConfig`].
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(cfg: &IntakeConfig) -> IntakeResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = cfg.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| IntakeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url().clone(),
            api_token: cfg.api_token().map(str::to_owned),
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, TransportFailure> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportFailure(format!("invalid path {}: {e}", request.path)))?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Patch => self.client.patch(url),
        };
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportFailure(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportFailure(format!("failed to read response body: {e}")))?;

        Ok(BackendResponse { status, body })
    }
}

/// POST a new row and return the identifier the backend assigned to it.
pub async fn create(
    backend: &dyn Backend,
    resource: &Resource,
    body: Value,
    idempotency_key: Option<String>,
) -> IntakeResult<RawId> {
    let request = BackendRequest {
        method: Method::Post,
        path: resource.path.to_owned(),
        body: Some(body),
        idempotency_key,
    };
    let response = backend
        .send(request)
        .await
        .map_err(|e| transport_error(resource, e))?;

    if !response.is_success() {
        return Err(IntakeError::Creation {
            resource: resource.name,
            status: response.status,
            body: response.body,
        });
    }

    let id = extract_id(resource, &response.body)?;
    tracing::debug!(resource = resource.name, id = %id, "backend row created");
    Ok(id)
}

/// PATCH an existing row in place.
pub async fn update(
    backend: &dyn Backend,
    resource: &Resource,
    id: &RawId,
    body: Value,
) -> IntakeResult<()> {
    let request = BackendRequest {
        method: Method::Patch,
        path: resource.item_path(id),
        body: Some(body),
        idempotency_key: None,
    };
    let response = backend
        .send(request)
        .await
        .map_err(|e| transport_error(resource, e))?;

    if !response.is_success() {
        return Err(IntakeError::Creation {
            resource: resource.name,
            status: response.status,
            body: response.body,
        });
    }

    tracing::debug!(resource = resource.name, id = %id, "backend row updated");
    Ok(())
}

/// GET a path and parse the JSON answer. Non-2xx answers count as transport failures.
pub async fn fetch(backend: &dyn Backend, resource: &Resource, path: String) -> IntakeResult<Value> {
    let request = BackendRequest {
        method: Method::Get,
        path,
        body: None,
        idempotency_key: None,
    };
    let response = backend
        .send(request)
        .await
        .map_err(|e| transport_error(resource, e))?;

    if !response.is_success() {
        return Err(IntakeError::Transport {
            resource: resource.name,
            detail: format!("lookup returned status {}", response.status),
            body: Some(response.body),
        });
    }

    serde_json::from_str(&response.body).map_err(|e| IntakeError::Transport {
        resource: resource.name,
        detail: format!("lookup returned invalid JSON: {e}"),
        body: Some(response.body),
    })
}

/// Pull `resource.id_field` out of a successful response body.
pub fn extract_id(resource: &Resource, body: &str) -> IntakeResult<RawId> {
    let missing = || IntakeError::Resolution {
        resource: resource.name,
        field: resource.id_field,
    };

    let value: Value = serde_json::from_str(body).map_err(|_| missing())?;
    value
        .get(resource.id_field)
        .and_then(RawId::from_json)
        .ok_or_else(missing)
}

/// Serialise a creator input and attach the foreign keys it is linked to.
pub fn linked_body(
    input: &impl Serialize,
    links: &[(&'static str, &RawId)],
) -> IntakeResult<Value> {
    let mut body = serde_json::to_value(input)
        .map_err(|e| IntakeError::InvalidInput(format!("failed to serialise request body: {e}")))?;
    let Value::Object(fields) = &mut body else {
        return Err(IntakeError::InvalidInput(
            "request body must serialise to a JSON object".into(),
        ));
    };

    for (field, id) in links {
        let value = match id {
            RawId::Int(v) => Value::from(*v),
            RawId::Text(s) => Value::from(s.as_str()),
        };
        fields.insert((*field).to_owned(), value);
    }

    Ok(body)
}

fn transport_error(resource: &Resource, failure: TransportFailure) -> IntakeError {
    IntakeError::Transport {
        resource: resource.name,
        detail: failure.0,
        body: None,
    }
}
