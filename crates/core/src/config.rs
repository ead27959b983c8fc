//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the backend client. The core never reads process-wide environment variables
//! while a submission is running; the binaries read them and hand the parsed values in.

use crate::{IntakeError, IntakeResult};
use reqwest::Url;
use std::time::Duration;

/// Backend connection settings resolved at startup.
#[derive(Clone, Debug)]
pub struct IntakeConfig {
    base_url: Url,
    api_token: Option<String>,
    request_timeout: Option<Duration>,
    idempotency_keys: bool,
}

impl IntakeConfig {
    /// Create a new `IntakeConfig`.
    ///
    /// `base_url` must be an absolute `http` or `https` URL. A trailing `/` is added when
    /// missing so relative resource paths join underneath it instead of replacing the last
    /// path segment.
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        request_timeout: Option<Duration>,
        idempotency_keys: bool,
    ) -> IntakeResult<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(IntakeError::Config("backend base URL cannot be empty".into()));
        }

        let normalised = if trimmed.ends_with('/') {
            trimmed.to_owned()
        } else {
            format!("{trimmed}/")
        };
        let base_url = Url::parse(&normalised)
            .map_err(|e| IntakeError::Config(format!("invalid backend base URL: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(IntakeError::Config(format!(
                "backend base URL must use http or https, got {}",
                base_url.scheme()
            )));
        }

        Ok(Self {
            base_url,
            api_token: api_token_from_env_value(api_token),
            request_timeout,
            idempotency_keys,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    /// Per-request timeout. `None` means requests may wait indefinitely.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn idempotency_keys(&self) -> bool {
        self.idempotency_keys
    }
}

/// Parse an optional timeout in whole seconds.
///
/// `None` or empty/whitespace leaves requests without a timeout.
pub fn timeout_from_env_value(value: Option<String>) -> IntakeResult<Option<Duration>> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let secs: u64 = value
        .parse()
        .map_err(|_| IntakeError::Config(format!("timeout must be whole seconds, got {value:?}")))?;
    if secs == 0 {
        return Err(IntakeError::Config("timeout must be greater than zero".into()));
    }

    Ok(Some(Duration::from_secs(secs)))
}

/// Parse an optional boolean flag, falling back to `default` when unset or empty.
pub fn flag_from_env_value(value: Option<String>, default: bool) -> IntakeResult<bool> {
    let Some(value) = value.map(|v| v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty())
    else {
        return Ok(default);
    };

    match value.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(IntakeError::Config(format!("expected a boolean flag, got {other:?}"))),
    }
}

fn api_token_from_env_value(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
