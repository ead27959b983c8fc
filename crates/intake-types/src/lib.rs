//! Validated primitive types shared across the intake crates.
//!
//! - [`NonEmptyText`] for free-text fields the backend rejects when blank
//! - Typed backend identifiers, one newtype per resource, so a pipeline step cannot be handed
//!   the identifier of the wrong resource

use serde::{Deserialize, Serialize};

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The identifier contains a character that would change the request path
    #[error("Identifier cannot contain '/', '?', '#' or '..'")]
    ReservedCharacter,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A primary key as the backend hands it out.
///
/// Some resources use integer keys and others use string keys (e.g. `PAT0001`). The JSON
/// type is preserved so the key is sent back exactly as it was received.
///
/// String keys are trimmed and must be non-blank. They are spliced into request paths, so
/// `/`, `?`, `#` and `..` are refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RawId {
    Int(i64),
    Text(String),
}

impl RawId {
    /// Builds a string key.
    pub fn text(input: &str) -> Result<Self, TextError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.contains(['/', '?', '#']) || trimmed.contains("..") {
            return Err(TextError::ReservedCharacter);
        }
        Ok(RawId::Text(trimmed.to_owned()))
    }

    /// Reads a key from a JSON value. Blank strings, floats, and non-scalars are not keys.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(RawId::Int),
            serde_json::Value::String(s) => RawId::text(s).ok(),
            _ => None,
        }
    }
}

impl<'de> serde::Deserialize<'de> for RawId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Int(i64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Int(v) => Ok(RawId::Int(v)),
            Wire::Text(s) => RawId::text(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Parses a key typed by an operator: digits become an integer key, anything else a string key.
impl std::str::FromStr for RawId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<i64>() {
            Ok(v) => Ok(RawId::Int(v)),
            Err(_) => RawId::text(s),
        }
    }
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawId::Int(v) => write!(f, "{v}"),
            RawId::Text(s) => write!(f, "{s}"),
        }
    }
}

macro_rules! record_id {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(RawId);

            impl $name {
                pub fn new(raw: RawId) -> Self {
                    Self(raw)
                }

                pub fn raw(&self) -> &RawId {
                    &self.0
                }
            }

            impl From<i64> for $name {
                fn from(value: i64) -> Self {
                    Self(RawId::Int(value))
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(RawId::Text(value.to_owned()))
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    self.0.fmt(f)
                }
            }
        )+
    };
}

record_id! {
    /// Stable identifier of the subject (`pat_id`).
    PatientId;
    /// Clinical-record wrapper scoped to one service type (`patrec_id`).
    PatientRecordId;
    /// Root family planning form (`fprecord_id`).
    FpRecordId;
    /// Visit classification (`fpt_id`).
    FpTypeId;
    RiskStiId;
    RiskVawId;
    /// Patient-wide obstetrical history row (`obs_id`).
    ObstetricalHistoryId;
    /// Intake-scoped obstetrical history row (`fpob_id`).
    FpObstetricalId;
    BodyMeasurementId;
    PhysicalExamId;
    PelvicExamId;
    AcknowledgementId;
    FollowUpVisitId;
    AssessmentId;
    PregnancyCheckId;
}
