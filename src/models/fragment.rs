//! The fragment entity: a validated metadata record describing one stored blob.

use crate::{
    models::types::{TypeFamily, TypeRegistry, base_type},
    services::convert::ConversionError,
    storage::StorageError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("{0}")]
    Invalid(String),
    #[error("type `{0}` is not supported")]
    UnsupportedType(String),
    #[error("fragment `{id}` not found")]
    NotFound { id: String },
    #[error("data for fragment `{id}` not found")]
    MissingData { id: String },
    #[error("cannot convert `{from}` to `.{ext}`")]
    UnsupportedConversion { from: String, ext: String },
    #[error("type `{stored}` cannot be changed to `{requested}` after creation")]
    ImmutableType { stored: String, requested: String },
    #[error("stored fragment `{id}` is invalid: {reason}")]
    Corrupt { id: String, reason: String },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type FragmentResult<T> = Result<T, FragmentError>;

/// Construction input. Everything but `owner_id` and `content_type` is optional.
#[derive(Clone, Debug, Default)]
pub struct FragmentInit {
    pub id: Option<String>,
    pub owner_id: String,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub content_type: String,
    pub size: Option<i64>,
}

impl FragmentInit {
    pub fn new(owner_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            content_type: content_type.into(),
            ..Self::default()
        }
    }
}

/// Metadata row as persisted by a storage backend.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRecord {
    pub id: String,
    pub owner_id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: i64,
}

/// A validated fragment. Only obtainable through [`Fragment::new`] or
/// [`Fragment::from_record`], so every instance satisfies the type and size rules.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    id: String,
    owner_id: String,
    #[serde(with = "iso_millis")]
    created: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    updated: DateTime<Utc>,
    #[serde(rename = "type")]
    content_type: String,
    size: u64,
    #[serde(skip)]
    family: TypeFamily,
}

impl Fragment {
    pub fn new(init: FragmentInit, types: &TypeRegistry) -> FragmentResult<Self> {
        if init.owner_id.is_empty() || init.content_type.is_empty() {
            return Err(FragmentError::Invalid(
                "ownerId and type are required".into(),
            ));
        }
        let family = types
            .family(&init.content_type)
            .ok_or_else(|| FragmentError::UnsupportedType(init.content_type.clone()))?;
        let size = match init.size {
            None => 0,
            Some(size) => u64::try_from(size).map_err(|_| {
                FragmentError::Invalid("size must be a number and cannot be negative".into())
            })?,
        };

        let now = Utc::now();
        Ok(Self {
            id: init.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            owner_id: init.owner_id,
            created: init.created.unwrap_or(now),
            updated: init.updated.unwrap_or(now),
            content_type: init.content_type,
            size,
            family,
        })
    }

    /// Rebuild a fragment from a stored row, re-running construction checks.
    pub fn from_record(record: FragmentRecord, types: &TypeRegistry) -> FragmentResult<Self> {
        let id = record.id.clone();
        Fragment::new(
            FragmentInit {
                id: Some(record.id),
                owner_id: record.owner_id,
                created: Some(record.created),
                updated: Some(record.updated),
                content_type: record.content_type,
                size: Some(record.size),
            },
            types,
        )
        .map_err(|err| FragmentError::Corrupt {
            id,
            reason: err.to_string(),
        })
    }

    pub fn to_record(&self) -> FragmentRecord {
        FragmentRecord {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            created: self.created,
            updated: self.updated,
            content_type: self.content_type.clone(),
            size: i64::try_from(self.size).unwrap_or(i64::MAX),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Full content type as supplied at creation, parameters included.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn family(&self) -> TypeFamily {
        self.family
    }

    /// Base MIME type: `text/plain; charset=utf-8` -> `text/plain`.
    pub fn mime_type(&self) -> String {
        base_type(&self.content_type)
    }

    pub fn is_text(&self) -> bool {
        self.mime_type().starts_with("text/")
    }

    /// MIME types this fragment can be converted into, in preference order.
    pub fn formats(&self) -> &'static [&'static str] {
        self.family.targets()
    }

    pub(crate) fn touch(&mut self) {
        self.updated = Utc::now();
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size as u64;
    }
}

/// `2024-05-01T12:30:00.000Z` style timestamps.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}
