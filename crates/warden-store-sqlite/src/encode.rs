//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Attribute payloads and
//! changesets are stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use warden_core::{
  attribute::{AttributeMap, AttributeValue},
  entity::{Changeset, EntityInstance, EntityStatus},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EntityStatus ────────────────────────────────────────────────────────────

pub fn encode_status(status: EntityStatus) -> &'static str { status.into() }

pub fn decode_status(s: &str) -> Result<EntityStatus> {
  s.parse().map_err(|_| Error::UnknownStatus(s.to_owned()))
}

// ─── Changeset ───────────────────────────────────────────────────────────────

pub fn encode_changeset(c: &Changeset) -> Result<String> {
  Ok(serde_json::to_string(c)?)
}

pub fn decode_changeset(s: &str) -> Result<Changeset> {
  Ok(serde_json::from_str(s)?)
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// Column values for one `attributes` row, ready to insert.
pub struct EncodedAttribute {
  pub key:        String,
  pub value_type: &'static str,
  pub value_json: String,
  pub scalar:     Option<String>,
  pub is_empty:   bool,
  /// Rows for `identity_refs`.
  pub principals: Vec<String>,
}

impl EncodedAttribute {
  pub fn new(key: &str, value: &AttributeValue) -> Result<Self> {
    Ok(Self {
      key:        key.to_owned(),
      value_type: value.discriminant(),
      value_json: value.to_json()?.to_string(),
      scalar:     value.as_scalar().map(|s| s.into_owned()),
      is_empty:   value.is_empty(),
      principals: value.principal_set().into_iter().collect(),
    })
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `instances` row.
pub struct RawInstance {
  pub instance_id:    String,
  pub type_key:       String,
  pub status:         String,
  pub changeset_json: Option<String>,
  pub review_by:      Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
}

/// Raw strings read directly from an `attributes` row.
pub struct RawAttribute {
  pub attr_key:   String,
  pub value_type: String,
  pub value_json: String,
}

impl RawInstance {
  pub fn into_instance(self, attrs: Vec<RawAttribute>) -> Result<EntityInstance> {
    let mut attributes = AttributeMap::new();
    for raw in attrs {
      let data: serde_json::Value = serde_json::from_str(&raw.value_json)?;
      let value = AttributeValue::from_parts(&raw.value_type, data)?;
      attributes.insert(raw.attr_key, value);
    }

    Ok(EntityInstance {
      id: decode_uuid(&self.instance_id)?,
      type_key: self.type_key,
      status: decode_status(&self.status)?,
      attributes,
      pending_changeset: self
        .changeset_json
        .as_deref()
        .map(decode_changeset)
        .transpose()?,
      review_requested_by: self.review_by,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
