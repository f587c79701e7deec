//! SQL schema for the Warden SQLite store.
//!
//! Executed once at connection startup. Stores created by an older version
//! are brought forward with [`MIGRATIONS`], gated on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS instances (
    instance_id    TEXT PRIMARY KEY,
    type_key       TEXT NOT NULL,
    status         TEXT NOT NULL,   -- 'draft' | 'published' | 'pending_review' | 'trashed'
    changeset_json TEXT,            -- JSON-encoded Changeset or NULL
    review_requested_by TEXT,       -- submitter of a drafted staff change
    created_at     TEXT NOT NULL,   -- ISO 8601 UTC
    updated_at     TEXT NOT NULL
);

-- One row per attribute. Replaced wholesale, inside one transaction, on
-- every put.
CREATE TABLE IF NOT EXISTS attributes (
    instance_id TEXT    NOT NULL REFERENCES instances(instance_id) ON DELETE CASCADE,
    attr_key    TEXT    NOT NULL,
    value_type  TEXT    NOT NULL,   -- discriminant of AttributeValue
    value_json  TEXT    NOT NULL,   -- JSON payload (inner data only)
    scalar      TEXT,               -- scalar form for equality filters
    is_empty    INTEGER NOT NULL,
    PRIMARY KEY (instance_id, attr_key)
);

-- Lowercased principal ids referenced by identity attributes; lets staff
-- scans run without decoding JSON.
CREATE TABLE IF NOT EXISTS identity_refs (
    instance_id  TEXT NOT NULL REFERENCES instances(instance_id) ON DELETE CASCADE,
    attr_key     TEXT NOT NULL,
    principal_id TEXT NOT NULL,
    PRIMARY KEY (instance_id, attr_key, principal_id)
);

CREATE INDEX IF NOT EXISTS instances_type_idx   ON instances(type_key, status);
CREATE INDEX IF NOT EXISTS attributes_key_idx   ON attributes(attr_key, scalar);
CREATE INDEX IF NOT EXISTS identity_refs_pr_idx ON identity_refs(principal_id);
";

pub const SCHEMA_VERSION: i64 = 2;

/// Statements that upgrade an existing store, keyed by the version that
/// introduced them.
pub const MIGRATIONS: &[(i64, &str)] =
  &[(2, "ALTER TABLE instances ADD COLUMN review_requested_by TEXT;")];
