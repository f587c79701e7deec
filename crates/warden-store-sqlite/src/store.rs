//! [`SqliteStore`]: the SQLite implementation of [`ContentRepository`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use warden_core::{
  entity::{EntityInstance, EntityStatus},
  repository::{AttributeFilter, ContentRepository, InstanceQuery},
};

use crate::{
  Result,
  encode::{
    EncodedAttribute, RawAttribute, RawInstance, encode_changeset, encode_dt,
    encode_status, encode_uuid,
  },
  schema::{MIGRATIONS, SCHEMA, SCHEMA_VERSION},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Warden content repository backed by a single SQLite file.
///
/// Cloning shares the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        // A fresh store already has every column.
        if version > 0 {
          for (introduced, sql) in MIGRATIONS {
            if *introduced > version {
              conn.execute_batch(sql)?;
            }
          }
        }
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Query building ──────────────────────────────────────────────────────────

/// Append the SQL for one attribute filter, pushing its parameters.
fn filter_sql(filter: &AttributeFilter, params: &mut Vec<Value>) -> String {
  const ATTR: &str =
    "EXISTS (SELECT 1 FROM attributes a WHERE a.instance_id = i.instance_id AND a.attr_key = ?";

  match filter {
    AttributeFilter::NonEmpty(key) => {
      params.push(Value::Text(key.clone()));
      format!("{ATTR} AND a.is_empty = 0)")
    }
    AttributeFilter::Equals { key, value } => {
      params.push(Value::Text(key.clone()));
      params.push(Value::Text(value.clone()));
      format!("{ATTR} AND a.scalar = ?)")
    }
    AttributeFilter::OneOf { key, values } => {
      if values.is_empty() {
        return "0".to_owned();
      }
      params.push(Value::Text(key.clone()));
      params.extend(values.iter().cloned().map(Value::Text));
      format!("{ATTR} AND a.scalar IN ({}))", placeholders(values.len()))
    }
    AttributeFilter::References { key, principal_id } => {
      params.push(Value::Text(key.clone()));
      params.push(Value::Text(principal_id.trim().to_lowercase()));
      "EXISTS (SELECT 1 FROM identity_refs r
               WHERE r.instance_id = i.instance_id
                 AND r.attr_key = ? AND r.principal_id = ?)"
        .to_owned()
    }
  }
}

fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

/// Build the full `SELECT` for an [`InstanceQuery`].
fn build_query(query: &InstanceQuery) -> (String, Vec<Value>) {
  let mut params = vec![Value::Text(query.type_key.clone())];
  let mut conds = vec!["i.type_key = ?".to_owned()];

  if !query.statuses.is_empty() {
    conds.push(format!("i.status IN ({})", placeholders(query.statuses.len())));
    params.extend(
      query
        .statuses
        .iter()
        .map(|s| Value::Text(encode_status(*s).to_owned())),
    );
  }

  for filter in &query.all_of {
    conds.push(filter_sql(filter, &mut params));
  }

  if !query.any_of.is_empty() {
    let alternatives: Vec<String> = query
      .any_of
      .iter()
      .map(|f| filter_sql(f, &mut params))
      .collect();
    conds.push(format!("({})", alternatives.join(" OR ")));
  }

  if let Some(id) = query.exclude_id {
    conds.push("i.instance_id <> ?".to_owned());
    params.push(Value::Text(encode_uuid(id)));
  }

  match query.has_pending_changeset {
    Some(true) => conds.push("i.changeset_json IS NOT NULL".to_owned()),
    Some(false) => conds.push("i.changeset_json IS NULL".to_owned()),
    None => {}
  }

  // SQLite treats a negative LIMIT as "no limit".
  let limit = query.limit.map_or(-1, |l| l as i64);
  params.push(Value::Integer(limit));

  let sql = format!(
    "SELECT i.instance_id FROM instances i
     WHERE {}
     ORDER BY i.created_at, i.instance_id
     LIMIT ?",
    conds.join(" AND ")
  );
  (sql, params)
}

// ─── ContentRepository impl ──────────────────────────────────────────────────

impl ContentRepository for SqliteStore {
  type Error = crate::Error;

  async fn get(&self, id: Uuid) -> Result<Option<EntityInstance>> {
    let id_str = encode_uuid(id);

    let raw: Option<(RawInstance, Vec<RawAttribute>)> = self
      .conn
      .call(move |conn| {
        let row = conn
          .query_row(
            "SELECT instance_id, type_key, status, changeset_json, review_requested_by,
                    created_at, updated_at
             FROM instances WHERE instance_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawInstance {
                instance_id:    row.get(0)?,
                type_key:       row.get(1)?,
                status:         row.get(2)?,
                changeset_json: row.get(3)?,
                review_by:      row.get(4)?,
                created_at:     row.get(5)?,
                updated_at:     row.get(6)?,
              })
            },
          )
          .optional()?;

        let Some(row) = row else {
          return Ok(None);
        };

        let mut stmt = conn.prepare(
          "SELECT attr_key, value_type, value_json FROM attributes
           WHERE instance_id = ?1 ORDER BY attr_key",
        )?;
        let attrs = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawAttribute {
              attr_key:   row.get(0)?,
              value_type: row.get(1)?,
              value_json: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((row, attrs)))
      })
      .await?;

    raw.map(|(row, attrs)| row.into_instance(attrs)).transpose()
  }

  async fn put(&self, instance: &EntityInstance) -> Result<()> {
    let id_str         = encode_uuid(instance.id);
    let type_key       = instance.type_key.clone();
    let status_str     = encode_status(instance.status);
    let changeset_json = instance
      .pending_changeset
      .as_ref()
      .map(encode_changeset)
      .transpose()?;
    let review_by      = instance.review_requested_by.clone();
    let created_str    = encode_dt(instance.created_at);
    let updated_str    = encode_dt(instance.updated_at);
    let attrs          = instance
      .attributes
      .iter()
      .map(|(k, v)| EncodedAttribute::new(k, v))
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO instances (
             instance_id, type_key, status, changeset_json, review_requested_by,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(instance_id) DO UPDATE SET
             type_key            = excluded.type_key,
             status              = excluded.status,
             changeset_json      = excluded.changeset_json,
             review_requested_by = excluded.review_requested_by,
             updated_at          = excluded.updated_at",
          rusqlite::params![
            id_str,
            type_key,
            status_str,
            changeset_json,
            review_by,
            created_str,
            updated_str,
          ],
        )?;
        tx.execute(
          "DELETE FROM attributes WHERE instance_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM identity_refs WHERE instance_id = ?1",
          rusqlite::params![id_str],
        )?;

        for attr in &attrs {
          tx.execute(
            "INSERT INTO attributes (
               instance_id, attr_key, value_type, value_json, scalar, is_empty
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              id_str,
              attr.key,
              attr.value_type,
              attr.value_json,
              attr.scalar,
              attr.is_empty,
            ],
          )?;
          for principal in &attr.principals {
            tx.execute(
              "INSERT OR IGNORE INTO identity_refs (instance_id, attr_key, principal_id)
               VALUES (?1, ?2, ?3)",
              rusqlite::params![id_str, attr.key, principal],
            )?;
          }
        }

        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query(&self, query: &InstanceQuery) -> Result<Vec<Uuid>> {
    let (sql, params) = build_query(query);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| crate::encode::decode_uuid(s)).collect()
  }

  async fn set_status(&self, id: Uuid, status: EntityStatus) -> Result<bool> {
    let id_str     = encode_uuid(id);
    let status_str = encode_status(status);
    let at_str     = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE instances SET status = ?1, updated_at = ?2 WHERE instance_id = ?3",
          rusqlite::params![status_str, at_str, id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }
}
