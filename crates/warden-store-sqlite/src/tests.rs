//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;
use warden_core::{
  attribute::{AttributeMap, AttributeValue, IdentityRef},
  entity::{Changeset, EntityInstance, EntityStatus},
  repository::{AttributeFilter, ContentRepository, InstanceQuery},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A chronicle instance created `age_secs` seconds ago, so ordering by
/// creation time is deterministic.
fn chronicle(slug: &str, hst: &str, age_secs: i64) -> EntityInstance {
  let mut inst = EntityInstance::new("chronicle");
  inst.created_at = Utc::now() - Duration::seconds(age_secs);
  inst.updated_at = inst.created_at;
  inst
    .attributes
    .insert("chronicle_slug".into(), AttributeValue::text(slug));
  inst.attributes.insert(
    "hst_info".into(),
    AttributeValue::identity(hst, "Head Storyteller", "hst@example.com"),
  );
  inst
}

// ─── get / put ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get_round_trips_every_value_shape() {
  let s = store().await;

  let mut inst = chronicle("abc", "7", 0);
  inst.status = EntityStatus::Published;
  let attrs = &mut inst.attributes;
  attrs.insert("chronicle_satellite".into(), AttributeValue::Flag(true));
  attrs.insert("max_players".into(), AttributeValue::Number(40));
  attrs.insert(
    "active_since".into(),
    AttributeValue::Date(NaiveDate::from_ymd_opt(2019, 4, 1).unwrap()),
  );
  attrs.insert(
    "genres".into(),
    AttributeValue::List(vec!["vampire".into(), "werewolf".into()]),
  );
  attrs.insert("banner".into(), AttributeValue::Opaque("upload:991".into()));

  s.put(&inst).await.unwrap();

  let fetched = s.get(inst.id).await.unwrap().expect("instance exists");
  assert_eq!(fetched.id, inst.id);
  assert_eq!(fetched.status, EntityStatus::Published);
  assert_eq!(fetched.attributes, inst.attributes);
  assert!(fetched.pending_changeset.is_none());
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn put_replaces_attributes_wholesale() {
  let s = store().await;

  let mut inst = chronicle("abc", "7", 0);
  inst
    .attributes
    .insert("region".into(), AttributeValue::text("north"));
  s.put(&inst).await.unwrap();

  inst.attributes.remove("region");
  inst.status = EntityStatus::Published;
  s.put(&inst).await.unwrap();

  let fetched = s.get(inst.id).await.unwrap().unwrap();
  assert!(fetched.attribute("region").is_none());
  assert_eq!(fetched.status, EntityStatus::Published);
}

#[tokio::test]
async fn pending_changeset_is_stored_and_cleared() {
  let s = store().await;

  let mut inst = chronicle("abc", "7", 0);
  let mut fields = AttributeMap::new();
  fields.insert(
    "cm_info".into(),
    AttributeValue::identity("8", "Council Member", "cm@example.com"),
  );
  inst.pending_changeset = Some(Changeset {
    fields,
    submitted_by: "8".into(),
    submitted_at: Utc::now(),
    self_promoted: true,
  });
  s.put(&inst).await.unwrap();

  let fetched = s.get(inst.id).await.unwrap().unwrap();
  let changeset = fetched.pending_changeset.expect("changeset stored");
  assert_eq!(changeset.submitted_by, "8");
  assert!(changeset.self_promoted);

  inst.pending_changeset = None;
  s.put(&inst).await.unwrap();
  let fetched = s.get(inst.id).await.unwrap().unwrap();
  assert!(fetched.pending_changeset.is_none());
}

#[tokio::test]
async fn review_hold_is_stored_and_cleared() {
  let s = store().await;

  let mut inst = chronicle("abc", "7", 0);
  inst.review_requested_by = Some("7".into());
  s.put(&inst).await.unwrap();
  let fetched = s.get(inst.id).await.unwrap().unwrap();
  assert_eq!(fetched.review_requested_by.as_deref(), Some("7"));

  inst.review_requested_by = None;
  s.put(&inst).await.unwrap();
  let fetched = s.get(inst.id).await.unwrap().unwrap();
  assert!(fetched.review_requested_by.is_none());
}

#[tokio::test]
async fn version_one_store_is_migrated_on_open() {
  let path = std::env::temp_dir().join(format!("warden-{}.db", Uuid::new_v4()));
  {
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "CREATE TABLE instances (
           instance_id    TEXT PRIMARY KEY,
           type_key       TEXT NOT NULL,
           status         TEXT NOT NULL,
           changeset_json TEXT,
           created_at     TEXT NOT NULL,
           updated_at     TEXT NOT NULL
         );
         PRAGMA user_version = 1;",
      )
      .unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let mut inst = chronicle("abc", "7", 0);
  inst.review_requested_by = Some("7".into());
  s.put(&inst).await.unwrap();
  let fetched = s.get(inst.id).await.unwrap().unwrap();
  assert_eq!(fetched.review_requested_by.as_deref(), Some("7"));

  drop(s);
  for suffix in ["", "-wal", "-shm"] {
    let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
  }
}

// ─── set_status ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn set_status_updates_existing_only() {
  let s = store().await;
  let inst = chronicle("abc", "7", 0);
  s.put(&inst).await.unwrap();

  assert!(s.set_status(inst.id, EntityStatus::Trashed).await.unwrap());
  let fetched = s.get(inst.id).await.unwrap().unwrap();
  assert_eq!(fetched.status, EntityStatus::Trashed);
  assert_eq!(fetched.attributes, inst.attributes);

  assert!(!s.set_status(Uuid::new_v4(), EntityStatus::Trashed).await.unwrap());
}

// ─── query ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_filters_by_type_and_status_oldest_first() {
  let s = store().await;

  let old = chronicle("old", "1", 30);
  let new = chronicle("new", "2", 10);
  let mut trashed = chronicle("gone", "3", 20);
  trashed.status = EntityStatus::Trashed;
  let mut other = EntityInstance::new("coordinator");
  other.created_at = Utc::now() - Duration::seconds(40);

  for inst in [&new, &old, &trashed, &other] {
    s.put(inst).await.unwrap();
  }

  let ids = s
    .query(&InstanceQuery::for_type("chronicle").statuses(EntityStatus::LIVE))
    .await
    .unwrap();
  assert_eq!(ids, vec![old.id, new.id]);

  let all = s.query(&InstanceQuery::for_type("chronicle")).await.unwrap();
  assert_eq!(all, vec![old.id, trashed.id, new.id]);

  let limited = s
    .query(&InstanceQuery::for_type("chronicle").limit(1))
    .await
    .unwrap();
  assert_eq!(limited, vec![old.id]);
}

#[tokio::test]
async fn query_by_scalar_equality_and_exclusion() {
  let s = store().await;
  let a = chronicle("abc", "1", 20);
  let b = chronicle("xyz", "2", 10);
  s.put(&a).await.unwrap();
  s.put(&b).await.unwrap();

  let eq = AttributeFilter::Equals {
    key:   "chronicle_slug".into(),
    value: "abc".into(),
  };
  let ids = s
    .query(&InstanceQuery::for_type("chronicle").all_of(eq.clone()))
    .await
    .unwrap();
  assert_eq!(ids, vec![a.id]);

  let ids = s
    .query(&InstanceQuery::for_type("chronicle").all_of(eq).excluding(a.id))
    .await
    .unwrap();
  assert!(ids.is_empty());

  let one_of = AttributeFilter::OneOf {
    key:    "chronicle_slug".into(),
    values: vec!["xyz".into(), "nope".into()],
  };
  let ids = s
    .query(&InstanceQuery::for_type("chronicle").all_of(one_of))
    .await
    .unwrap();
  assert_eq!(ids, vec![b.id]);

  let empty_one_of = AttributeFilter::OneOf {
    key:    "chronicle_slug".into(),
    values: vec![],
  };
  let ids = s
    .query(&InstanceQuery::for_type("chronicle").all_of(empty_one_of))
    .await
    .unwrap();
  assert!(ids.is_empty());
}

#[tokio::test]
async fn flags_compare_as_one_and_zero() {
  let s = store().await;
  let mut sat = chronicle("sat", "1", 20);
  sat
    .attributes
    .insert("chronicle_satellite".into(), AttributeValue::Flag(true));
  let mut main = chronicle("main", "2", 10);
  main
    .attributes
    .insert("chronicle_satellite".into(), AttributeValue::Flag(false));
  s.put(&sat).await.unwrap();
  s.put(&main).await.unwrap();

  let ids = s
    .query(&InstanceQuery::for_type("chronicle").all_of(AttributeFilter::Equals {
      key:   "chronicle_satellite".into(),
      value: "1".into(),
    }))
    .await
    .unwrap();
  assert_eq!(ids, vec![sat.id]);

  let ids = s
    .query(
      &InstanceQuery::for_type("chronicle")
        .all_of(AttributeFilter::NonEmpty("chronicle_satellite".into())),
    )
    .await
    .unwrap();
  assert_eq!(ids, vec![sat.id]);
}

#[tokio::test]
async fn references_match_case_insensitively_across_any_of() {
  let s = store().await;

  let mut a = chronicle("abc", "Alice", 30);
  a.attributes.insert(
    "ast_list".into(),
    AttributeValue::Identity(vec![
      IdentityRef::new("carol", "Carol", "c@example.com"),
      IdentityRef::new("dave", "Dave", "d@example.com"),
    ]),
  );
  let b = chronicle("def", "bob", 20);
  let c = chronicle("ghi", "carol", 10);
  for inst in [&a, &b, &c] {
    s.put(inst).await.unwrap();
  }

  let staff_of = |principal: &str| {
    ["hst_info", "cm_info", "ast_list"]
      .into_iter()
      .fold(InstanceQuery::for_type("chronicle"), |q, key| {
        q.any_of(AttributeFilter::References {
          key:          key.into(),
          principal_id: principal.into(),
        })
      })
  };

  assert_eq!(s.query(&staff_of("alice")).await.unwrap(), vec![a.id]);
  assert_eq!(s.query(&staff_of("CAROL")).await.unwrap(), vec![a.id, c.id]);
  assert!(s.query(&staff_of("erin")).await.unwrap().is_empty());
}

#[tokio::test]
async fn query_by_pending_changeset() {
  let s = store().await;
  let clean = chronicle("abc", "1", 20);
  let mut pending = chronicle("def", "2", 10);
  pending.pending_changeset = Some(Changeset {
    fields:        AttributeMap::new(),
    submitted_by:  "2".into(),
    submitted_at:  Utc::now(),
    self_promoted: false,
  });
  s.put(&clean).await.unwrap();
  s.put(&pending).await.unwrap();

  let ids = s
    .query(&InstanceQuery::for_type("chronicle").pending(true))
    .await
    .unwrap();
  assert_eq!(ids, vec![pending.id]);

  let ids = s
    .query(&InstanceQuery::for_type("chronicle").pending(false))
    .await
    .unwrap();
  assert_eq!(ids, vec![clean.id]);
}
