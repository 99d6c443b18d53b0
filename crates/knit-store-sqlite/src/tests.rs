//! Integration tests for `SqliteStore` against an in-memory database.

use knit_core::{
  contact::ContactId,
  store::IdentityStore,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn count_rows(s: &SqliteStore) -> i64 {
  s.conn
    .call(|conn| {
      Ok(conn.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))?)
    })
    .await
    .unwrap()
}

async fn exec(s: &SqliteStore, sql: String) {
  s.conn
    .call(move |conn| {
      conn.execute_batch(&sql)?;
      Ok(())
    })
    .await
    .unwrap()
}

async fn linked_id_of(s: &SqliteStore, id: ContactId) -> Option<ContactId> {
  s.conn
    .call(move |conn| {
      Ok(conn.query_row(
        "SELECT linked_id FROM contacts WHERE id = ?1",
        rusqlite::params![id],
        |r| r.get(0),
      )?)
    })
    .await
    .unwrap()
}

fn s(v: &str) -> Option<String> {
  Some(v.to_owned())
}

// ─── Concrete scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_then_alias_then_repeat() {
  let store = store().await;

  // First observation creates a primary.
  let v1 = store
    .reconcile(s("lorraine@x.edu"), s("123456"))
    .await
    .unwrap();
  assert_eq!(v1.primary_id, 1);
  assert_eq!(v1.emails, vec!["lorraine@x.edu"]);
  assert_eq!(v1.phone_numbers, vec!["123456"]);
  assert!(v1.secondary_ids.is_empty());

  // New email on a known phone creates a secondary.
  let v2 = store
    .reconcile(s("mcfly@x.edu"), s("123456"))
    .await
    .unwrap();
  assert_eq!(v2.primary_id, 1);
  assert_eq!(v2.emails, vec!["lorraine@x.edu", "mcfly@x.edu"]);
  assert_eq!(v2.phone_numbers, vec!["123456"]);
  assert_eq!(v2.secondary_ids, vec![2]);

  // Repeating the original observation writes nothing.
  let v3 = store
    .reconcile(s("lorraine@x.edu"), s("123456"))
    .await
    .unwrap();
  assert_eq!(v3, v2);
  assert_eq!(count_rows(&store).await, 2);
}

#[tokio::test]
async fn bridging_request_demotes_younger_primary() {
  let store = store().await;

  store.reconcile(s("george@x.edu"), s("919191")).await.unwrap();
  store.reconcile(s("biff@x.edu"), s("717171")).await.unwrap();

  let view = store
    .reconcile(s("george@x.edu"), s("717171"))
    .await
    .unwrap();

  assert_eq!(view.primary_id, 1);
  assert_eq!(view.emails, vec!["george@x.edu", "biff@x.edu"]);
  assert_eq!(view.phone_numbers, vec!["919191", "717171"]);
  assert_eq!(view.secondary_ids, vec![2]);
  assert_eq!(linked_id_of(&store, 2).await, Some(1));

  let precedence: String = store
    .conn
    .call(|conn| {
      Ok(conn.query_row(
        "SELECT link_precedence FROM contacts WHERE id = 2",
        [],
        |r| r.get(0),
      )?)
    })
    .await
    .unwrap();
  assert_eq!(precedence, "secondary");

  // The bridging request itself added no row.
  assert_eq!(count_rows(&store).await, 2);
}

#[tokio::test]
async fn merge_relinks_whole_fanout() {
  let store = store().await;

  // Identity A (oldest).
  store.reconcile(s("a@x.edu"), s("100")).await.unwrap();
  // Identity B with two secondaries.
  store.reconcile(s("b@x.edu"), s("200")).await.unwrap();
  store.reconcile(s("b-alias@x.edu"), s("200")).await.unwrap();
  store.reconcile(s("b@x.edu"), s("201")).await.unwrap();

  // Bridge A and B.
  let view = store.reconcile(s("b@x.edu"), s("100")).await.unwrap();

  assert_eq!(view.primary_id, 1);
  assert_eq!(view.secondary_ids, vec![2, 3, 4]);
  for id in [2, 3, 4] {
    assert_eq!(linked_id_of(&store, id).await, Some(1));
  }
  assert_eq!(
    view.emails,
    vec!["a@x.edu", "b@x.edu", "b-alias@x.edu"]
  );
  assert_eq!(view.phone_numbers, vec!["100", "200", "201"]);
}

// ─── Reads exclude soft-deleted rows ─────────────────────────────────────────

#[tokio::test]
async fn soft_deleted_rows_are_invisible() {
  let store = store().await;

  store.reconcile(s("ghost@x.edu"), s("404")).await.unwrap();
  exec(
    &store,
    "UPDATE contacts SET deleted_at = '2024-01-01T00:00:00+00:00' WHERE id = 1"
      .to_owned(),
  )
  .await;

  // The deleted row no longer matches; a fresh primary is created.
  let view = store.reconcile(s("ghost@x.edu"), s("404")).await.unwrap();
  assert_eq!(view.primary_id, 2);
  assert!(view.secondary_ids.is_empty());
}

// ─── Corruption guards ───────────────────────────────────────────────────────

#[tokio::test]
async fn chain_past_hop_bound_is_consistency_error() {
  let store = store().await;

  // Hand-build a 12-deep chain (11 hops), deeper than the engine tolerates.
  let mut sql = String::from(
    "INSERT INTO contacts
       (id, email, linked_id, link_precedence, created_at, updated_at)
     VALUES (12, 'chain-12@x.edu', NULL, 'primary',
             '2024-01-01T00:00:12+00:00', '2024-01-01T00:00:12+00:00');\n",
  );
  for i in (1..=11).rev() {
    sql.push_str(&format!(
      "INSERT INTO contacts
         (id, email, linked_id, link_precedence, created_at, updated_at)
       VALUES ({i}, 'chain-{i}@x.edu', {next}, 'secondary',
               '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');\n",
      next = i + 1,
    ));
  }
  exec(&store, sql).await;

  let err = store
    .reconcile(s("chain-1@x.edu"), None)
    .await
    .unwrap_err();
  assert!(matches!(err, knit_core::Error::LinkDepthExceeded(1)));
}

#[tokio::test]
async fn link_to_soft_deleted_primary_is_consistency_error() {
  let store = store().await;

  store.reconcile(s("p@x.edu"), s("1")).await.unwrap();
  store.reconcile(s("s@x.edu"), s("1")).await.unwrap();
  // Delete the primary out from under its secondary.
  exec(
    &store,
    "UPDATE contacts SET deleted_at = '2024-01-01T00:00:00+00:00' WHERE id = 1"
      .to_owned(),
  )
  .await;

  let err = store.reconcile(s("s@x.edu"), None).await.unwrap_err();
  assert!(matches!(
    err,
    knit_core::Error::DanglingLink { contact: 2, linked_id: 1 }
  ));
}

// ─── Misc ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn phone_only_match_returns_full_identity() {
  let store = store().await;

  store.reconcile(s("doc@x.edu"), s("555")).await.unwrap();
  let view = store.reconcile(None, s("555")).await.unwrap();

  assert_eq!(view.primary_id, 1);
  assert_eq!(view.emails, vec!["doc@x.edu"]);
  assert_eq!(count_rows(&store).await, 1);
}

#[tokio::test]
async fn missing_both_fields_is_rejected() {
  let store = store().await;
  let err = store.reconcile(None, None).await.unwrap_err();
  assert!(matches!(err, knit_core::Error::MissingIdentifier));
}

#[tokio::test]
async fn email_only_primary_contributes_no_phone_entry() {
  let store = store().await;

  store.reconcile(s("nophone@x.edu"), None).await.unwrap();
  let view = store
    .reconcile(s("nophone@x.edu"), s("808"))
    .await
    .unwrap();

  // Phone list holds exactly the new value, no null/empty artifact.
  assert_eq!(view.phone_numbers, vec!["808"]);
  assert_eq!(view.emails, vec!["nophone@x.edu"]);
  assert_eq!(view.secondary_ids, vec![2]);
}
