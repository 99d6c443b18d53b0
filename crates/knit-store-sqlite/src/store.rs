//! [`SqliteStore`] — the SQLite implementation of [`IdentityStore`].

use std::path::Path;

use chrono::Utc;
use knit_core::{
  contact::{Contact, ContactId, IdentityView, LinkPrecedence, NewContact},
  engine,
  store::{ContactTxn, IdentityStore, MAX_TXN_ATTEMPTS},
};
use rusqlite::TransactionBehavior;

use crate::{
  encode::{CONTACT_COLUMNS, RawContact, encode_dt, encode_precedence},
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Knit identity store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
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
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── IdentityStore impl ──────────────────────────────────────────────────────

impl IdentityStore for SqliteStore {
  async fn reconcile(
    &self,
    email: Option<String>,
    phone_number: Option<String>,
  ) -> knit_core::Result<IdentityView> {
    self
      .conn
      .call(move |conn| {
        Ok(reconcile_with_retry(
          conn,
          email.as_deref(),
          phone_number.as_deref(),
        ))
      })
      .await
      .map_err(|e| knit_core::Error::Store(Box::new(e)))?
  }
}

/// Re-execute the whole transaction body from scratch on conflict, up to the
/// attempt budget. Retries are immediate.
fn reconcile_with_retry(
  conn: &mut rusqlite::Connection,
  email: Option<&str>,
  phone_number: Option<&str>,
) -> knit_core::Result<IdentityView> {
  for _ in 0..MAX_TXN_ATTEMPTS {
    match reconcile_once(conn, email, phone_number) {
      Err(knit_core::Error::Conflict) => continue,
      other => return other,
    }
  }
  Err(knit_core::Error::ConflictExhausted(MAX_TXN_ATTEMPTS))
}

/// One attempt: run the core engine inside an IMMEDIATE transaction.
///
/// IMMEDIATE takes the write lock up front, so the reads, merge writes, and
/// insert all happen under SQLite's serializable single-writer discipline.
/// An error from the engine drops the transaction, rolling everything back.
fn reconcile_once(
  conn: &mut rusqlite::Connection,
  email: Option<&str>,
  phone_number: Option<&str>,
) -> knit_core::Result<IdentityView> {
  let tx = conn
    .transaction_with_behavior(TransactionBehavior::Immediate)
    .map_err(classify)?;

  let view = {
    let mut txn = SqliteTxn { tx: &tx };
    engine::reconcile(&mut txn, email, phone_number)?
  };

  tx.commit().map_err(classify)?;
  Ok(view)
}

/// Map SQLite busy/locked to the transient-conflict class; everything else
/// propagates unmodified as a store failure.
fn classify(e: rusqlite::Error) -> knit_core::Error {
  use rusqlite::ErrorCode::{DatabaseBusy, DatabaseLocked};
  match e.sqlite_error_code() {
    Some(DatabaseBusy) | Some(DatabaseLocked) => knit_core::Error::Conflict,
    _ => knit_core::Error::Store(Box::new(e)),
  }
}

fn decode_err(e: crate::Error) -> knit_core::Error {
  knit_core::Error::Store(Box::new(e))
}

// ─── ContactTxn impl ─────────────────────────────────────────────────────────

/// [`ContactTxn`] over one open rusqlite transaction.
struct SqliteTxn<'a> {
  tx: &'a rusqlite::Transaction<'a>,
}

impl SqliteTxn<'_> {
  fn query_contacts(
    &self,
    sql: &str,
    params: impl rusqlite::Params,
  ) -> knit_core::Result<Vec<Contact>> {
    let mut stmt = self.tx.prepare(sql).map_err(classify)?;
    let raws = stmt
      .query_map(params, RawContact::from_row)
      .map_err(classify)?
      .collect::<rusqlite::Result<Vec<RawContact>>>()
      .map_err(classify)?;
    raws
      .into_iter()
      .map(|r| r.into_contact().map_err(decode_err))
      .collect()
  }
}

impl ContactTxn for SqliteTxn<'_> {
  fn find_by_email(&mut self, email: &str) -> knit_core::Result<Vec<Contact>> {
    self.query_contacts(
      &format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts
         WHERE email = ?1 AND deleted_at IS NULL
         ORDER BY id"
      ),
      rusqlite::params![email],
    )
  }

  fn find_by_phone(&mut self, phone_number: &str) -> knit_core::Result<Vec<Contact>> {
    self.query_contacts(
      &format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts
         WHERE phone_number = ?1 AND deleted_at IS NULL
         ORDER BY id"
      ),
      rusqlite::params![phone_number],
    )
  }

  fn find_by_id(&mut self, id: ContactId) -> knit_core::Result<Option<Contact>> {
    Ok(
      self
        .query_contacts(
          &format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE id = ?1 AND deleted_at IS NULL"
          ),
          rusqlite::params![id],
        )?
        .into_iter()
        .next(),
    )
  }

  fn secondaries_of(&mut self, primary_id: ContactId) -> knit_core::Result<Vec<Contact>> {
    self.query_contacts(
      &format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts
         WHERE linked_id = ?1 AND deleted_at IS NULL
         ORDER BY id"
      ),
      rusqlite::params![primary_id],
    )
  }

  fn insert(&mut self, input: NewContact) -> knit_core::Result<Contact> {
    let now = Utc::now();
    let now_str = encode_dt(now);
    let precedence = if input.linked_id.is_some() {
      LinkPrecedence::Secondary
    } else {
      LinkPrecedence::Primary
    };

    self
      .tx
      .execute(
        "INSERT INTO contacts
           (email, phone_number, linked_id, link_precedence, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        rusqlite::params![
          input.email,
          input.phone_number,
          input.linked_id,
          encode_precedence(precedence),
          now_str,
        ],
      )
      .map_err(classify)?;

    Ok(Contact {
      id: self.tx.last_insert_rowid(),
      email: input.email,
      phone_number: input.phone_number,
      linked_id: input.linked_id,
      link_precedence: precedence,
      created_at: now,
      updated_at: now,
      deleted_at: None,
    })
  }

  fn relink_secondaries(
    &mut self,
    from: ContactId,
    to: ContactId,
  ) -> knit_core::Result<usize> {
    self
      .tx
      .execute(
        "UPDATE contacts SET linked_id = ?2, updated_at = ?3
         WHERE linked_id = ?1 AND deleted_at IS NULL",
        rusqlite::params![from, to, encode_dt(Utc::now())],
      )
      .map_err(classify)
  }

  fn demote_primary(
    &mut self,
    id: ContactId,
    new_primary: ContactId,
  ) -> knit_core::Result<()> {
    self
      .tx
      .execute(
        "UPDATE contacts
         SET link_precedence = 'secondary', linked_id = ?2, updated_at = ?3
         WHERE id = ?1 AND deleted_at IS NULL",
        rusqlite::params![id, new_primary, encode_dt(Utc::now())],
      )
      .map_err(classify)?;
    Ok(())
  }
}
