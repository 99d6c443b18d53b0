//! Store abstractions: the per-transaction operations the engine runs
//! against, and the async contract backends expose to the transport layer.
//!
//! Higher layers (`knit-api`) depend on these traits, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  contact::{Contact, ContactId, IdentityView, NewContact},
  error::{Error, Result},
};

/// Total attempts a backend makes on a transaction that keeps failing with
/// [`Error::Conflict`]. Retries are immediate; exhausting the budget surfaces
/// [`Error::ConflictExhausted`].
pub const MAX_TXN_ATTEMPTS: u32 = 3;

// ─── Transaction operations ──────────────────────────────────────────────────

/// The store operations available inside one serializable transaction.
///
/// The engine ([`crate::engine::reconcile`]) is generic over this trait and
/// runs synchronously, so the whole algorithm executes inside whatever
/// transaction the backend opens around it. Every read excludes soft-deleted
/// rows.
pub trait ContactTxn {
  /// All contacts whose email equals `email`, ascending id.
  fn find_by_email(&mut self, email: &str) -> Result<Vec<Contact>>;

  /// All contacts whose phone number equals `phone_number`, ascending id.
  fn find_by_phone(&mut self, phone_number: &str) -> Result<Vec<Contact>>;

  /// Point read. Returns `None` if the row is missing or soft-deleted.
  fn find_by_id(&mut self, id: ContactId) -> Result<Option<Contact>>;

  /// All secondaries linked directly to `primary_id`, ascending id
  /// (equivalently, ascending creation order).
  fn secondaries_of(&mut self, primary_id: ContactId) -> Result<Vec<Contact>>;

  /// Insert a new contact and return the persisted row. Timestamps and the
  /// id are assigned by the store.
  fn insert(&mut self, input: NewContact) -> Result<Contact>;

  /// Bulk re-link: point every secondary of `from` at `to` instead.
  /// Returns the number of rows updated.
  fn relink_secondaries(&mut self, from: ContactId, to: ContactId) -> Result<usize>;

  /// Flip `id` from primary to secondary under `new_primary`.
  fn demote_primary(&mut self, id: ContactId, new_primary: ContactId) -> Result<()>;
}

// ─── Public contract ─────────────────────────────────────────────────────────

/// The one operation a Knit backend exposes.
///
/// Implementations must execute the whole reconciliation atomically under
/// serializable isolation, retrying transient conflicts up to
/// [`MAX_TXN_ATTEMPTS`]. All methods return `Send` futures so the trait can
/// be used in multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait IdentityStore: Send + Sync {
  /// Resolve `(email, phone_number)` to its consolidated identity, creating
  /// or merging contacts as needed. Inputs are expected pre-normalized;
  /// both-`None` fails with [`Error::MissingIdentifier`].
  fn reconcile(
    &self,
    email: Option<String>,
    phone_number: Option<String>,
  ) -> impl Future<Output = Result<IdentityView, Error>> + Send + '_;
}
