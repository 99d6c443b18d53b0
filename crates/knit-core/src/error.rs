//! Error types for `knit-core`.

use thiserror::Error;

use crate::contact::ContactId;

#[derive(Debug, Error)]
pub enum Error {
  /// Both identity fields were null. The transport layer validates this
  /// before calling the engine; hitting it here is a contract violation.
  #[error("at least one of email or phone number must be provided")]
  MissingIdentifier,

  /// Following `linked_id` from this contact did not reach a primary within
  /// the hop bound. Signals data corruption; never retried.
  #[error("link chain from contact {0} exceeds {max} hops", max = crate::engine::MAX_LINK_HOPS)]
  LinkDepthExceeded(ContactId),

  /// A secondary's `linked_id` referenced a missing or deleted row. Signals
  /// data corruption; never retried.
  #[error("contact {contact} links to missing contact {linked_id}")]
  DanglingLink {
    contact:   ContactId,
    linked_id: ContactId,
  },

  /// Transient serialization conflict. Consumed by the backend's retry loop;
  /// only escapes as [`Error::ConflictExhausted`].
  #[error("serialization conflict")]
  Conflict,

  /// The retry budget for serialization conflicts was spent.
  #[error("serialization conflict persisted after {0} attempts")]
  ConflictExhausted(u32),

  /// Any other backend failure, propagated unmodified.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
