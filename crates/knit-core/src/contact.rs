//! Contact — the single persisted entity.
//!
//! A contact carries at most two identity keys (email, phone number) and a
//! link to the primary it belongs to. Consolidated identities form a flat
//! star: one primary, zero or more secondaries pointing directly at it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned row identifier. Assigned monotonically, so id order and
/// creation order agree; used as the tie-break when two primaries share a
/// `created_at`.
pub type ContactId = i64;

/// Whether a contact is the canonical representative of its identity or a
/// subsumed record contributing extra fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
  Primary,
  Secondary,
}

/// A persisted contact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
  pub id:              ContactId,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  /// Owning primary; `Some` iff `link_precedence` is `Secondary`.
  pub linked_id:       Option<ContactId>,
  pub link_precedence: LinkPrecedence,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  /// Soft-delete marker. Rows with this set are invisible to all queries.
  pub deleted_at:      Option<DateTime<Utc>>,
}

impl Contact {
  pub fn is_primary(&self) -> bool {
    self.linked_id.is_none()
  }
}

/// Insert payload for a new contact. `linked_id: Some` creates a secondary
/// under that primary; `None` creates a fresh primary.
#[derive(Debug, Clone)]
pub struct NewContact {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
  pub linked_id:    Option<ContactId>,
}

/// The consolidated identity a `reconcile` call resolves to.
///
/// `emails` and `phone_numbers` list the primary's own value first (when
/// present), then secondaries' values in ascending creation order, with
/// duplicates removed on first occurrence. Null fields contribute nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityView {
  pub primary_id:    ContactId,
  pub emails:        Vec<String>,
  pub phone_numbers: Vec<String>,
  pub secondary_ids: Vec<ContactId>,
}
