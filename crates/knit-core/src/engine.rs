//! The identity reconciliation algorithm.
//!
//! [`reconcile`] is synchronous and generic over [`ContactTxn`], so backends
//! run it inside a transaction of their choosing. Correctness depends on that
//! transaction being serializable: the match lookup, root resolution, merge
//! writes, new-secondary insert, and final view read must observe one
//! consistent snapshot.

use std::collections::HashSet;

use crate::{
  contact::{Contact, ContactId, IdentityView, NewContact},
  error::{Error, Result},
  store::ContactTxn,
};

/// Maximum `linked_id` hops followed when resolving a root primary. The
/// steady-state structure is flat (one hop), so anything deeper than this is
/// corruption, not a long chain.
pub const MAX_LINK_HOPS: usize = 10;

/// Resolve `(email, phone_number)` against the contact table.
///
/// Creates a fresh primary when nothing matches, a secondary when the input
/// carries a field the matched identity has not seen, and demotes younger
/// primaries under the oldest one when the input bridges two identities.
/// An input that adds no information performs zero writes.
pub fn reconcile<T: ContactTxn>(
  txn: &mut T,
  email: Option<&str>,
  phone_number: Option<&str>,
) -> Result<IdentityView> {
  if email.is_none() && phone_number.is_none() {
    return Err(Error::MissingIdentifier);
  }

  let matches = lookup_matches(txn, email, phone_number)?;

  if matches.is_empty() {
    let created = txn.insert(NewContact {
      email:        email.map(str::to_owned),
      phone_number: phone_number.map(str::to_owned),
      linked_id:    None,
    })?;
    return Ok(assemble_view(&created, &[]));
  }

  // Resolve every match to its root primary and collect the distinct roots,
  // oldest first.
  let mut roots: Vec<Contact> = Vec::new();
  for contact in &matches {
    let root = resolve_root(txn, contact)?;
    if !roots.iter().any(|r| r.id == root.id) {
      roots.push(root);
    }
  }
  roots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

  let survivor = roots[0].clone();

  // Merge step: fold every younger root into the survivor. Re-linking the
  // target's secondaries first keeps the structure flat at every point.
  for target in &roots[1..] {
    txn.relink_secondaries(target.id, survivor.id)?;
    txn.demote_primary(target.id, survivor.id)?;
  }

  // New-information check against everything now under the survivor.
  let secondaries = txn.secondaries_of(survivor.id)?;
  let known_emails: HashSet<&str> = std::iter::once(&survivor)
    .chain(secondaries.iter())
    .filter_map(|c| c.email.as_deref())
    .collect();
  let known_phones: HashSet<&str> = std::iter::once(&survivor)
    .chain(secondaries.iter())
    .filter_map(|c| c.phone_number.as_deref())
    .collect();

  let novel_email = email.is_some_and(|e| !known_emails.contains(e));
  let novel_phone = phone_number.is_some_and(|p| !known_phones.contains(p));

  if novel_email || novel_phone {
    txn.insert(NewContact {
      email:        email.map(str::to_owned),
      phone_number: phone_number.map(str::to_owned),
      linked_id:    Some(survivor.id),
    })?;
  }

  // Re-read so the view reflects the merge and any insert above.
  let secondaries = txn.secondaries_of(survivor.id)?;
  Ok(assemble_view(&survivor, &secondaries))
}

/// Union of email and phone matches, deduplicated by id.
fn lookup_matches<T: ContactTxn>(
  txn: &mut T,
  email: Option<&str>,
  phone_number: Option<&str>,
) -> Result<Vec<Contact>> {
  let mut matches: Vec<Contact> = Vec::new();
  let mut seen: HashSet<ContactId> = HashSet::new();

  if let Some(e) = email {
    for contact in txn.find_by_email(e)? {
      if seen.insert(contact.id) {
        matches.push(contact);
      }
    }
  }
  if let Some(p) = phone_number {
    for contact in txn.find_by_phone(p)? {
      if seen.insert(contact.id) {
        matches.push(contact);
      }
    }
  }
  Ok(matches)
}

/// Follow `linked_id` until a primary is reached, for at most
/// [`MAX_LINK_HOPS`] hops past the starting record.
fn resolve_root<T: ContactTxn>(txn: &mut T, contact: &Contact) -> Result<Contact> {
  let mut current = contact.clone();
  for _ in 0..=MAX_LINK_HOPS {
    let parent_id = match current.linked_id {
      None => return Ok(current),
      Some(id) => id,
    };
    current = txn
      .find_by_id(parent_id)?
      .ok_or(Error::DanglingLink { contact: current.id, linked_id: parent_id })?;
  }
  Err(Error::LinkDepthExceeded(contact.id))
}

/// Build the result view: primary's fields first, then secondaries in
/// creation order, first-occurrence dedup, nulls excluded.
fn assemble_view(primary: &Contact, secondaries: &[Contact]) -> IdentityView {
  let mut emails = Vec::new();
  let mut phone_numbers = Vec::new();

  for contact in std::iter::once(primary).chain(secondaries.iter()) {
    if let Some(e) = &contact.email
      && !emails.contains(e)
    {
      emails.push(e.clone());
    }
    if let Some(p) = &contact.phone_number
      && !phone_numbers.contains(p)
    {
      phone_numbers.push(p.clone());
    }
  }

  IdentityView {
    primary_id: primary.id,
    emails,
    phone_numbers,
    secondary_ids: secondaries.iter().map(|c| c.id).collect(),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
