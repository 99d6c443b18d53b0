//! Handler for `POST /identify`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/identify` | Body: `{"email": string\|null, "phoneNumber": string\|number\|null}` |
//!
//! Normalization lives here, not in the engine: emails are trimmed and
//! lowercased, phone numbers are trimmed, numeric phone values are coerced to
//! strings, and empty strings count as absent.

use axum::{Json, extract::State};
use knit_core::{
  contact::{ContactId, IdentityView},
  store::IdentityStore,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{AppState, error::ApiError};

// ─── Request ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBody {
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default, deserialize_with = "phone_as_string")]
  pub phone_number: Option<String>,
}

/// Accept both string and numeric JSON values for the phone field.
fn phone_as_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Text(String),
    Number(i64),
  }

  Ok(Option::<Raw>::deserialize(de)?.map(|raw| match raw {
    Raw::Text(t) => t,
    Raw::Number(n) => n.to_string(),
  }))
}

// ─── Response ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactBody {
  pub primary_contact_id:    ContactId,
  pub emails:                Vec<String>,
  pub phone_numbers:         Vec<String>,
  pub secondary_contact_ids: Vec<ContactId>,
}

#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
  pub contact: ContactBody,
}

impl From<IdentityView> for IdentifyResponse {
  fn from(view: IdentityView) -> Self {
    IdentifyResponse {
      contact: ContactBody {
        primary_contact_id:    view.primary_id,
        emails:                view.emails,
        phone_numbers:         view.phone_numbers,
        secondary_contact_ids: view.secondary_ids,
      },
    }
  }
}

// ─── Handler ─────────────────────────────────────────────────────────────────

/// `POST /identify`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<IdentifyBody>,
) -> Result<Json<IdentifyResponse>, ApiError>
where
  S: IdentityStore + Clone + Send + Sync + 'static,
{
  let email = body
    .email
    .as_deref()
    .map(normalize_email)
    .filter(|e| !e.is_empty());
  let phone_number = body
    .phone_number
    .as_deref()
    .map(normalize_phone)
    .filter(|p| !p.is_empty());

  if email.is_none() && phone_number.is_none() {
    return Err(ApiError::BadRequest(
      "at least one of email or phoneNumber is required".to_string(),
    ));
  }

  let view = state.store.reconcile(email, phone_number).await?;
  Ok(Json(view.into()))
}

/// Emails are compared byte-for-byte by the engine; fold case here.
pub fn normalize_email(raw: &str) -> String {
  raw.trim().to_lowercase()
}

pub fn normalize_phone(raw: &str) -> String {
  raw.trim().to_owned()
}
