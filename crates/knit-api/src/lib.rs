//! JSON HTTP layer for Knit.
//!
//! Exposes an axum [`Router`] backed by any [`IdentityStore`]. Transport
//! concerns end here; the engine receives pre-normalized input and returns
//! an [`knit_core::contact::IdentityView`].

pub mod error;
pub mod identify;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::post};
use knit_core::store::IdentityStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and/or
/// `KNIT_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}

fn default_port() -> u16 {
  3000
}

fn default_store_path() -> PathBuf {
  PathBuf::from("knit.db")
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: IdentityStore> {
  pub store: Arc<S>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the identity service.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: IdentityStore + Clone + Send + Sync + 'static,
{
  Router::new()
    .route("/identify", post(identify::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use knit_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state() -> AppState<SqliteStore> {
    AppState {
      store: Arc::new(SqliteStore::open_in_memory().await.unwrap()),
    }
  }

  async fn identify(
    state: AppState<SqliteStore>,
    body: Value,
  ) -> (StatusCode, Value) {
    let req = Request::builder()
      .method("POST")
      .uri("/identify")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn identify_creates_and_returns_contact() {
    let state = make_state().await;
    let (status, body) = identify(
      state,
      json!({"email": "lorraine@x.edu", "phoneNumber": "123456"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
      body,
      json!({
        "contact": {
          "primaryContactId": 1,
          "emails": ["lorraine@x.edu"],
          "phoneNumbers": ["123456"],
          "secondaryContactIds": []
        }
      })
    );
  }

  #[tokio::test]
  async fn identify_merges_over_http() {
    let state = make_state().await;
    identify(
      state.clone(),
      json!({"email": "george@x.edu", "phoneNumber": "919191"}),
    )
    .await;
    identify(
      state.clone(),
      json!({"email": "biff@x.edu", "phoneNumber": "717171"}),
    )
    .await;

    let (status, body) = identify(
      state,
      json!({"email": "george@x.edu", "phoneNumber": "717171"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["primaryContactId"], 1);
    assert_eq!(
      body["contact"]["emails"],
      json!(["george@x.edu", "biff@x.edu"])
    );
    assert_eq!(
      body["contact"]["phoneNumbers"],
      json!(["919191", "717171"])
    );
    assert_eq!(body["contact"]["secondaryContactIds"], json!([2]));
  }

  #[tokio::test]
  async fn empty_input_returns_400() {
    let state = make_state().await;
    let (status, body) = identify(state, json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("at least one"));
  }

  #[tokio::test]
  async fn whitespace_only_email_counts_as_absent() {
    let state = make_state().await;
    let (status, _) =
      identify(state, json!({"email": "   ", "phoneNumber": null})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn numeric_phone_is_coerced_to_string() {
    let state = make_state().await;
    let (status, body) =
      identify(state, json!({"phoneNumber": 123456})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["phoneNumbers"], json!(["123456"]));
  }

  #[tokio::test]
  async fn email_case_and_whitespace_are_normalized() {
    let state = make_state().await;
    identify(
      state.clone(),
      json!({"email": "lorraine@x.edu", "phoneNumber": "123456"}),
    )
    .await;

    // Same identity spelled loudly: must match, not create.
    let (status, body) = identify(
      state,
      json!({"email": "  LORRAINE@X.EDU ", "phoneNumber": "123456"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["primaryContactId"], 1);
    assert_eq!(body["contact"]["secondaryContactIds"], json!([]));
  }
}
