//! Extraction oracle clients.
//!
//! [`HttpOracle`] posts each request as JSON to an extraction service.
//! [`ReplayOracle`] answers from a directory of `<document_id>.json` files,
//! for offline runs and fixtures.

use std::{
  future::Future,
  path::PathBuf,
  time::Duration,
};

use loyer_core::oracle::{ExtractionOracle, OracleRequest, OracleResponse};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
  /// URL the extraction requests are posted to.
  pub endpoint:   Option<String>,
  /// Sent as a bearer token when set.
  pub api_key:    Option<String>,
  /// Answer from `<replay_dir>/<document_id>.json` instead of calling out.
  pub replay_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum OracleError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("extraction service answered {status}: {body}")]
  Status { status: reqwest::StatusCode, body: String },

  #[error("cannot read {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed oracle response: {0}")]
  Json(#[from] serde_json::Error),

  #[error("no oracle configured: set oracle.endpoint or oracle.replay_dir")]
  NotConfigured,
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpOracle {
  client:   Client,
  endpoint: String,
  api_key:  Option<String>,
}

impl HttpOracle {
  pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, OracleError> {
    let client = Client::builder().connect_timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, endpoint, api_key })
  }

  async fn call(&self, request: OracleRequest<'_>) -> Result<OracleResponse, OracleError> {
    let mut builder = self.client.post(&self.endpoint).json(&request);
    if let Some(key) = &self.api_key {
      builder = builder.bearer_auth(key);
    }
    let resp = builder.send().await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(OracleError::Status { status, body });
    }
    debug!(document = request.document_id, %status, "oracle answered");
    Ok(resp.json().await?)
  }
}

// ─── Replay ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReplayOracle {
  dir: PathBuf,
}

impl ReplayOracle {
  pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

  pub fn path_for(&self, document_id: &str) -> PathBuf {
    self.dir.join(format!("{document_id}.json"))
  }

  async fn read(&self, document_id: &str) -> Result<OracleResponse, OracleError> {
    let path = self.path_for(document_id);
    let raw = tokio::fs::read_to_string(&path)
      .await
      .map_err(|source| OracleError::Io { path: path.clone(), source })?;
    Ok(serde_json::from_str(&raw)?)
  }
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

pub enum AnyOracle {
  Http(HttpOracle),
  Replay(ReplayOracle),
}

impl AnyOracle {
  /// The replay directory wins over the endpoint when both are set.
  pub fn from_settings(settings: &OracleSettings) -> Result<Self, OracleError> {
    match (&settings.replay_dir, &settings.endpoint) {
      (Some(dir), _) => Ok(Self::Replay(ReplayOracle::new(dir))),
      (None, Some(endpoint)) => {
        Ok(Self::Http(HttpOracle::new(endpoint.clone(), settings.api_key.clone())?))
      }
      (None, None) => Err(OracleError::NotConfigured),
    }
  }

  pub fn describe(&self) -> String {
    match self {
      Self::Http(http) => format!("http {}", http.endpoint),
      Self::Replay(replay) => format!("replay {}", replay.dir.display()),
    }
  }
}

impl ExtractionOracle for AnyOracle {
  type Error = OracleError;

  fn extract<'a>(
    &'a self,
    request: OracleRequest<'a>,
  ) -> impl Future<Output = Result<OracleResponse, OracleError>> + Send + 'a {
    async move {
      match self {
        Self::Http(http) => http.call(request).await,
        Self::Replay(replay) => replay.read(request.document_id).await,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use loyer_core::{document::DocumentKind, schema::LedgerSchema};

  use super::*;

  fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("loyer-replay-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[tokio::test]
  async fn replay_reads_fixture_by_document_id() {
    let dir = scratch_dir();
    std::fs::write(
      dir.join("acme-souscription.json"),
      r#"{ "terms": { "currency": "EUR" }, "rows": [] }"#,
    )
    .unwrap();
    let oracle = AnyOracle::from_settings(&OracleSettings {
      replay_dir: Some(dir.clone()),
      ..Default::default()
    })
    .unwrap();

    let schema = LedgerSchema::current();
    let request = OracleRequest {
      document_id: "acme-souscription",
      kind:        DocumentKind::Subscription,
      content:     "",
      schema:      &schema,
    };
    let response = oracle.extract(request.clone()).await.unwrap();
    assert_eq!(response.terms["currency"], "EUR");

    let missing = OracleRequest { document_id: "acme-avenant", ..request };
    assert!(matches!(oracle.extract(missing).await, Err(OracleError::Io { .. })));
    std::fs::remove_dir_all(dir).ok();
  }

  #[test]
  fn oracle_must_be_configured() {
    assert!(matches!(
      AnyOracle::from_settings(&OracleSettings::default()),
      Err(OracleError::NotConfigured)
    ));
  }
}
