//! Rejects calls carrying a revoked session before they reach any handler.
//!
//! The gate only blocks on positive evidence: a bearer token whose `jti` is
//! in the revocation filter. Missing headers and unreadable tokens pass
//! through; signature checks happen in the next layer.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::web::api::{AppState, json_error};
use crate::web::revocation_filter::RevocationFilter;
use crate::web::token_id::{bearer_token, extract_session_id};

/// Body message for a revoked session.
pub const SESSION_TERMINATED: &str = "Session terminated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Reject { jti: String },
}

#[derive(Clone)]
pub struct AccessGate {
    filter: Arc<RevocationFilter>,
}

impl AccessGate {
    pub fn new(filter: Arc<RevocationFilter>) -> Self {
        Self { filter }
    }

    /// Decides on the raw `Authorization` header value.
    pub fn check(&self, authorization: Option<&str>) -> GateDecision {
        let Some(jti) = authorization
            .and_then(bearer_token)
            .and_then(extract_session_id)
        else {
            return GateDecision::Admit;
        };
        if self.filter.contains(&jti) {
            tracing::info!(jti = %jti, "rejected call with revoked session");
            GateDecision::Reject { jti }
        } else {
            GateDecision::Admit
        }
    }
}

/// Middleware wrapping [`AccessGate::check`].
pub async fn access_gate_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    match state.gate.check(authorization) {
        GateDecision::Admit => next.run(req).await,
        GateDecision::Reject { .. } => json_error(SESSION_TERMINATED, StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn token(jti: &str) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"jti":"{jti}"}}"#));
        format!("Bearer h.{payload}.s")
    }

    #[test]
    fn test_revoked_session_is_rejected() {
        let filter = Arc::new(RevocationFilter::default());
        let gate = AccessGate::new(filter.clone());
        assert_eq!(gate.check(Some(&token("abc"))), GateDecision::Admit);
        filter.insert("abc");
        assert_eq!(
            gate.check(Some(&token("abc"))),
            GateDecision::Reject { jti: "abc".to_string() }
        );
        assert_eq!(gate.check(Some(&token("other"))), GateDecision::Admit);
    }

    #[test]
    fn test_missing_or_unreadable_tokens_are_admitted() {
        let filter = Arc::new(RevocationFilter::default());
        filter.insert("");
        let gate = AccessGate::new(filter);
        assert_eq!(gate.check(None), GateDecision::Admit);
        assert_eq!(gate.check(Some("Basic Zm9v")), GateDecision::Admit);
        assert_eq!(gate.check(Some("Bearer not-a-token")), GateDecision::Admit);
    }
}
