use crate::error::AuthError;
use actix_web::http::header::{self, HeaderMap};

/// Validates bearer tokens against the external auth service. The call is
/// synchronous with respect to the request and bounded by the shared
/// client's global timeout.
#[derive(Debug, Clone)]
pub struct AuthValidator {
    auth_url: String,
    client: reqwest::Client,
}

impl AuthValidator {
    pub fn new(auth_url: String, client: reqwest::Client) -> Self {
        AuthValidator { auth_url, client }
    }

    /// Pulls the token out of `Authorization: Bearer <token>`.
    pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingCredential)?
            .to_str()
            .map_err(|_| AuthError::MissingCredential)?;
        value
            .split_whitespace()
            .nth(1)
            .ok_or(AuthError::MissingCredential)
    }

    /// Success is a 200 whose JSON body carries `"code": 0`; anything else
    /// is a rejection. Transport failure is reported separately so the logs
    /// can tell an unreachable auth service from a bad token.
    pub async fn authenticate(&self, token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(&self.auth_url)
            .query(&[("token", token)])
            .send()
            .await
            .map_err(AuthError::Unreachable)?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(AuthError::Rejected);
        }
        let body = match response.json::<serde_json::Value>().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => return Err(AuthError::Rejected),
            Err(e) => return Err(AuthError::Unreachable(e)),
        };
        if body.get("code").and_then(serde_json::Value::as_i64) != Some(0) {
            return Err(AuthError::Rejected);
        }
        Ok(())
    }
}
