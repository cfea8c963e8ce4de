// Login request and token extraction

use chrono::Utc;
use reqwest::Client;
use serde_json::Value;

use super::types::{Credentials, LoginRequest, SessionToken, DEFAULT_SCHEME, TOKEN_FIELDS};
use crate::error::{ApiError, Result};

/// Normalize the `token_type` reported by the server
///
/// "bearer" in any casing becomes "Bearer", a missing or blank value defaults to
/// "Bearer", anything else is kept verbatim.
pub fn normalize_scheme(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => DEFAULT_SCHEME.to_string(),
        Some(s) if s.eq_ignore_ascii_case("bearer") => DEFAULT_SCHEME.to_string(),
        Some(s) => s.to_string(),
    }
}

/// Extract a session token from a login response body
///
/// Candidate fields are tried in `TOKEN_FIELDS` order; the first non-empty
/// string wins.
pub fn parse_token(body: &Value) -> Result<SessionToken> {
    let value = TOKEN_FIELDS
        .iter()
        .find_map(|field| {
            body.get(*field)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        })
        .ok_or_else(|| {
            ApiError::AuthError(
                "Login response does not contain a token (access_token/token/jwt)".to_string(),
            )
        })?;

    let scheme = normalize_scheme(body.get("token_type").and_then(|v| v.as_str()));

    Ok(SessionToken {
        value: value.to_string(),
        scheme,
        obtained_at: Utc::now(),
    })
}

/// POST the credentials to the login endpoint and return the issued token
pub async fn request_token(client: &Client, url: &str, creds: &Credentials) -> Result<SessionToken> {
    tracing::debug!(url = %url, username = %creds.username, "Sending login request");

    let response = client
        .post(url)
        .json(&LoginRequest::from(creds))
        .send()
        .await
        .map_err(|e| ApiError::AuthError(format!("Login request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), body = %error_text, "Login rejected");
        return Err(ApiError::AuthError(format!(
            "Login failed: {} - {}",
            status.as_u16(),
            error_text
        )));
    }

    let text = response
        .text()
        .await
        .map_err(|e| ApiError::AuthError(format!("Failed to read login response: {}", e)))?;

    // A non-JSON body is treated like a body without a token
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    parse_token(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_scheme() {
        assert_eq!(normalize_scheme(None), "Bearer");
        assert_eq!(normalize_scheme(Some("")), "Bearer");
        assert_eq!(normalize_scheme(Some("bearer")), "Bearer");
        assert_eq!(normalize_scheme(Some("BEARER")), "Bearer");
        assert_eq!(normalize_scheme(Some("Bearer")), "Bearer");
        assert_eq!(normalize_scheme(Some("JWT")), "JWT");
    }

    #[test]
    fn test_parse_token_field_priority() {
        let token = parse_token(&json!({"access_token": "a", "token": "b", "jwt": "c"})).unwrap();
        assert_eq!(token.value, "a");

        let token = parse_token(&json!({"token": "b", "jwt": "c"})).unwrap();
        assert_eq!(token.value, "b");

        let token = parse_token(&json!({"jwt": "c"})).unwrap();
        assert_eq!(token.value, "c");
        assert_eq!(token.scheme, "Bearer");
    }

    #[test]
    fn test_parse_token_skips_empty_and_mistyped_fields() {
        let token = parse_token(&json!({"access_token": "", "token": 42, "jwt": "c"})).unwrap();
        assert_eq!(token.value, "c");
    }

    #[test]
    fn test_parse_token_scheme() {
        let token = parse_token(&json!({"access_token": "a", "token_type": "bearer"})).unwrap();
        assert_eq!(token.header_value(), "Bearer a");

        let token = parse_token(&json!({"access_token": "a", "token_type": "Token"})).unwrap();
        assert_eq!(token.header_value(), "Token a");
    }

    #[test]
    fn test_parse_token_missing() {
        let err = parse_token(&json!({"detail": "ok"})).unwrap_err();
        assert!(matches!(err, ApiError::AuthError(_)));

        let err = parse_token(&Value::Null).unwrap_err();
        assert!(matches!(err, ApiError::AuthError(_)));
    }
}
