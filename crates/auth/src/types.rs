//! OAuth2 token types and grant wire formats.
//!
//! `TokenSet` is the in-memory token store owned by a credential; the
//! `*Response` structs mirror the token endpoint's JSON bodies (RFC 6749),
//! and `Grant` produces the bit-exact form-encoded request bodies.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access and refresh tokens with expiry metadata.
///
/// Owned exclusively by one credential and mutated as a unit on every
/// successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer access token, empty until the first refresh succeeds.
    pub access_token: String,

    /// Refresh token, if the server issued one. Rotated in place when the
    /// server returns a replacement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type, "Bearer" for everything this crate produces.
    pub token_type: String,

    /// Absolute expiration timestamp (UTC), when the server reported a
    /// lifetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Token set holding only a bootstrap access token.
    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    /// Token set holding only a refresh token; the first 401 will trigger a
    /// refresh to obtain an access token.
    pub fn with_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: Some(refresh_token.into()),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    /// Whether the access token is expired or expires within `threshold`
    /// seconds of `now`. Tokens without a reported lifetime never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, threshold_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now + chrono::Duration::seconds(threshold_seconds) >= expires_at,
            None => false,
        }
    }

    /// Seconds until expiry relative to `now`, if a lifetime was reported.
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - now).num_seconds())
    }
}

/// Token endpoint success response (RFC 6749 §5.1).
///
/// Transient: parsed once and folded into the credential's [`TokenSet`].
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Fold this response into a token set, keeping the previous refresh
    /// token when the server did not rotate it.
    pub fn into_token_set(self, previous_refresh_token: Option<String>, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh_token),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + chrono::Duration::seconds(secs)),
        }
    }
}

/// Token endpoint error response (RFC 6749 §5.2).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Client authentication material sent with every grant.
#[derive(Debug, Clone)]
pub struct ClientAuthentication {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl ClientAuthentication {
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Self {
        Self { client_id: client_id.into(), client_secret }
    }
}

/// OAuth2 grant: the exchange mechanism used to obtain a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Exchange a refresh token for a new access token.
    RefreshToken { refresh_token: String },
    /// Exchange an authorization code from a completed consent flow.
    AuthorizationCode { code: String, redirect_uri: String },
    /// Assertion grant; `assertion_type` is the server-defined absolute URI
    /// naming the assertion format.
    Assertion { assertion_type: String, assertion: String },
}

impl Grant {
    /// The `grant_type` parameter value.
    pub fn grant_type(&self) -> &str {
        match self {
            Self::RefreshToken { .. } => "refresh_token",
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::Assertion { assertion_type, .. } => assertion_type,
        }
    }

    /// Serialize the grant plus client authentication as a form-encoded
    /// token-endpoint body.
    pub fn to_form_body(&self, client: &ClientAuthentication) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        match self {
            Self::RefreshToken { refresh_token } => {
                form.append_pair("grant_type", "refresh_token");
                form.append_pair("refresh_token", refresh_token);
            }
            Self::AuthorizationCode { code, redirect_uri } => {
                form.append_pair("grant_type", "authorization_code");
                form.append_pair("code", code);
                form.append_pair("redirect_uri", redirect_uri);
            }
            Self::Assertion { assertion_type, assertion } => {
                form.append_pair("grant_type", assertion_type);
                form.append_pair("assertion_type", assertion_type);
                form.append_pair("assertion", assertion);
            }
        }
        form.append_pair("client_id", &client.client_id);
        if let Some(secret) = &client.client_secret {
            form.append_pair("client_secret", secret);
        }
        form.finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for token types and grant serialization.
    use std::collections::HashMap;

    use super::*;

    fn parse_form(body: &str) -> HashMap<String, String> {
        url::form_urlencoded::parse(body.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn token_set_expiry_threshold() {
        let now = Utc::now();
        let tokens = TokenSet {
            access_token: "a".into(),
            refresh_token: None,
            token_type: "Bearer".into(),
            expires_at: Some(now + chrono::Duration::seconds(3600)),
        };

        assert!(!tokens.is_expired(now, 300));
        assert!(tokens.is_expired(now, 7200));
        assert_eq!(tokens.seconds_until_expiry(now), Some(3600));
    }

    #[test]
    fn token_set_without_expiry_never_expires() {
        let now = Utc::now();
        let tokens = TokenSet::with_access_token("a");
        assert!(!tokens.is_expired(now, i64::MAX / 2));
        assert_eq!(tokens.seconds_until_expiry(now), None);
    }

    #[test]
    fn token_response_folds_into_token_set() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "A2".into(),
            refresh_token: None,
            expires_in: Some(3600),
            token_type: None,
        };

        let tokens = response.into_token_set(Some("R1".into()), now);
        assert_eq!(tokens.access_token, "A2");
        // The previous refresh token survives when the server does not
        // rotate it.
        assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_at, Some(now + chrono::Duration::seconds(3600)));
    }

    #[test]
    fn token_response_rotated_refresh_token_wins() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "A2".into(),
            refresh_token: Some("R2".into()),
            expires_in: None,
            token_type: Some("Bearer".into()),
        };

        let tokens = response.into_token_set(Some("R1".into()), now);
        assert_eq!(tokens.refresh_token.as_deref(), Some("R2"));
        assert_eq!(tokens.expires_at, None);
    }

    /// Validates the grant round-trip scenario: serializing a refresh-token
    /// grant and parsing the resulting form body recovers identical fields.
    #[test]
    fn refresh_grant_form_round_trip() {
        let client = ClientAuthentication::new("cid", Some("csecret".into()));
        let grant = Grant::RefreshToken { refresh_token: "n4E9O119d".into() };

        let body = grant.to_form_body(&client);
        let fields = parse_form(&body);

        assert_eq!(fields.get("grant_type").map(String::as_str), Some("refresh_token"));
        assert_eq!(fields.get("refresh_token").map(String::as_str), Some("n4E9O119d"));
        assert_eq!(fields.get("client_id").map(String::as_str), Some("cid"));
        assert_eq!(fields.get("client_secret").map(String::as_str), Some("csecret"));
    }

    #[test]
    fn authorization_code_grant_fields() {
        let client = ClientAuthentication::new("cid", None);
        let grant = Grant::AuthorizationCode {
            code: "ac-123".into(),
            redirect_uri: "https://app.example.com/callback".into(),
        };

        let fields = parse_form(&grant.to_form_body(&client));
        assert_eq!(fields.get("grant_type").map(String::as_str), Some("authorization_code"));
        assert_eq!(fields.get("code").map(String::as_str), Some("ac-123"));
        assert_eq!(
            fields.get("redirect_uri").map(String::as_str),
            Some("https://app.example.com/callback")
        );
        assert!(!fields.contains_key("client_secret"));
    }

    #[test]
    fn assertion_grant_uses_type_as_grant_type() {
        let client = ClientAuthentication::new("cid", None);
        let grant = Grant::Assertion {
            assertion_type: "urn:ietf:params:oauth:grant-type:saml2-bearer".into(),
            assertion: "PHNhbWw+".into(),
        };

        let fields = parse_form(&grant.to_form_body(&client));
        assert_eq!(
            fields.get("grant_type").map(String::as_str),
            Some("urn:ietf:params:oauth:grant-type:saml2-bearer")
        );
        assert_eq!(fields.get("assertion").map(String::as_str), Some("PHNhbWw+"));
    }

    #[test]
    fn token_error_response_display() {
        let with_desc = TokenErrorResponse {
            error: "invalid_grant".into(),
            error_description: Some("refresh token revoked".into()),
        };
        assert_eq!(with_desc.to_string(), "invalid_grant: refresh token revoked");

        let bare = TokenErrorResponse { error: "invalid_client".into(), error_description: None };
        assert_eq!(bare.to_string(), "invalid_client");
    }
}
