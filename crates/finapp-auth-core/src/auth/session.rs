use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Response field carrying the access token
pub const ACCESS_TOKEN_FIELD: &str = "access_token";

/// Response field carrying the refresh token
pub const REFRESH_TOKEN_FIELD: &str = "refresh_token";

const TOKEN_TYPE_FIELD: &str = "token_type";

/// The tokens currently held in secure storage.
///
/// Always read fresh from the store; nothing here is cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// `Authorization` header value for the stored access token.
    pub fn bearer(&self) -> Option<String> {
        self.access_token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

/// Where a session stands from the UI's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    /// A refresh exchange is in flight; the old tokens are still stored.
    Refreshing,
}

/// Parsed body of a successful authentication exchange.
///
/// Holds the whole JSON object so profile fields reach the caller verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthResult(Map<String, Value>);

impl AuthResult {
    /// Parse a response body, rejecting anything that is not a JSON object
    /// with well-typed token fields.
    pub fn parse(body: &str) -> Result<Self, AuthError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| AuthError::MalformedResponse(format!("Invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, AuthError> {
        let Value::Object(map) = value else {
            return Err(AuthError::MalformedResponse(
                "Expected a JSON object".to_string(),
            ));
        };

        for field in [ACCESS_TOKEN_FIELD, REFRESH_TOKEN_FIELD] {
            match map.get(field) {
                None | Some(Value::Null) | Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(AuthError::MalformedResponse(format!(
                        "Field '{}' must be a string, got {}",
                        field,
                        json_type(other)
                    )));
                }
            }
        }

        Ok(Self(map))
    }

    fn token(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
    }

    pub fn access_token(&self) -> Option<&str> {
        self.token(ACCESS_TOKEN_FIELD)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.token(REFRESH_TOKEN_FIELD)
    }

    pub fn token_type(&self) -> Option<&str> {
        self.0.get(TOKEN_TYPE_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<AuthResult> for Value {
    fn from(result: AuthResult) -> Self {
        Value::Object(result.0)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_profile_fields() {
        let result = AuthResult::parse(
            r#"{"access_token":"AT1","refresh_token":"RT1","token_type":"bearer","first_name":"Ada"}"#,
        )
        .unwrap();
        assert_eq!(result.access_token(), Some("AT1"));
        assert_eq!(result.refresh_token(), Some("RT1"));
        assert_eq!(result.token_type(), Some("bearer"));
        assert_eq!(result.get("first_name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn test_missing_null_and_empty_tokens_are_absent() {
        let result = AuthResult::parse(r#"{"id":"u1","access_token":null,"refresh_token":""}"#).unwrap();
        assert_eq!(result.access_token(), None);
        assert_eq!(result.refresh_token(), None);
        assert_eq!(result.as_map().len(), 3);
    }

    #[test]
    fn test_parse_rejects_non_json_and_non_objects() {
        assert!(matches!(
            AuthResult::parse("<html>oops</html>"),
            Err(AuthError::MalformedResponse(_))
        ));
        assert!(matches!(
            AuthResult::parse(r#"["AT1"]"#),
            Err(AuthError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_mistyped_token() {
        let err = AuthResult::parse(r#"{"access_token":42}"#).unwrap_err();
        assert!(err.to_string().contains("access_token"));
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_session_helpers() {
        let session = Session::default();
        assert!(session.is_empty());
        assert!(!session.is_authenticated());
        assert_eq!(session.bearer(), None);

        let session = Session {
            access_token: Some("AT1".to_string()),
            refresh_token: None,
        };
        assert!(session.is_authenticated());
        assert_eq!(session.bearer().as_deref(), Some("Bearer AT1"));
    }

    #[test]
    fn test_auth_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AuthState::Unauthenticated).unwrap(),
            "\"unauthenticated\""
        );
    }
}
