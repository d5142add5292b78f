use serde_json::Value;

use crate::JsonObject;
use crate::error::{ErrorCode, PrivetError};

/// Reason to HTTP status, in match priority order.
const STATUS_TABLE: &[(ErrorCode, u16)] = &[
    (ErrorCode::InvalidClientCommitment, 403),
    (ErrorCode::InvalidFormat, 400),
    (ErrorCode::MissingAuthorization, 401),
    (ErrorCode::InvalidAuthorization, 401),
    (ErrorCode::InvalidAuthorizationScope, 403),
    (ErrorCode::AuthorizationExpired, 403),
    (ErrorCode::CommitmentMismatch, 403),
    (ErrorCode::UnknownSession, 404),
    (ErrorCode::InvalidAuthCode, 403),
    (ErrorCode::InvalidAuthMode, 400),
    (ErrorCode::InvalidRequestedScope, 400),
    (ErrorCode::AccessDenied, 403),
    (ErrorCode::InvalidParams, 400),
    (ErrorCode::SetupUnavailable, 400),
    (ErrorCode::DeviceBusy, 503),
    (ErrorCode::InvalidState, 500),
    (ErrorCode::NotFound, 404),
    (ErrorCode::NotImplemented, 501),
    (ErrorCode::AlreadyClaimed, 401),
];

const INTERNAL_SERVER_ERROR: u16 = 500;

/// HTTP status for an error: the first table entry whose reason appears
/// anywhere in the chain, else 500.
pub fn status_for(error: &PrivetError) -> u16 {
    STATUS_TABLE
        .iter()
        .find(|(code, _)| error.has_code(code))
        .map_or(INTERNAL_SERVER_ERROR, |(_, status)| *status)
}

/// A finished request: HTTP status and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: JsonObject,
}

impl Response {
    pub fn ok(body: JsonObject) -> Self {
        Self { status: 200, body }
    }

    /// `{"error": {...}}` with the mapped status.
    pub fn from_error(error: &PrivetError) -> Self {
        let mut body = JsonObject::new();
        body.insert("error".into(), Value::Object(error.to_json()));
        Self {
            status: status_for(error),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Reason code of an error response.
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("error")?.get("code")?.as_str()
    }
}

impl From<Result<JsonObject, PrivetError>> for Response {
    fn from(result: Result<JsonObject, PrivetError>) -> Self {
        match result {
            Ok(body) => Self::ok(body),
            Err(e) => Self::from_error(&e),
        }
    }
}
