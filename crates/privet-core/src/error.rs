// ── Privet protocol errors ──
//
// Every failure reported to a client carries a reason code. Errors chain:
// an outer error may wrap the collaborator error that caused it, and the
// router picks the HTTP status by looking at the whole chain.

use std::fmt;
use std::panic::Location;

use serde_json::{Value, json};
use thiserror::Error;

use crate::JsonObject;

// ── ErrorCode ───────────────────────────────────────────────────────

/// Reason code of a [`PrivetError`].
///
/// The named variants are the reasons the router maps to HTTP statuses.
/// Collaborators may report anything else (`unknown_command`,
/// `invalidPassphrase`, ...) through [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidClientCommitment,
    InvalidFormat,
    MissingAuthorization,
    InvalidAuthorization,
    InvalidAuthorizationScope,
    AuthorizationExpired,
    CommitmentMismatch,
    UnknownSession,
    InvalidAuthCode,
    InvalidAuthMode,
    InvalidRequestedScope,
    AccessDenied,
    InvalidParams,
    SetupUnavailable,
    DeviceBusy,
    InvalidState,
    NotFound,
    NotImplemented,
    AlreadyClaimed,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidClientCommitment => "invalidClientCommitment",
            Self::InvalidFormat => "invalidFormat",
            Self::MissingAuthorization => "missingAuthorization",
            Self::InvalidAuthorization => "invalidAuthorization",
            Self::InvalidAuthorizationScope => "invalidAuthorizationScope",
            Self::AuthorizationExpired => "authorizationExpired",
            Self::CommitmentMismatch => "commitmentMismatch",
            Self::UnknownSession => "unknownSession",
            Self::InvalidAuthCode => "invalidAuthCode",
            Self::InvalidAuthMode => "invalidAuthMode",
            Self::InvalidRequestedScope => "invalidRequestedScope",
            Self::AccessDenied => "accessDenied",
            Self::InvalidParams => "invalidParams",
            Self::SetupUnavailable => "setupUnavailable",
            Self::DeviceBusy => "deviceBusy",
            Self::InvalidState => "invalidState",
            Self::NotFound => "notFound",
            Self::NotImplemented => "notImplemented",
            Self::AlreadyClaimed => "alreadyClaimed",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorCode {
    fn from(reason: &str) -> Self {
        match reason {
            "invalidClientCommitment" => Self::InvalidClientCommitment,
            "invalidFormat" => Self::InvalidFormat,
            "missingAuthorization" => Self::MissingAuthorization,
            "invalidAuthorization" => Self::InvalidAuthorization,
            "invalidAuthorizationScope" => Self::InvalidAuthorizationScope,
            "authorizationExpired" => Self::AuthorizationExpired,
            "commitmentMismatch" => Self::CommitmentMismatch,
            "unknownSession" => Self::UnknownSession,
            "invalidAuthCode" => Self::InvalidAuthCode,
            "invalidAuthMode" => Self::InvalidAuthMode,
            "invalidRequestedScope" => Self::InvalidRequestedScope,
            "accessDenied" => Self::AccessDenied,
            "invalidParams" => Self::InvalidParams,
            "setupUnavailable" => Self::SetupUnavailable,
            "deviceBusy" => Self::DeviceBusy,
            "invalidState" => Self::InvalidState,
            "notFound" => Self::NotFound,
            "notImplemented" => Self::NotImplemented,
            "alreadyClaimed" => Self::AlreadyClaimed,
            other => Self::Other(other.to_owned()),
        }
    }
}

// ── PrivetError ─────────────────────────────────────────────────────

/// A reason-tagged error, optionally wrapping the error that caused it.
///
/// The source location is captured at construction and reported in the
/// `debugInfo` list of the wire envelope.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct PrivetError {
    code: ErrorCode,
    message: String,
    location: &'static Location<'static>,
    #[source]
    inner: Option<Box<PrivetError>>,
}

impl PrivetError {
    #[track_caller]
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            location: Location::caller(),
            inner: None,
        }
    }

    /// Put a new outer error on top of `self`.
    #[track_caller]
    pub fn wrap(self, code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            location: Location::caller(),
            inner: Some(Box::new(self)),
        }
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn inner(&self) -> Option<&PrivetError> {
        self.inner.as_deref()
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// This error followed by every wrapped error, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &PrivetError> {
        std::iter::successors(Some(self), |err| err.inner())
    }

    /// Whether `code` appears anywhere in the chain.
    pub fn has_code(&self, code: &ErrorCode) -> bool {
        self.chain().any(|err| err.code == *code)
    }

    /// Same as [`has_code`](Self::has_code), by wire spelling.
    pub fn has_reason(&self, reason: &str) -> bool {
        self.chain().any(|err| err.code.as_str() == reason)
    }

    /// `{code, message, debugInfo: [...]}` as sent to clients.
    pub fn to_json(&self) -> JsonObject {
        let debug_info: Vec<Value> = self
            .chain()
            .map(|err| {
                json!({
                    "code": err.code.as_str(),
                    "message": err.message,
                    "debugInfo": format!("{}:{}", err.location.file(), err.location.line()),
                })
            })
            .collect();

        let mut output = JsonObject::new();
        output.insert("code".into(), self.code.as_str().into());
        output.insert("message".into(), self.message.clone().into());
        output.insert("debugInfo".into(), Value::Array(debug_info));
        output
    }
}
