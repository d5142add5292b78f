// ── Collaborator interfaces ──
//
// The router talks to the rest of the device through these traits.
// Implementations live outside the crate (cloud backend, crypto, HTTP
// server); tests provide fakes.

use std::collections::BTreeSet;
use std::time::Duration;

use futures_util::future::BoxFuture;
use secrecy::SecretString;

use crate::JsonObject;
use crate::auth::{AuthScope, AuthType, CryptoType, PairingType, UserInfo};
use crate::error::PrivetError;
use crate::state::{ConnectionState, SetupState, WifiType};

/// Completion of an asynchronous command operation.
pub type CommandReply = BoxFuture<'static, Result<JsonObject, PrivetError>>;

/// Change notifications a cloud backend can broadcast to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudChange {
    State,
    Traits,
    ComponentTree,
}

// ── CloudDelegate ───────────────────────────────────────────────────

/// Device identity, registration and the command/state backend.
pub trait CloudDelegate: Send + Sync {
    fn device_id(&self) -> String;
    /// Five-character model manifest id.
    fn model_id(&self) -> String;
    fn name(&self) -> String;
    fn description(&self) -> String;
    fn location(&self) -> String;
    fn oem_name(&self) -> String;
    fn model_name(&self) -> String;
    /// Highest scope an anonymous client may obtain.
    fn anonymous_max_scope(&self) -> AuthScope;

    fn connection_state(&self) -> ConnectionState;
    fn setup_state(&self) -> SetupState;
    fn cloud_id(&self) -> String;

    fn update_device_info(&self, name: &str, description: &str, location: &str);
    /// Start cloud registration with a ticket obtained by the client.
    fn setup(&self, ticket_id: &str, user: &str) -> Result<(), PrivetError>;

    fn legacy_command_defs(&self) -> JsonObject;
    fn legacy_state(&self) -> JsonObject;
    fn traits(&self) -> JsonObject;
    fn components(&self) -> JsonObject;
    /// Resolve a dotted component path such as `comp1.comp2`.
    fn find_component(&self, path: &str) -> Result<JsonObject, PrivetError>;

    fn add_command(&self, command: &JsonObject, user: &UserInfo) -> CommandReply;
    fn get_command(&self, id: &str, user: &UserInfo) -> CommandReply;
    fn cancel_command(&self, id: &str, user: &UserInfo) -> CommandReply;
    fn list_commands(&self, user: &UserInfo) -> CommandReply;
}

// ── SecurityDelegate ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSession {
    pub session_id: String,
    pub device_commitment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfirmation {
    pub cert_fingerprint: String,
    pub cert_signature: String,
}

/// An issued access token and the scope actually granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub scope: AuthScope,
    pub ttl: Duration,
}

/// Pairing handshake and token issuance.
pub trait SecurityDelegate: Send + Sync {
    fn parse_access_token(&self, token: &str) -> Result<UserInfo, PrivetError>;

    fn pairing_types(&self) -> BTreeSet<PairingType>;
    fn crypto_types(&self) -> BTreeSet<CryptoType>;
    fn auth_types(&self) -> BTreeSet<AuthType>;

    fn start_pairing(
        &self,
        mode: PairingType,
        crypto: CryptoType,
    ) -> Result<PairingSession, PrivetError>;
    fn confirm_pairing(
        &self,
        session_id: &str,
        client_commitment: &str,
    ) -> Result<PairingConfirmation, PrivetError>;
    fn cancel_pairing(&self, session_id: &str) -> Result<(), PrivetError>;

    fn create_access_token(
        &self,
        auth_type: AuthType,
        auth_code: &str,
        desired_scope: AuthScope,
    ) -> Result<AccessToken, PrivetError>;

    fn claim_root_client_auth_token(&self) -> Result<String, PrivetError>;
    fn confirm_client_auth_token(&self, token: &str) -> Result<(), PrivetError>;

    fn create_session_id(&self) -> String;
}

// ── WifiDelegate ────────────────────────────────────────────────────

/// WiFi status and credential intake, as seen by the router.
pub trait WifiDelegate: Send + Sync {
    fn connection_state(&self) -> ConnectionState;
    fn setup_state(&self) -> SetupState;
    /// Accept new credentials. The outcome shows up later in
    /// [`setup_state`](Self::setup_state).
    fn configure_credentials(&self, ssid: &str, passphrase: SecretString)
    -> Result<(), PrivetError>;
    fn currently_connected_ssid(&self) -> String;
    /// SSID of the setup access point; empty unless hosting one.
    fn hosted_ssid(&self) -> String;
    fn types(&self) -> BTreeSet<WifiType>;
}

// ── DeviceDelegate ──────────────────────────────────────────────────

/// Transport facts the router needs to describe itself.
pub trait DeviceDelegate: Send + Sync {
    /// `(port, updates_port)` of the plain HTTP server.
    fn http_endpoint(&self) -> (u16, u16);
    fn https_endpoint(&self) -> (u16, u16);
    /// Longest time the transport keeps a request open; `None` is unbounded.
    fn http_request_timeout(&self) -> Option<Duration>;
}
