// ── Endpoint implementations ──

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future;
use secrecy::SecretString;
use serde_json::{Value, json};
use tracing::{debug, info, trace};

use super::components::{clone_component, clone_component_tree};
use super::updates::Fingerprints;
use super::{ApiReply, PrivetHandler};
use crate::JsonObject;
use crate::auth::{AuthScope, AuthType, CryptoType, PairingType, UserInfo};
use crate::delegate::CommandReply;
use crate::device_kind::device_ui_kind;
use crate::error::{ErrorCode, PrivetError};
use crate::state::SetupStatus;
use crate::sync::lock;

const INFO_VERSION: &str = "3.0";
const TOKEN_TYPE: &str = "Privet";
const SCOPE_AUTO: &str = "auto";

/// Cut from the transport timeout so a long-poll answers before the
/// server drops the connection.
const LONG_POLL_SAFETY_GAP: Duration = Duration::from_secs(10);

type EndpointResult = Result<JsonObject, PrivetError>;

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn input_str<'a>(input: &'a JsonObject, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

#[track_caller]
fn invalid_param(key: &str, value: &str) -> PrivetError {
    PrivetError::new(
        ErrorCode::InvalidParams,
        format!("Invalid parameter: '{key}'='{value}'"),
    )
}

// ── Info ────────────────────────────────────────────────────────────

impl PrivetHandler {
    pub(super) fn handle_info(&self, _input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let model_id = self.cloud.model_id();
        let ui_kind = device_ui_kind(&model_id);

        let mut output = JsonObject::new();
        output.insert("version".into(), INFO_VERSION.into());
        output.insert("id".into(), self.cloud.device_id().into());
        output.insert("name".into(), self.cloud.name().into());

        let description = self.cloud.description();
        if !description.is_empty() {
            output.insert("description".into(), description.into());
        }
        let location = self.cloud.location();
        if !location.is_empty() {
            output.insert("location".into(), location.into());
        }

        output.insert("modelManifestId".into(), model_id.clone().into());
        output.insert(
            "basicModelManifest".into(),
            json!({
                "uiDeviceKind": ui_kind,
                "oemName": self.cloud.oem_name(),
                "modelName": self.cloud.model_name(),
            }),
        );
        output.insert("services".into(), json!([ui_kind]));
        output.insert("authentication".into(), Value::Object(self.auth_section()));
        output.insert("endpoints".into(), Value::Object(self.endpoints_section()));

        if let Some(wifi) = &self.wifi {
            let mut section = JsonObject::new();
            let capabilities: Vec<String> = wifi.types().iter().map(ToString::to_string).collect();
            section.insert("capabilities".into(), json!(capabilities));
            section.insert("ssid".into(), wifi.currently_connected_ssid().into());
            let hosted_ssid = wifi.hosted_ssid();
            if !hosted_ssid.is_empty() {
                section.insert("hostedSsid".into(), hosted_ssid.into());
            }
            wifi.connection_state().write_to(&mut section);
            output.insert("wifi".into(), Value::Object(section));
        }

        let mut gcd = JsonObject::new();
        gcd.insert("id".into(), self.cloud.cloud_id().into());
        self.cloud.connection_state().write_to(&mut gcd);
        output.insert("gcd".into(), Value::Object(gcd));

        output.insert("time".into(), json!(js_time(self.clock.now().timestamp_millis())));
        output.insert("sessionId".into(), self.security.create_session_id().into());
        Ok(output)
    }

    fn auth_section(&self) -> JsonObject {
        let modes: Vec<String> = self.security.auth_types().iter().map(ToString::to_string).collect();
        let pairing: Vec<String> =
            self.security.pairing_types().iter().map(ToString::to_string).collect();
        let crypto: Vec<String> = self.security.crypto_types().iter().map(ToString::to_string).collect();

        object(json!({
            "anonymousMaxScope": self.anonymous_max_scope().to_string(),
            "mode": modes,
            "pairing": pairing,
            "crypto": crypto,
        }))
    }

    fn endpoints_section(&self) -> JsonObject {
        let (http_port, http_updates_port) = self.device.http_endpoint();
        let (https_port, https_updates_port) = self.device.https_endpoint();
        object(json!({
            "httpPort": http_port,
            "httpUpdatesPort": http_updates_port,
            "httpsPort": https_port,
            "httpsUpdatesPort": https_updates_port,
        }))
    }
}

/// Milliseconds since the epoch as a JSON double.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn js_time(millis: i64) -> f64 {
    millis as f64
}

// ── Pairing and authorization ───────────────────────────────────────

impl PrivetHandler {
    pub(super) fn handle_pairing_start(&self, input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let pairing_str = input_str(input, "pairing").unwrap_or_default();
        let crypto_str = input_str(input, "crypto").unwrap_or_default();

        let pairing = pairing_str
            .parse::<PairingType>()
            .ok()
            .filter(|mode| self.security.pairing_types().contains(mode))
            .ok_or_else(|| invalid_param("pairing", pairing_str))?;
        let crypto = crypto_str
            .parse::<CryptoType>()
            .ok()
            .filter(|crypto| self.security.crypto_types().contains(crypto))
            .ok_or_else(|| invalid_param("crypto", crypto_str))?;

        let session = self.security.start_pairing(pairing, crypto)?;
        debug!(session_id = %session.session_id, %pairing, "pairing started");
        Ok(object(json!({
            "sessionId": session.session_id,
            "deviceCommitment": session.device_commitment,
        })))
    }

    pub(super) fn handle_pairing_confirm(&self, input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let session_id = input_str(input, "sessionId").unwrap_or_default();
        let commitment = input_str(input, "clientCommitment").unwrap_or_default();

        let confirmation = self.security.confirm_pairing(session_id, commitment)?;
        Ok(object(json!({
            "certFingerprint": confirmation.cert_fingerprint,
            "certSignature": confirmation.cert_signature,
        })))
    }

    pub(super) fn handle_pairing_cancel(&self, input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let session_id = input_str(input, "sessionId").unwrap_or_default();
        self.security.cancel_pairing(session_id)?;
        Ok(JsonObject::new())
    }

    pub(super) fn handle_auth(&self, input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let mode_str = input_str(input, "mode").unwrap_or_default();
        let auth_type = mode_str.parse::<AuthType>().map_err(|_| {
            PrivetError::new(
                ErrorCode::InvalidAuthMode,
                format!("Invalid parameter: 'mode'='{mode_str}'"),
            )
        })?;

        let mut desired_scope = AuthScope::Owner;
        let mut acceptable_scope = AuthScope::Viewer;

        let requested_scope = input_str(input, "requestedScope").unwrap_or_default();
        if requested_scope != SCOPE_AUTO {
            desired_scope = requested_scope.parse::<AuthScope>().map_err(|_| {
                PrivetError::new(
                    ErrorCode::InvalidRequestedScope,
                    format!("Invalid parameter: 'requestedScope'='{requested_scope}'"),
                )
            })?;
            acceptable_scope = acceptable_scope.max(desired_scope);
        }

        if auth_type == AuthType::Anonymous {
            desired_scope = self.anonymous_max_scope();
        }

        let auth_code = input_str(input, "authCode").unwrap_or_default();
        let token = self
            .security
            .create_access_token(auth_type, auth_code, desired_scope)?;

        if token.scope < acceptable_scope {
            return Err(PrivetError::new(
                ErrorCode::AccessDenied,
                format!("Scope '{}' is not allowed", token.scope),
            ));
        }

        debug!(mode = %auth_type, scope = %token.scope, "access token issued");
        Ok(object(json!({
            "accessToken": token.token,
            "tokenType": TOKEN_TYPE,
            "expiresIn": token.ttl.as_secs(),
            "scope": token.scope.to_string(),
        })))
    }

    pub(super) fn handle_access_control_claim(&self, _input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let token = self.security.claim_root_client_auth_token()?;
        Ok(object(json!({ "clientToken": token })))
    }

    pub(super) fn handle_access_control_confirm(&self, input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let token = input_str(input, "clientToken").ok_or_else(|| invalid_param("clientToken", ""))?;
        self.security.confirm_client_auth_token(token)?;
        Ok(JsonObject::new())
    }
}

// ── Setup ───────────────────────────────────────────────────────────

impl PrivetHandler {
    pub(super) fn handle_setup_start(&self, input: &JsonObject, user: &UserInfo) -> EndpointResult {
        let name = input_str(input, "name").map_or_else(|| self.cloud.name(), str::to_owned);
        let description =
            input_str(input, "description").map_or_else(|| self.cloud.description(), str::to_owned);
        let location = input_str(input, "location").map_or_else(|| self.cloud.location(), str::to_owned);

        let mut credentials = None;
        if let Some(wifi_block) = input.get("wifi").and_then(Value::as_object) {
            let wifi = self
                .wifi
                .as_ref()
                .filter(|wifi| !wifi.types().is_empty())
                .ok_or_else(|| PrivetError::new(ErrorCode::SetupUnavailable, "WiFi setup unavailable"))?;
            let ssid = input_str(wifi_block, "ssid").unwrap_or_default();
            if ssid.is_empty() {
                return Err(invalid_param("ssid", ""));
            }
            let passphrase = input_str(wifi_block, "passphrase").unwrap_or_default();
            credentials = Some((Arc::clone(wifi), ssid, SecretString::from(passphrase.to_owned())));
        }

        let mut registration = None;
        if let Some(gcd_block) = input.get("gcd").and_then(Value::as_object) {
            if user.scope() < AuthScope::Owner {
                return Err(PrivetError::new(
                    ErrorCode::InvalidAuthorizationScope,
                    "Only owner can register device",
                ));
            }
            let ticket = input_str(gcd_block, "ticketId").unwrap_or_default();
            if ticket.is_empty() {
                return Err(invalid_param("ticketId", ""));
            }
            let owner = input_str(gcd_block, "user").unwrap_or_default();
            registration = Some((ticket, owner));
        }

        self.cloud.update_device_info(&name, &description, &location);

        if let Some((wifi, ssid, passphrase)) = credentials {
            info!(%ssid, "wifi credentials received");
            wifi.configure_credentials(ssid, passphrase)?;
        }
        if let Some((ticket, owner)) = registration {
            info!("cloud registration requested");
            self.cloud.setup(ticket, owner)?;
        }

        Ok(self.setup_status())
    }

    pub(super) fn handle_setup_status(&self, _input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        Ok(self.setup_status())
    }

    fn setup_status(&self) -> JsonObject {
        let mut output = JsonObject::new();

        let state = self.cloud.setup_state();
        if !state.is_status(SetupStatus::None) {
            let mut gcd = JsonObject::new();
            state.write_to(&mut gcd);
            if state.is_status(SetupStatus::Success) {
                gcd.insert("id".into(), self.cloud.cloud_id().into());
            }
            output.insert("gcd".into(), Value::Object(gcd));
        }

        if let Some(wifi) = &self.wifi {
            let state = wifi.setup_state();
            if !state.is_status(SetupStatus::None) {
                let mut section = JsonObject::new();
                state.write_to(&mut section);
                if state.is_status(SetupStatus::Success) {
                    section.insert("ssid".into(), wifi.currently_connected_ssid().into());
                }
                output.insert("wifi".into(), Value::Object(section));
            }
        }

        output
    }
}

// ── State, traits and components ────────────────────────────────────

impl PrivetHandler {
    pub(super) fn handle_state(&self, _input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let fingerprint = self.fingerprints().state;
        Ok(object(json!({
            "state": self.cloud.legacy_state(),
            "fingerprint": fingerprint.to_string(),
        })))
    }

    pub(super) fn handle_traits(&self, _input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let fingerprint = self.fingerprints().traits;
        Ok(object(json!({
            "traits": self.cloud.traits(),
            "fingerprint": fingerprint.to_string(),
        })))
    }

    /// Command definitions are versioned with the traits.
    pub(super) fn handle_command_defs(&self, _input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let fingerprint = self.fingerprints().traits;
        Ok(object(json!({
            "commands": self.cloud.legacy_command_defs(),
            "fingerprint": fingerprint.to_string(),
        })))
    }

    pub(super) fn handle_components(&self, input: &JsonObject, _user: &UserInfo) -> EndpointResult {
        let path = input_str(input, "path").unwrap_or_default();
        let filter: BTreeSet<&str> = input
            .get("filter")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let components = if path.is_empty() {
            clone_component_tree(&self.cloud.components(), &filter)
        } else {
            let component = self.cloud.find_component(path)?;
            let key = path.rsplit('.').next().unwrap_or(path);
            let mut tree = JsonObject::new();
            tree.insert(key.to_owned(), Value::Object(clone_component(&component, &filter)));
            tree
        };

        let fingerprint = self.fingerprints().components;
        Ok(object(json!({
            "components": components,
            "fingerprint": fingerprint.to_string(),
        })))
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Give backend command failures their protocol reason.
fn map_command_reply(reply: CommandReply) -> ApiReply {
    reply
        .map(|result| {
            result.map_err(|e| {
                if e.has_reason("unknown_command") {
                    e.wrap(ErrorCode::NotFound, "Unknown command ID")
                } else if e.has_reason("access_denied") {
                    let message = e.message().to_owned();
                    e.wrap(ErrorCode::AccessDenied, message)
                } else {
                    e
                }
            })
        })
        .boxed()
}

fn command_id(input: &JsonObject) -> Result<&str, PrivetError> {
    input_str(input, "id").ok_or_else(|| invalid_param("id", ""))
}

fn rejected(error: PrivetError) -> ApiReply {
    future::ready(Err(error)).boxed()
}

impl PrivetHandler {
    pub(super) fn handle_commands_execute(&self, input: &JsonObject, user: &UserInfo) -> ApiReply {
        map_command_reply(self.cloud.add_command(input, user))
    }

    pub(super) fn handle_commands_status(&self, input: &JsonObject, user: &UserInfo) -> ApiReply {
        match command_id(input) {
            Ok(id) => map_command_reply(self.cloud.get_command(id, user)),
            Err(e) => rejected(e),
        }
    }

    pub(super) fn handle_commands_cancel(&self, input: &JsonObject, user: &UserInfo) -> ApiReply {
        match command_id(input) {
            Ok(id) => map_command_reply(self.cloud.cancel_command(id, user)),
            Err(e) => rejected(e),
        }
    }

    pub(super) fn handle_commands_list(&self, _input: &JsonObject, user: &UserInfo) -> ApiReply {
        map_command_reply(self.cloud.list_commands(user))
    }
}

// ── checkForUpdates ─────────────────────────────────────────────────

/// A fingerprint the client declared; empty or non-string means absent.
fn declared_fingerprint<'a>(input: &'a JsonObject, key: &str) -> Option<&'a str> {
    input_str(input, key).filter(|value| !value.is_empty())
}

impl PrivetHandler {
    /// How long a long-poll may stay open; `None` is unbounded.
    fn long_poll_window(&self, input: &JsonObject) -> Option<Duration> {
        let mut window = self
            .device
            .http_request_timeout()
            .map(|timeout| timeout.saturating_sub(LONG_POLL_SAFETY_GAP));

        // Negative or non-integer values place no limit.
        if let Some(seconds) = input.get("waitTimeout").and_then(Value::as_u64) {
            let requested = Duration::from_secs(seconds);
            window = Some(window.map_or(requested, |window| window.min(requested)));
        }
        window
    }

    pub(super) fn handle_check_for_updates(&self, input: &JsonObject, _user: &UserInfo) -> ApiReply {
        let current = self.fingerprints();
        let window = self.long_poll_window(input);
        if window == Some(Duration::ZERO) {
            return future::ready(Ok(current.to_json())).boxed();
        }

        let state = declared_fingerprint(input, "stateFingerprint");
        let commands = declared_fingerprint(input, "commandsFingerprint");
        let traits = declared_fingerprint(input, "traitsFingerprint");
        let components = declared_fingerprint(input, "componentsFingerprint");

        if state.is_none() && commands.is_none() && traits.is_none() && components.is_none() {
            return future::ready(Ok(current.to_json())).boxed();
        }

        let stale = |declared: Option<&str>, current: u64| {
            declared.is_some_and(|value| value != current.to_string())
        };
        if stale(state, current.state)
            || stale(commands, current.traits)
            || stale(traits, current.traits)
            || stale(components, current.components)
        {
            return future::ready(Ok(current.to_json())).boxed();
        }

        let baseline = Fingerprints {
            state: if state.is_some() { current.state } else { 0 },
            traits: if traits.is_some() || commands.is_some() {
                current.traits
            } else {
                0
            },
            components: if components.is_some() {
                current.components
            } else {
                0
            },
        };
        let (id, reply) = lock(&self.updates).register(baseline);
        trace!(id, ?window, "long-poll waiting for changes");

        if let Some(window) = window {
            let tracker = Arc::downgrade(&self.updates);
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    () = tokio::time::sleep(window) => {
                        if let Some(updates) = tracker.upgrade() {
                            lock(&updates).expire(id);
                        }
                    }
                }
            });
        }

        let tracker = Arc::clone(&self.updates);
        async move {
            let fingerprints = match reply.await {
                Ok(fingerprints) => fingerprints,
                Err(_) => lock(&tracker).current(),
            };
            Ok(fingerprints.to_json())
        }
        .boxed()
    }
}
