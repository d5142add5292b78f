// Shared fakes for privet-core integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::watch;

use privet_core::{
    AccessToken, AuthScope, AuthType, Clock, CloudDelegate, CommandReply, ConnectionState,
    ConnectionStatus, CryptoType, DeviceDelegate, DnsSdProvider, JsonObject, NetworkProvider,
    NetworkState, PairingConfirmation, PairingSession, PairingType, PrivetError,
    SecurityDelegate, SetupState, SetupStatus, UserAppId, UserInfo, WifiDelegate, WifiProvider,
    WifiType,
};

pub fn object(value: Value) -> JsonObject {
    value.as_object().cloned().unwrap()
}

fn ready<T: Send + 'static>(value: T) -> BoxFuture<'static, T> {
    future::ready(value).boxed()
}

// ── Cloud ───────────────────────────────────────────────────────────

pub struct FakeCloud {
    pub name: Mutex<String>,
    pub description: Mutex<String>,
    pub location: Mutex<String>,
    pub cloud_id: Mutex<String>,
    pub anonymous_max_scope: Mutex<AuthScope>,
    pub connection_state: Mutex<ConnectionState>,
    pub setup_state: Mutex<SetupState>,
    pub setup_result: Mutex<Result<(), PrivetError>>,
    pub setup_calls: Mutex<Vec<(String, String)>>,
    pub device_info: Mutex<Option<(String, String, String)>>,
    pub components: Mutex<JsonObject>,
    /// Components `find_component` resolves; anything else is not found.
    pub component_paths: Mutex<BTreeMap<String, JsonObject>>,
    pub command_reply: Mutex<Result<JsonObject, PrivetError>>,
    pub command_calls: Mutex<Vec<String>>,
    /// Names of the state, trait and component getters called.
    pub snapshot_reads: Mutex<Vec<&'static str>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            name: Mutex::new("TestDevice".into()),
            description: Mutex::new(String::new()),
            location: Mutex::new(String::new()),
            cloud_id: Mutex::new("TestCloudId".into()),
            anonymous_max_scope: Mutex::new(AuthScope::User),
            connection_state: Mutex::new(ConnectionState::new(ConnectionStatus::Online)),
            setup_state: Mutex::new(SetupState::new(SetupStatus::None)),
            setup_result: Mutex::new(Ok(())),
            setup_calls: Mutex::new(Vec::new()),
            device_info: Mutex::new(None),
            snapshot_reads: Mutex::new(Vec::new()),
            components: Mutex::new(object(json!({"test": {}}))),
            component_paths: Mutex::new(BTreeMap::new()),
            command_reply: Mutex::new(Ok(JsonObject::new())),
            command_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCloud {
    fn command(&self, call: String) -> CommandReply {
        self.command_calls.lock().unwrap().push(call);
        ready(self.command_reply.lock().unwrap().clone())
    }

    fn read(&self, getter: &'static str) {
        self.snapshot_reads.lock().unwrap().push(getter);
    }
}

impl CloudDelegate for FakeCloud {
    fn device_id(&self) -> String {
        "TestId".into()
    }
    fn model_id(&self) -> String {
        "ABMID".into()
    }
    fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }
    fn description(&self) -> String {
        self.description.lock().unwrap().clone()
    }
    fn location(&self) -> String {
        self.location.lock().unwrap().clone()
    }
    fn oem_name(&self) -> String {
        "Chromium".into()
    }
    fn model_name(&self) -> String {
        "Brillo".into()
    }
    fn anonymous_max_scope(&self) -> AuthScope {
        *self.anonymous_max_scope.lock().unwrap()
    }
    fn connection_state(&self) -> ConnectionState {
        self.connection_state.lock().unwrap().clone()
    }
    fn setup_state(&self) -> SetupState {
        self.setup_state.lock().unwrap().clone()
    }
    fn cloud_id(&self) -> String {
        self.cloud_id.lock().unwrap().clone()
    }
    fn update_device_info(&self, name: &str, description: &str, location: &str) {
        *self.device_info.lock().unwrap() =
            Some((name.to_owned(), description.to_owned(), location.to_owned()));
    }
    fn setup(&self, ticket_id: &str, user: &str) -> Result<(), PrivetError> {
        self.setup_calls
            .lock()
            .unwrap()
            .push((ticket_id.to_owned(), user.to_owned()));
        self.setup_result.lock().unwrap().clone()
    }
    fn legacy_command_defs(&self) -> JsonObject {
        self.read("legacy_command_defs");
        object(json!({"test": {}}))
    }
    fn legacy_state(&self) -> JsonObject {
        self.read("legacy_state");
        object(json!({"test": {}}))
    }
    fn traits(&self) -> JsonObject {
        self.read("traits");
        object(json!({"test": {}}))
    }
    fn components(&self) -> JsonObject {
        self.read("components");
        self.components.lock().unwrap().clone()
    }
    fn find_component(&self, path: &str) -> Result<JsonObject, PrivetError> {
        self.read("find_component");
        self.component_paths
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PrivetError::new("componentNotFound", format!("No component '{path}'")))
    }
    fn add_command(&self, command: &JsonObject, _user: &UserInfo) -> CommandReply {
        self.command(format!("execute {}", Value::Object(command.clone())))
    }
    fn get_command(&self, id: &str, _user: &UserInfo) -> CommandReply {
        self.command(format!("status {id}"))
    }
    fn cancel_command(&self, id: &str, _user: &UserInfo) -> CommandReply {
        self.command(format!("cancel {id}"))
    }
    fn list_commands(&self, _user: &UserInfo) -> CommandReply {
        self.command("list".into())
    }
}

// ── Security ────────────────────────────────────────────────────────

pub struct FakeSecurity {
    /// Result of parsing any non-anonymous token.
    pub token_user: Mutex<Result<UserInfo, PrivetError>>,
    pub access_token: Mutex<Result<AccessToken, PrivetError>>,
    pub token_requests: Mutex<Vec<(AuthType, String, AuthScope)>>,
    /// When false, no auth, pairing or crypto modes are advertised.
    pub advertise_modes: Mutex<bool>,
    pub client_token_calls: Mutex<Vec<&'static str>>,
}

impl Default for FakeSecurity {
    fn default() -> Self {
        Self {
            token_user: Mutex::new(Ok(UserInfo::new(
                AuthScope::Owner,
                UserAppId::new(AuthType::Local, "1", "app"),
            ))),
            access_token: Mutex::new(Ok(AccessToken {
                token: "GuestAccessToken".into(),
                scope: AuthScope::Viewer,
                ttl: Duration::from_secs(15),
            })),
            token_requests: Mutex::new(Vec::new()),
            advertise_modes: Mutex::new(true),
            client_token_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeSecurity {
    pub fn grant(&self, scope: AuthScope) {
        *self.token_user.lock().unwrap() =
            Ok(UserInfo::new(scope, UserAppId::new(AuthType::Local, "1", "app")));
    }

    fn advertised<T: Ord>(&self, all: impl IntoIterator<Item = T>) -> BTreeSet<T> {
        if *self.advertise_modes.lock().unwrap() {
            all.into_iter().collect()
        } else {
            BTreeSet::new()
        }
    }
}

impl SecurityDelegate for FakeSecurity {
    fn parse_access_token(&self, _token: &str) -> Result<UserInfo, PrivetError> {
        self.token_user.lock().unwrap().clone()
    }
    fn pairing_types(&self) -> BTreeSet<PairingType> {
        self.advertised([PairingType::PinCode, PairingType::EmbeddedCode])
    }
    fn crypto_types(&self) -> BTreeSet<CryptoType> {
        self.advertised([CryptoType::P224Spake2])
    }
    fn auth_types(&self) -> BTreeSet<AuthType> {
        self.advertised([AuthType::Anonymous, AuthType::Pairing, AuthType::Local])
    }
    fn start_pairing(
        &self,
        _mode: PairingType,
        _crypto: CryptoType,
    ) -> Result<PairingSession, PrivetError> {
        Ok(PairingSession {
            session_id: "testSession".into(),
            device_commitment: "testCommitment".into(),
        })
    }
    fn confirm_pairing(
        &self,
        session_id: &str,
        _client_commitment: &str,
    ) -> Result<PairingConfirmation, PrivetError> {
        if session_id != "testSession" {
            return Err(PrivetError::new("unknownSession", format!("Unknown session id: '{session_id}'")));
        }
        Ok(PairingConfirmation {
            cert_fingerprint: "testFingerprint".into(),
            cert_signature: "testSignature".into(),
        })
    }
    fn cancel_pairing(&self, _session_id: &str) -> Result<(), PrivetError> {
        Ok(())
    }
    fn create_access_token(
        &self,
        auth_type: AuthType,
        auth_code: &str,
        desired_scope: AuthScope,
    ) -> Result<AccessToken, PrivetError> {
        self.token_requests
            .lock()
            .unwrap()
            .push((auth_type, auth_code.to_owned(), desired_scope));
        self.access_token.lock().unwrap().clone()
    }
    fn claim_root_client_auth_token(&self) -> Result<String, PrivetError> {
        self.client_token_calls.lock().unwrap().push("claim");
        Ok("RootClientAuthToken".into())
    }
    fn confirm_client_auth_token(&self, token: &str) -> Result<(), PrivetError> {
        self.client_token_calls.lock().unwrap().push("confirm");
        if token.is_empty() {
            return Err(PrivetError::new("invalidAuthCode", "Empty client token"));
        }
        Ok(())
    }
    fn create_session_id(&self) -> String {
        "SessionId".into()
    }
}

// ── WiFi delegate ───────────────────────────────────────────────────

pub struct FakeWifi {
    pub connection_state: Mutex<ConnectionState>,
    pub setup_state: Mutex<SetupState>,
    pub configure_result: Mutex<Result<(), PrivetError>>,
    /// `(ssid, passphrase)` pairs received.
    pub configured: Mutex<Vec<(String, String)>>,
    pub hosted_ssid: Mutex<String>,
    pub types: Mutex<BTreeSet<WifiType>>,
}

impl Default for FakeWifi {
    fn default() -> Self {
        Self {
            connection_state: Mutex::new(ConnectionState::new(ConnectionStatus::Offline)),
            setup_state: Mutex::new(SetupState::new(SetupStatus::None)),
            configure_result: Mutex::new(Ok(())),
            configured: Mutex::new(Vec::new()),
            hosted_ssid: Mutex::new(String::new()),
            types: Mutex::new(BTreeSet::from([WifiType::Wifi24])),
        }
    }
}

impl WifiDelegate for FakeWifi {
    fn connection_state(&self) -> ConnectionState {
        self.connection_state.lock().unwrap().clone()
    }
    fn setup_state(&self) -> SetupState {
        self.setup_state.lock().unwrap().clone()
    }
    fn configure_credentials(&self, ssid: &str, passphrase: SecretString) -> Result<(), PrivetError> {
        self.configured
            .lock()
            .unwrap()
            .push((ssid.to_owned(), passphrase.expose_secret().to_owned()));
        self.configure_result.lock().unwrap().clone()
    }
    fn currently_connected_ssid(&self) -> String {
        "TestSsid".into()
    }
    fn hosted_ssid(&self) -> String {
        self.hosted_ssid.lock().unwrap().clone()
    }
    fn types(&self) -> BTreeSet<WifiType> {
        self.types.lock().unwrap().clone()
    }
}

// ── Device and clock ────────────────────────────────────────────────

pub struct FakeDevice {
    pub http: Mutex<(u16, u16)>,
    pub https: Mutex<(u16, u16)>,
    pub request_timeout: Mutex<Option<Duration>>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            http: Mutex::new((0, 0)),
            https: Mutex::new((0, 0)),
            request_timeout: Mutex::new(None),
        }
    }
}

impl DeviceDelegate for FakeDevice {
    fn http_endpoint(&self) -> (u16, u16) {
        *self.http.lock().unwrap()
    }
    fn https_endpoint(&self) -> (u16, u16) {
        *self.https.lock().unwrap()
    }
    fn http_request_timeout(&self) -> Option<Duration> {
        *self.request_timeout.lock().unwrap()
    }
}

/// Always 1410000001 seconds after the epoch.
pub struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(1_410_000_001, 0).unwrap()
    }
}

// ── Platform providers ──────────────────────────────────────────────

pub struct FakeNetwork {
    state: watch::Sender<NetworkState>,
}

impl FakeNetwork {
    pub fn new(initial: NetworkState) -> Arc<Self> {
        let (state, _) = watch::channel(initial);
        Arc::new(Self { state })
    }

    pub fn set(&self, state: NetworkState) {
        self.state.send_replace(state);
    }
}

impl NetworkProvider for FakeNetwork {
    fn connection_state(&self) -> NetworkState {
        *self.state.borrow()
    }
    fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartAccessPoint(String),
    StopAccessPoint,
    Connect(String),
}

pub struct FakeWifiProvider {
    pub calls: Mutex<Vec<RadioCall>>,
    /// Outcome of `connect`; `None` never completes.
    pub connect_result: Mutex<Option<Result<(), PrivetError>>>,
    pub wifi24: bool,
    pub wifi50: bool,
}

impl Default for FakeWifiProvider {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            connect_result: Mutex::new(Some(Ok(()))),
            wifi24: true,
            wifi50: false,
        }
    }
}

impl FakeWifiProvider {
    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn access_points_started(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RadioCall::StartAccessPoint(_)))
            .count()
    }
}

impl WifiProvider for FakeWifiProvider {
    fn start_access_point(&self, ssid: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(RadioCall::StartAccessPoint(ssid.to_owned()));
    }
    fn stop_access_point(&self) {
        self.calls.lock().unwrap().push(RadioCall::StopAccessPoint);
    }
    fn connect(&self, ssid: &str, _passphrase: &SecretString) -> BoxFuture<'static, Result<(), PrivetError>> {
        self.calls
            .lock()
            .unwrap()
            .push(RadioCall::Connect(ssid.to_owned()));
        match self.connect_result.lock().unwrap().clone() {
            Some(result) => ready(result),
            None => future::pending().boxed(),
        }
    }
    fn is_wifi24_supported(&self) -> bool {
        self.wifi24
    }
    fn is_wifi50_supported(&self) -> bool {
        self.wifi50
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsSdCall {
    Publish {
        service_type: String,
        port: u16,
        txt: Vec<String>,
    },
    Stop(String),
}

#[derive(Default)]
pub struct FakeDnsSd {
    pub calls: Mutex<Vec<DnsSdCall>>,
}

impl FakeDnsSd {
    pub fn calls(&self) -> Vec<DnsSdCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl DnsSdProvider for FakeDnsSd {
    fn publish_service(&self, service_type: &str, port: u16, txt: &[String]) {
        self.calls.lock().unwrap().push(DnsSdCall::Publish {
            service_type: service_type.to_owned(),
            port,
            txt: txt.to_vec(),
        });
    }
    fn stop_publishing(&self, service_type: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(DnsSdCall::Stop(service_type.to_owned()));
    }
}
