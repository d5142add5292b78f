// ── Privet request router ──
//
// Owns the endpoint table, authorizes each request against the endpoint's
// minimum scope and renders the outcome as an HTTP status plus JSON body.
// Also owns the fingerprints that `checkForUpdates` long-polls wait on.

mod components;
mod endpoints;
mod response;
mod updates;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::JsonObject;
use crate::auth::{AuthScope, AuthType, UserInfo};
use crate::delegate::{CloudChange, CloudDelegate, DeviceDelegate, SecurityDelegate, WifiDelegate};
use crate::error::{ErrorCode, PrivetError};
use crate::provider::{Clock, SystemClock};
use crate::sync::lock;

pub use components::{clone_component, clone_component_tree};
pub use response::{Response, status_for};
pub use updates::Fingerprints;

use updates::UpdateTracker;

/// Result of an endpoint that answers later.
type ApiReply = BoxFuture<'static, Result<JsonObject, PrivetError>>;

#[derive(Clone, Copy)]
enum ApiHandler {
    Immediate(fn(&PrivetHandler, &JsonObject, &UserInfo) -> Result<JsonObject, PrivetError>),
    Deferred(fn(&PrivetHandler, &JsonObject, &UserInfo) -> ApiReply),
}

#[derive(Clone, Copy)]
struct Endpoint {
    handler: ApiHandler,
    scope: AuthScope,
    https_only: bool,
}

// ── PrivetHandler ───────────────────────────────────────────────────

/// Routes Privet API calls to their endpoints.
///
/// Dropping the handler answers every pending `checkForUpdates` request
/// with the fingerprints current at that moment.
pub struct PrivetHandler {
    cloud: Arc<dyn CloudDelegate>,
    device: Arc<dyn DeviceDelegate>,
    security: Arc<dyn SecurityDelegate>,
    wifi: Option<Arc<dyn WifiDelegate>>,
    clock: Arc<dyn Clock>,
    endpoints: BTreeMap<&'static str, Endpoint>,
    updates: Arc<Mutex<UpdateTracker>>,
    cancel: CancellationToken,
}

impl PrivetHandler {
    pub fn new(
        cloud: Arc<dyn CloudDelegate>,
        device: Arc<dyn DeviceDelegate>,
        security: Arc<dyn SecurityDelegate>,
        wifi: Option<Arc<dyn WifiDelegate>>,
    ) -> Self {
        Self::with_clock(cloud, device, security, wifi, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cloud: Arc<dyn CloudDelegate>,
        device: Arc<dyn DeviceDelegate>,
        security: Arc<dyn SecurityDelegate>,
        wifi: Option<Arc<dyn WifiDelegate>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut handler = Self {
            cloud,
            device,
            security,
            wifi,
            clock,
            endpoints: BTreeMap::new(),
            updates: Arc::new(Mutex::new(UpdateTracker::default())),
            cancel: CancellationToken::new(),
        };
        handler.register_endpoints();
        handler
    }

    fn register_endpoints(&mut self) {
        use ApiHandler::{Deferred, Immediate};

        self.add("/privet/info", Immediate(Self::handle_info), AuthScope::None);
        self.add("/privet/v3/pairing/start", Immediate(Self::handle_pairing_start), AuthScope::None);
        self.add("/privet/v3/pairing/confirm", Immediate(Self::handle_pairing_confirm), AuthScope::None);
        self.add("/privet/v3/pairing/cancel", Immediate(Self::handle_pairing_cancel), AuthScope::None);

        self.add_secure("/privet/v3/auth", Immediate(Self::handle_auth), AuthScope::None);
        self.add_secure(
            "/privet/v3/accessControl/claim",
            Immediate(Self::handle_access_control_claim),
            AuthScope::Owner,
        );
        self.add_secure(
            "/privet/v3/accessControl/confirm",
            Immediate(Self::handle_access_control_confirm),
            AuthScope::Owner,
        );
        self.add_secure("/privet/v3/setup/start", Immediate(Self::handle_setup_start), AuthScope::Manager);
        self.add_secure("/privet/v3/setup/status", Immediate(Self::handle_setup_status), AuthScope::Manager);
        self.add_secure("/privet/v3/state", Immediate(Self::handle_state), AuthScope::Viewer);
        self.add_secure("/privet/v3/commandDefs", Immediate(Self::handle_command_defs), AuthScope::Viewer);
        self.add_secure("/privet/v3/commands/execute", Deferred(Self::handle_commands_execute), AuthScope::Viewer);
        self.add_secure("/privet/v3/commands/status", Deferred(Self::handle_commands_status), AuthScope::Viewer);
        self.add_secure("/privet/v3/commands/cancel", Deferred(Self::handle_commands_cancel), AuthScope::Viewer);
        self.add_secure("/privet/v3/commands/list", Deferred(Self::handle_commands_list), AuthScope::Viewer);
        self.add_secure("/privet/v3/checkForUpdates", Deferred(Self::handle_check_for_updates), AuthScope::Viewer);
        self.add_secure("/privet/v3/traits", Immediate(Self::handle_traits), AuthScope::Viewer);
        self.add_secure("/privet/v3/components", Immediate(Self::handle_components), AuthScope::Viewer);
    }

    fn add(&mut self, path: &'static str, handler: ApiHandler, scope: AuthScope) {
        self.insert(path, handler, scope, false);
    }

    fn add_secure(&mut self, path: &'static str, handler: ApiHandler, scope: AuthScope) {
        self.insert(path, handler, scope, true);
    }

    fn insert(&mut self, path: &'static str, handler: ApiHandler, scope: AuthScope, https_only: bool) {
        let previous = self.endpoints.insert(
            path,
            Endpoint {
                handler,
                scope,
                https_only,
            },
        );
        debug_assert!(previous.is_none(), "endpoint {path} registered twice");
    }

    /// Paths served over plain HTTP.
    pub fn http_paths(&self) -> Vec<&'static str> {
        self.endpoints
            .iter()
            .filter(|(_, endpoint)| !endpoint.https_only)
            .map(|(path, _)| *path)
            .collect()
    }

    /// Every registered path.
    pub fn https_paths(&self) -> Vec<&'static str> {
        self.endpoints.keys().copied().collect()
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Handle one API call.
    ///
    /// `input` is the parsed request body, `None` when it was not valid
    /// JSON. The returned future resolves exactly once; most endpoints
    /// resolve it immediately. Must be called within a tokio runtime.
    pub fn handle_request(
        &self,
        path: &str,
        auth_header: &str,
        input: Option<&JsonObject>,
    ) -> BoxFuture<'static, Response> {
        let result = self.authorize(path, auth_header, input).map(|(endpoint, input, user)| {
            debug!(path, scope = %user.scope(), "dispatching privet request");
            match endpoint.handler {
                ApiHandler::Immediate(handler) => future::ready(handler(self, input, &user)).boxed(),
                ApiHandler::Deferred(handler) => handler(self, input, &user),
            }
        });

        match result {
            Ok(reply) => reply.map(Response::from).boxed(),
            Err(e) => {
                debug!(path, error = %e, "rejecting privet request");
                future::ready(Response::from_error(&e)).boxed()
            }
        }
    }

    fn authorize<'a>(
        &self,
        path: &str,
        auth_header: &str,
        input: Option<&'a JsonObject>,
    ) -> Result<(Endpoint, &'a JsonObject, UserInfo), PrivetError> {
        let input = input.ok_or_else(|| PrivetError::new(ErrorCode::InvalidFormat, "Malformed JSON"))?;
        let endpoint = *self
            .endpoints
            .get(path)
            .ok_or_else(|| PrivetError::new(ErrorCode::NotFound, "Path not found"))?;

        if auth_header.is_empty() {
            return Err(PrivetError::new(
                ErrorCode::MissingAuthorization,
                "Authorization header must not be empty",
            ));
        }
        let token = auth_header.split_once(' ').map_or("", |(_, token)| token.trim());
        if token.is_empty() {
            return Err(PrivetError::new(
                ErrorCode::InvalidAuthorization,
                format!("Invalid authorization header: {auth_header}"),
            ));
        }

        let user = if token == AuthType::Anonymous.as_ref() {
            UserInfo::default()
        } else {
            self.security.parse_access_token(token)?
        };

        if endpoint.scope > user.scope() {
            return Err(PrivetError::new(
                ErrorCode::InvalidAuthorizationScope,
                format!("Scope '{}' does not allow '{path}'", user.scope()),
            ));
        }
        Ok((endpoint, input, user))
    }

    // ── Change notifications ─────────────────────────────────────────

    /// Device state changed. State is part of the component tree, so both
    /// fingerprints move.
    pub fn on_state_changed(&self) {
        lock(&self.updates).bump_state();
    }

    pub fn on_traits_changed(&self) {
        lock(&self.updates).bump_traits();
    }

    pub fn on_component_tree_changed(&self) {
        lock(&self.updates).bump_components();
    }

    pub fn fingerprints(&self) -> Fingerprints {
        lock(&self.updates).current()
    }

    /// Apply cloud change notifications from `changes` until the handler is
    /// dropped or the sender goes away.
    pub fn follow_changes(&self, mut changes: broadcast::Receiver<CloudChange>) -> JoinHandle<()> {
        let tracker = Arc::downgrade(&self.updates);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => change,
                };
                let Some(updates) = tracker.upgrade() else { break };
                let mut tracker = lock(&updates);
                match change {
                    Ok(CloudChange::State) => tracker.bump_state(),
                    Ok(CloudChange::Traits) => tracker.bump_traits(),
                    Ok(CloudChange::ComponentTree) => tracker.bump_components(),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "cloud change notifications lagged, bumping all fingerprints");
                        tracker.bump_state();
                        tracker.bump_traits();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("stopped following cloud changes");
        })
    }

    // ── Helpers shared by endpoints ──────────────────────────────────

    /// Anonymous clients get nothing while the device hosts its setup AP.
    fn anonymous_max_scope(&self) -> AuthScope {
        match &self.wifi {
            Some(wifi) if !wifi.hosted_ssid().is_empty() => AuthScope::None,
            _ => self.cloud.anonymous_max_scope(),
        }
    }
}

impl Drop for PrivetHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
        lock(&self.updates).release_all();
    }
}

impl std::fmt::Debug for PrivetHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivetHandler")
            .field("endpoints", &self.endpoints.len())
            .field("fingerprints", &self.fingerprints())
            .field("pending_long_polls", &lock(&self.updates).pending_len())
            .field("wifi", &self.wifi.is_some())
            .finish_non_exhaustive()
    }
}
