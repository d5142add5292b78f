// ── WiFi bootstrap state machine ──
//
// Decides whether the device hosts its own setup access point or watches
// an existing uplink. Runs as a single background task: connectivity
// changes, credential requests, timers and connect completions are all
// processed one at a time from its queue. Every state entry gets a fresh
// cancellation token; timers and connect attempts carry the token of the
// state that started them and are dropped once that state is left.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;
use strum::{AsRefStr, Display};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::delegate::{CloudDelegate, WifiDelegate};
use crate::error::{ErrorCode, PrivetError};
use crate::provider::{NetworkProvider, NetworkState, WifiProvider};
use crate::state::{ConnectionState, ConnectionStatus, SetupState, SetupStatus, WifiType};
use crate::sync::lock;
use crate::wifi::ssid::SsidGenerator;

/// Offline budget before bootstrapping when no network was ever configured.
const MONITORING_TIMEOUT: Duration = Duration::from_secs(15);
const MONITORING_WITH_SSID_TIMEOUT: Duration = Duration::from_secs(120);
/// How long the setup AP stays up before retrying a known network.
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(600);
const CONNECTING_TIMEOUT: Duration = Duration::from_secs(180);
/// Lets the HTTP reply to `setup/start` go out before the radio changes.
const CONFIGURE_DELAY: Duration = Duration::from_secs(1);

// ── Public state ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr)]
pub enum BootstrapState {
    #[default]
    #[strum(serialize = "disabled")]
    Disabled,
    #[strum(serialize = "waiting")]
    Bootstrapping,
    #[strum(serialize = "monitoring")]
    Monitoring,
    #[strum(serialize = "connecting")]
    Connecting,
}

/// Everything the manager publishes, as one snapshot.
#[derive(Debug, Clone)]
pub struct BootstrapStatus {
    pub state: BootstrapState,
    pub connection_state: ConnectionState,
    pub setup_state: SetupState,
    /// Empty unless the setup access point is up.
    pub hosted_ssid: String,
}

impl Default for BootstrapStatus {
    fn default() -> Self {
        Self {
            state: BootstrapState::Disabled,
            connection_state: ConnectionState::new(ConnectionStatus::Disabled),
            setup_state: SetupState::new(SetupStatus::None),
            hosted_ssid: String::new(),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug)]
enum Event {
    Configure {
        ssid: String,
        passphrase: SecretString,
    },
    /// Work scheduled by a state; ignored once `token` is cancelled.
    Scheduled {
        token: CancellationToken,
        action: Action,
    },
}

#[derive(Debug)]
enum Action {
    MonitorTimeout,
    BootstrapTimeout,
    ConnectTimeout,
    StartConnecting {
        ssid: String,
        passphrase: SecretString,
    },
    ConnectDone {
        ssid: String,
        result: Result<(), PrivetError>,
    },
}

// ── WifiBootstrapManager ─────────────────────────────────────────

/// Handle to the bootstrap state machine.
///
/// Cheaply cloneable. Call [`init`](Self::init) once to start the
/// background task and [`shutdown`](Self::shutdown) to stop it.
#[derive(Clone)]
pub struct WifiBootstrapManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: Arc<Config>,
    network: Arc<dyn NetworkProvider>,
    wifi: Arc<dyn WifiProvider>,
    cloud: Arc<dyn CloudDelegate>,
    status: watch::Sender<BootstrapStatus>,
    events_tx: mpsc::UnboundedSender<Event>,
    launch: Mutex<Option<Launch>>,
    cancel: CancellationToken,
}

/// Parts the background task takes ownership of on `init`.
struct Launch {
    events_rx: mpsc::UnboundedReceiver<Event>,
    ssid_generator: SsidGenerator,
}

impl WifiBootstrapManager {
    pub fn new(
        config: Arc<Config>,
        network: Arc<dyn NetworkProvider>,
        wifi: Arc<dyn WifiProvider>,
        cloud: Arc<dyn CloudDelegate>,
    ) -> Self {
        let (status, _) = watch::channel(BootstrapStatus::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(ManagerInner {
                config,
                network,
                wifi,
                cloud,
                status,
                events_tx,
                launch: Mutex::new(Some(Launch {
                    events_rx,
                    ssid_generator: SsidGenerator::new(),
                })),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Use a specific SSID generator. Has no effect after `init`.
    pub fn with_ssid_generator(self, generator: SsidGenerator) -> Self {
        if let Some(launch) = lock(&self.inner.launch).as_mut() {
            launch.ssid_generator = generator;
        }
        self
    }

    /// Start the state machine. Must run inside a tokio runtime.
    pub fn init(&self) {
        let Some(launch) = lock(&self.inner.launch).take() else {
            warn!("wifi bootstrap manager already started");
            return;
        };
        let connectivity = self.inner.network.subscribe();
        let machine = Machine {
            manager: self.clone(),
            ssid_generator: launch.ssid_generator,
            state_token: self.inner.cancel.child_token(),
            monitor_until: None,
        };
        tokio::spawn(machine.run(launch.events_rx, connectivity));
    }

    /// Stop the background task, cancelling pending timers and taking the
    /// setup access point down.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn state(&self) -> BootstrapState {
        self.inner.status.borrow().state
    }

    pub fn status(&self) -> BootstrapStatus {
        self.inner.status.borrow().clone()
    }

    /// Follow status changes.
    pub fn subscribe(&self) -> watch::Receiver<BootstrapStatus> {
        self.inner.status.subscribe()
    }
}

impl WifiDelegate for WifiBootstrapManager {
    fn connection_state(&self) -> ConnectionState {
        self.inner.status.borrow().connection_state.clone()
    }

    fn setup_state(&self) -> SetupState {
        self.inner.status.borrow().setup_state.clone()
    }

    fn configure_credentials(&self, ssid: &str, passphrase: SecretString) -> Result<(), PrivetError> {
        self.inner
            .status
            .send_modify(|s| s.setup_state = SetupState::new(SetupStatus::InProgress));
        let event = Event::Configure {
            ssid: ssid.to_owned(),
            passphrase,
        };
        if self.inner.events_tx.send(event).is_err() {
            warn!("wifi bootstrap manager is not running, credentials dropped");
        }
        Ok(())
    }

    fn currently_connected_ssid(&self) -> String {
        self.inner.config.settings().last_configured_ssid
    }

    fn hosted_ssid(&self) -> String {
        self.inner.status.borrow().hosted_ssid.clone()
    }

    fn types(&self) -> BTreeSet<WifiType> {
        let mut types = BTreeSet::new();
        if self.inner.wifi.is_wifi24_supported() {
            types.insert(WifiType::Wifi24);
        }
        if self.inner.wifi.is_wifi50_supported() {
            types.insert(WifiType::Wifi50);
        }
        types
    }
}

// ── State machine ────────────────────────────────────────────────

struct Machine {
    manager: WifiBootstrapManager,
    ssid_generator: SsidGenerator,
    /// Cancelled on every state change.
    state_token: CancellationToken,
    /// Offline deadline carried across repeated Monitoring entries.
    monitor_until: Option<Instant>,
}

impl Machine {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut connectivity: watch::Receiver<NetworkState>,
    ) {
        let cancel = self.manager.inner.cancel.clone();
        self.init();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        warn!("network provider stopped reporting connectivity");
                        break;
                    }
                    self.on_connectivity_change();
                }
                Some(event) = events.recv() => self.handle(event),
            }
        }

        self.stop();
    }

    fn inner(&self) -> &ManagerInner {
        &self.manager.inner
    }

    fn state(&self) -> BootstrapState {
        self.manager.state()
    }

    fn has_configured_ssid(&self) -> bool {
        !self.inner().config.settings().last_configured_ssid.is_empty()
    }

    fn is_online(&self) -> bool {
        self.inner().network.connection_state() == NetworkState::Online
    }

    fn set_setup_state(&self, setup_state: SetupState) {
        self.inner().status.send_modify(|s| s.setup_state = setup_state);
    }

    fn init(&mut self) {
        self.update_connection_state();
        if self.has_configured_ssid() {
            self.start_monitoring(MONITORING_WITH_SSID_TIMEOUT);
        } else {
            self.start_monitoring(MONITORING_TIMEOUT);
        }
    }

    fn stop(&mut self) {
        self.state_token.cancel();
        if self.state() == BootstrapState::Bootstrapping {
            self.end_bootstrapping();
        }
        self.inner().status.send_modify(|s| s.state = BootstrapState::Disabled);
        debug!("wifi bootstrap manager stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Configure { ssid, passphrase } => {
                self.schedule(CONFIGURE_DELAY, Action::StartConnecting { ssid, passphrase });
            }
            Event::Scheduled { token, action } => {
                if token.is_cancelled() {
                    trace!(?action, "dropping work scheduled by a previous state");
                    return;
                }
                match action {
                    Action::MonitorTimeout => self.on_monitor_timeout(),
                    Action::BootstrapTimeout => self.on_bootstrap_timeout(),
                    Action::ConnectTimeout => self.on_connect_timeout(),
                    Action::StartConnecting { ssid, passphrase } => {
                        self.start_connecting(ssid, &passphrase);
                    }
                    Action::ConnectDone { ssid, result } => self.on_connect_done(&ssid, result),
                }
            }
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Leave the current state: invalidate its pending work, then run its
    /// exit action.
    fn update_state(&mut self, new_state: BootstrapState) {
        let old_state = self.state();
        debug!(from = %old_state, to = %new_state, "switching bootstrap state");

        self.state_token.cancel();
        self.state_token = self.inner().cancel.child_token();

        if old_state == BootstrapState::Bootstrapping {
            self.end_bootstrapping();
        }
        self.inner().status.send_modify(|s| s.state = new_state);
    }

    fn start_bootstrapping(&mut self) {
        if self.is_online() {
            // Some other interface (e.g. ethernet) is up; no AP needed.
            self.start_monitoring(MONITORING_WITH_SSID_TIMEOUT);
            return;
        }

        self.update_state(BootstrapState::Bootstrapping);
        if self.has_configured_ssid() {
            // Take the AP down periodically to retry the known network.
            self.schedule(BOOTSTRAP_TIMEOUT, Action::BootstrapTimeout);
        }

        let ssid = self.generate_ssid();
        info!(%ssid, "starting setup access point");
        self.inner().wifi.start_access_point(&ssid);
        self.inner().status.send_modify(|s| s.hosted_ssid = ssid);
    }

    fn end_bootstrapping(&self) {
        info!("stopping setup access point");
        self.inner().wifi.stop_access_point();
        self.inner().status.send_modify(|s| s.hosted_ssid.clear());
    }

    fn start_connecting(&mut self, ssid: String, passphrase: &SecretString) {
        info!(%ssid, "connecting to configured network");
        self.update_state(BootstrapState::Connecting);
        self.schedule(CONNECTING_TIMEOUT, Action::ConnectTimeout);

        let attempt = self.inner().wifi.connect(&ssid, passphrase);
        let token = self.state_token.clone();
        let events = self.inner().events_tx.clone();
        tokio::spawn(async move {
            let abandoned = token.clone();
            tokio::select! {
                biased;
                _ = abandoned.cancelled() => {}
                result = attempt => {
                    let _ = events.send(Event::Scheduled {
                        token,
                        action: Action::ConnectDone { ssid, result },
                    });
                }
            }
        });
    }

    fn start_monitoring(&mut self, timeout: Duration) {
        self.monitor_until = None;
        self.continue_monitoring(timeout);
    }

    fn continue_monitoring(&mut self, timeout: Duration) {
        debug!("monitoring connectivity");
        self.update_state(BootstrapState::Monitoring);

        if self.is_online() {
            self.monitor_until = None;
            return;
        }

        let now = Instant::now();
        let deadline = *self.monitor_until.get_or_insert(now + timeout);
        trace!(remaining = ?deadline.saturating_duration_since(now), "waiting for connectivity");
        self.schedule(deadline.saturating_duration_since(now), Action::MonitorTimeout);
    }

    // ── Event handlers ───────────────────────────────────────────

    fn on_connectivity_change(&mut self) {
        self.update_connection_state();

        let state = self.state();
        if state == BootstrapState::Monitoring
            || (state != BootstrapState::Disabled && self.is_online())
        {
            self.continue_monitoring(MONITORING_TIMEOUT);
        }
    }

    fn on_monitor_timeout(&mut self) {
        info!("offline for too long, entering bootstrap mode");
        self.start_bootstrapping();
    }

    fn on_bootstrap_timeout(&mut self) {
        info!("bootstrapping timed out, retrying known network");
        self.start_monitoring(MONITORING_WITH_SSID_TIMEOUT);
    }

    fn on_connect_timeout(&mut self) {
        warn!("timed out connecting to configured network");
        self.set_setup_state(SetupState::failed(PrivetError::new(
            ErrorCode::InvalidState,
            "Timeout connecting to provided network",
        )));
        self.start_bootstrapping();
    }

    fn on_connect_done(&mut self, ssid: &str, result: Result<(), PrivetError>) {
        if let Err(e) = result {
            warn!(error = %e, %ssid, "failed to connect to configured network");
            self.set_setup_state(SetupState::failed(
                e.wrap(ErrorCode::InvalidState, "Failed to connect to provided network"),
            ));
            self.start_bootstrapping();
            return;
        }

        info!(%ssid, "connected to configured network");
        let mut change = self.inner().config.transaction();
        change.set_last_configured_ssid(ssid);
        change.commit();
        self.set_setup_state(SetupState::new(SetupStatus::Success));
        self.start_monitoring(MONITORING_WITH_SSID_TIMEOUT);
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Post `action` back to the queue after `delay`, bound to the
    /// current state.
    fn schedule(&self, delay: Duration, action: Action) {
        let token = self.state_token.clone();
        let events = self.inner().events_tx.clone();
        tokio::spawn(async move {
            let abandoned = token.clone();
            tokio::select! {
                biased;
                _ = abandoned.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = events.send(Event::Scheduled { token, action });
                }
            }
        });
    }

    fn update_connection_state(&self) {
        let network = self.inner().network.connection_state();
        trace!(%network, "network state refreshed");

        let connection_state = if network != NetworkState::Online && !self.has_configured_ssid() {
            ConnectionState::new(ConnectionStatus::Unconfigured)
        } else {
            match network {
                NetworkState::Offline => ConnectionState::new(ConnectionStatus::Offline),
                NetworkState::Error => ConnectionState::failed(PrivetError::new(
                    ErrorCode::InvalidState,
                    "Unknown WiFi error",
                )),
                NetworkState::Connecting => ConnectionState::new(ConnectionStatus::Connecting),
                NetworkState::Online => ConnectionState::new(ConnectionStatus::Online),
            }
        };
        self.inner()
            .status
            .send_modify(|s| s.connection_state = connection_state);
    }

    fn generate_ssid(&self) -> String {
        let fixed = self.inner().config.settings().test_privet_ssid;
        if !fixed.is_empty() {
            return fixed;
        }
        self.ssid_generator
            .generate_ssid(&*self.inner().cloud, Some(&self.manager))
    }
}
