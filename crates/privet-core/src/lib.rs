//! Device-side core of the Privet local provisioning protocol.
//!
//! Everything a device needs between "an HTTP request arrived" and "a JSON
//! reply goes back", plus the WiFi bootstrap logic that decides when the
//! device hosts its own setup access point:
//!
//! - **[`PrivetHandler`]** Endpoint registry and request router. Checks the
//!   authorization header against each endpoint's minimum [`AuthScope`],
//!   dispatches to the endpoint, and renders failures as Privet error
//!   envelopes with the mapped HTTP status. Also owns the state/traits/
//!   components [`Fingerprints`] and the `checkForUpdates` long-poll queue.
//!
//! - **[`WifiBootstrapManager`]** Background state machine (Monitoring,
//!   Bootstrapping, Connecting) driven by connectivity changes and its own
//!   timers. Implements [`WifiDelegate`] for the router.
//!
//! - **[`SsidGenerator`]** Derives the setup access point SSID and the
//!   two-character capability flags advertised over DNS-SD.
//!
//! - **[`Publisher`]** Keeps the `_privet._tcp` DNS-SD record in sync with
//!   the device identity and setup flags.
//!
//! - **[`Config`]** Runtime settings with read-modify-commit
//!   [`Transaction`]s, persisted through a pluggable [`SettingsStore`].
//!
//! Transport, cryptography, the cloud backend and OS WiFi control stay
//! outside the crate; they plug in through the traits in [`delegate`] and
//! [`provider`].

pub mod auth;
pub mod config;
pub mod delegate;
pub mod device_kind;
pub mod error;
pub mod handler;
pub mod provider;
pub mod publisher;
pub mod state;
pub mod wifi;

mod sync;

/// JSON object as exchanged with clients and collaborators.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::{AuthScope, AuthType, CryptoType, PairingType, UserAppId, UserInfo};
pub use config::{Config, Settings, SettingsStore, Transaction};
pub use delegate::{
    AccessToken, CloudChange, CloudDelegate, CommandReply, DeviceDelegate, PairingConfirmation,
    PairingSession, SecurityDelegate, WifiDelegate,
};
pub use error::{ErrorCode, PrivetError};
pub use handler::{Fingerprints, PrivetHandler, Response};
pub use provider::{Clock, DnsSdProvider, NetworkProvider, NetworkState, SystemClock, WifiProvider};
pub use publisher::Publisher;
pub use state::{ConnectionState, ConnectionStatus, SetupState, SetupStatus, StateValue, WifiType};
pub use wifi::{BootstrapState, BootstrapStatus, SsidGenerator, WifiBootstrapManager};
