// ── Platform providers ──
//
// Hooks into the OS: connectivity, the WiFi radio, the DNS-SD responder
// and the wall clock.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use strum::{AsRefStr, Display};
use tokio::sync::watch;

use crate::error::PrivetError;

/// Raw uplink state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum NetworkState {
    Offline,
    Error,
    Connecting,
    Online,
}

pub trait NetworkProvider: Send + Sync {
    fn connection_state(&self) -> NetworkState;
    /// Connectivity-change notifications.
    fn subscribe(&self) -> watch::Receiver<NetworkState>;
}

pub trait WifiProvider: Send + Sync {
    fn start_access_point(&self, ssid: &str);
    fn stop_access_point(&self);
    /// Join `ssid`. Resolves once the attempt succeeds or fails.
    fn connect(&self, ssid: &str, passphrase: &SecretString) -> BoxFuture<'static, Result<(), PrivetError>>;
    fn is_wifi24_supported(&self) -> bool;
    fn is_wifi50_supported(&self) -> bool;
}

pub trait DnsSdProvider: Send + Sync {
    fn publish_service(&self, service_type: &str, port: u16, txt: &[String]);
    fn stop_publishing(&self, service_type: &str);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
