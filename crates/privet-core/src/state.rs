// ── Connection and setup states ──
//
// Status-or-error value objects reported by the cloud and WiFi delegates.

use std::fmt;

use strum::{AsRefStr, Display, EnumString};

use crate::JsonObject;
use crate::error::PrivetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum ConnectionStatus {
    Disabled,
    Unconfigured,
    Connecting,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum SetupStatus {
    None,
    InProgress,
    Success,
}

/// WiFi frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
pub enum WifiType {
    #[strum(serialize = "2.4GHz")]
    Wifi24,
    #[strum(serialize = "5.0GHz")]
    Wifi50,
}

/// Either a status or the error that replaced it.
///
/// There is no way to read a status out of an error-bearing value:
/// [`status`](Self::status) returns `None` and [`is_status`](Self::is_status)
/// is always false.
#[derive(Debug, Clone)]
pub struct StateValue<S> {
    inner: Result<S, PrivetError>,
}

pub type ConnectionState = StateValue<ConnectionStatus>;
pub type SetupState = StateValue<SetupStatus>;

impl<S: Copy + PartialEq + fmt::Display> StateValue<S> {
    pub fn new(status: S) -> Self {
        Self { inner: Ok(status) }
    }

    pub fn failed(error: PrivetError) -> Self {
        Self { inner: Err(error) }
    }

    pub fn status(&self) -> Option<S> {
        self.inner.as_ref().ok().copied()
    }

    pub fn error(&self) -> Option<&PrivetError> {
        self.inner.as_ref().err()
    }

    pub fn is_status(&self, status: S) -> bool {
        self.status() == Some(status)
    }

    /// Set `status` (and `error` when failed) on a JSON section.
    pub(crate) fn write_to(&self, section: &mut JsonObject) {
        match &self.inner {
            Ok(status) => {
                section.insert("status".into(), status.to_string().into());
            }
            Err(error) => {
                section.insert("status".into(), "error".into());
                section.insert("error".into(), error.to_json().into());
            }
        }
    }
}
