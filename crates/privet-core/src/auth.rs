// ── Authorization model ──
//
// Scopes gate endpoints and clamp requested tokens, so their declaration
// order is the protocol's privilege order.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Access level granted to a request, lowest first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum AuthScope {
    #[default]
    None,
    Viewer,
    User,
    Manager,
    Owner,
}

/// How a client authenticates in `/privet/v3/auth`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum AuthType {
    #[default]
    Anonymous,
    Pairing,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum PairingType {
    PinCode,
    EmbeddedCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
pub enum CryptoType {
    #[strum(serialize = "p224_spake2")]
    P224Spake2,
}

/// Who made a request: authentication type plus opaque user and app ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAppId {
    pub auth_type: AuthType,
    pub user: Vec<u8>,
    pub app: Vec<u8>,
}

impl UserAppId {
    pub fn new(auth_type: AuthType, user: impl Into<Vec<u8>>, app: impl Into<Vec<u8>>) -> Self {
        Self {
            auth_type,
            user: user.into(),
            app: app.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.app.is_empty()
    }
}

/// Identity and scope resolved from a request's access token.
///
/// The default value is the anonymous caller: scope `None`, empty ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    scope: AuthScope,
    id: UserAppId,
}

impl UserInfo {
    /// A caller without scope never carries an identity.
    pub fn new(scope: AuthScope, id: UserAppId) -> Self {
        let id = if scope == AuthScope::None {
            UserAppId::default()
        } else {
            id
        };
        Self { scope, id }
    }

    pub fn scope(&self) -> AuthScope {
        self.scope
    }

    pub fn id(&self) -> &UserAppId {
        &self.id
    }
}
