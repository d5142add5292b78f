// ── Runtime settings ──
//
// Device settings shared by the core's components. Changes go through a
// Transaction: stage, commit once, persist once, notify listeners.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Mutex, RwLock};

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::AuthScope;
use crate::sync::{lock, read, write};

/// Persisted device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "scalar_string")]
    pub device_id: String,
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub description: String,
    #[serde(deserialize_with = "scalar_string")]
    pub location: String,
    #[serde(deserialize_with = "scalar_string")]
    pub oem_name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub model_name: String,
    /// Five-character model manifest id.
    #[serde(deserialize_with = "scalar_string")]
    pub model_id: String,
    pub local_anonymous_access_role: AuthScope,
    pub local_discovery_enabled: bool,
    pub local_pairing_enabled: bool,
    /// SSID of the last network the device joined through setup.
    #[serde(deserialize_with = "scalar_string")]
    pub last_configured_ssid: String,
    /// Fixed setup SSID, replacing the generated one. Testing aid.
    #[serde(deserialize_with = "scalar_string")]
    pub test_privet_ssid: String,
}

/// Text field that also takes a bare number or bool. Environment layers
/// type-guess their values, so `PRIVET_DEVICE_ID=12345` arrives as an integer.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScalarVisitor;

    impl Visitor<'_> for ScalarVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string, number or boolean")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_char<E: de::Error>(self, v: char) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(ScalarVisitor)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            name: "Privet device".into(),
            description: String::new(),
            location: String::new(),
            oem_name: String::new(),
            model_name: String::new(),
            model_id: "AAAAA".into(),
            local_anonymous_access_role: AuthScope::Viewer,
            local_discovery_enabled: true,
            local_pairing_enabled: true,
            last_configured_ssid: String::new(),
            test_privet_ssid: String::new(),
        }
    }
}

/// Destination for committed settings.
pub trait SettingsStore: Send + Sync {
    fn save(&self, settings: &Settings) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

pub type SettingsCallback = Box<dyn Fn(&Settings) + Send + Sync>;

// ── Config ──────────────────────────────────────────────────────────

/// Current settings plus the store and listeners that follow them.
pub struct Config {
    settings: RwLock<Settings>,
    store: Option<Box<dyn SettingsStore>>,
    listeners: Mutex<Vec<SettingsCallback>>,
}

impl Config {
    /// In-memory config; commits are never persisted.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            store: None,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn with_store(settings: Settings, store: impl SettingsStore + 'static) -> Self {
        Self {
            store: Some(Box::new(store)),
            ..Self::new(settings)
        }
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        read(&self.settings).clone()
    }

    /// Register a listener. It runs once right away, then after every commit.
    ///
    /// Listeners must not register further listeners.
    pub fn add_on_changed_callback(&self, callback: impl Fn(&Settings) + Send + Sync + 'static) {
        callback(&self.settings());
        lock(&self.listeners).push(Box::new(callback));
    }

    /// Start a read-modify-commit cycle on a copy of the current settings.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            config: self,
            settings: self.settings(),
            save: true,
            committed: false,
        }
    }

    fn apply(&self, settings: Settings, save: bool) {
        *write(&self.settings) = settings.clone();

        if save {
            if let Some(store) = &self.store {
                match store.save(&settings) {
                    Ok(()) => debug!("settings saved"),
                    Err(e) => warn!(error = %e, "failed to save settings"),
                }
            }
        }

        for listener in lock(&self.listeners).iter() {
            listener(&settings);
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("settings", &*read(&self.settings))
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

// ── Transaction ─────────────────────────────────────────────────────

/// Staged settings change. Dropping an uncommitted transaction commits it.
pub struct Transaction<'a> {
    config: &'a Config,
    settings: Settings,
    save: bool,
    committed: bool,
}

impl Transaction<'_> {
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.settings.name = name.into();
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.settings.description = description.into();
        self
    }

    pub fn set_location(&mut self, location: impl Into<String>) -> &mut Self {
        self.settings.location = location.into();
        self
    }

    pub fn set_local_anonymous_access_role(&mut self, role: AuthScope) -> &mut Self {
        self.settings.local_anonymous_access_role = role;
        self
    }

    pub fn set_local_discovery_enabled(&mut self, enabled: bool) -> &mut Self {
        self.settings.local_discovery_enabled = enabled;
        self
    }

    pub fn set_local_pairing_enabled(&mut self, enabled: bool) -> &mut Self {
        self.settings.local_pairing_enabled = enabled;
        self
    }

    pub fn set_last_configured_ssid(&mut self, ssid: impl Into<String>) -> &mut Self {
        self.settings.last_configured_ssid = ssid.into();
        self
    }

    /// Whether the commit reaches the settings store. Defaults to true.
    pub fn set_save(&mut self, save: bool) -> &mut Self {
        self.save = save;
        self
    }

    pub fn commit(mut self) {
        self.apply();
    }

    fn apply(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        let settings = std::mem::take(&mut self.settings);
        self.config.apply(settings, self.save);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.apply();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default, Clone)]
    struct CountingStore {
        saves: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<Settings>>>,
    }

    impl SettingsStore for CountingStore {
        fn save(&self, settings: &Settings) -> Result<(), Box<dyn StdError + Send + Sync>> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    #[test]
    fn commit_applies_saves_once_and_notifies() {
        let store = CountingStore::default();
        let config = Config::with_store(Settings::default(), store.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        config.add_on_changed_callback(move |s| sink.lock().unwrap().push(s.last_configured_ssid.clone()));

        let mut tx = config.transaction();
        tx.set_last_configured_ssid("home").set_name("Kitchen");
        tx.commit();

        assert_eq!(config.settings().last_configured_ssid, "home");
        assert_eq!(config.settings().name, "Kitchen");
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert_eq!(store.last.lock().unwrap().as_ref().unwrap().name, "Kitchen");
        assert_eq!(*seen.lock().unwrap(), vec![String::new(), "home".to_string()]);
    }

    #[test]
    fn dropped_transaction_commits() {
        let config = Config::new(Settings::default());
        {
            let mut tx = config.transaction();
            tx.set_location("Hall");
        }
        assert_eq!(config.settings().location, "Hall");
    }

    #[test]
    fn unsaved_commit_skips_store() {
        let store = CountingStore::default();
        let config = Config::with_store(Settings::default(), store.clone());

        let mut tx = config.transaction();
        tx.set_local_pairing_enabled(false).set_save(false);
        tx.commit();

        assert!(!config.settings().local_pairing_enabled);
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn defaults_allow_viewer_anonymous_access() {
        let settings = Settings::default();
        assert_eq!(settings.local_anonymous_access_role, AuthScope::Viewer);
        assert_eq!(settings.model_id.len(), 5);
    }

    #[test]
    fn text_fields_accept_bare_scalars() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "device_id": 12345,
            "name": true,
            "last_configured_ssid": 1234,
            "test_privet_ssid": -7,
            "local_pairing_enabled": false,
        }))
        .unwrap();

        assert_eq!(settings.device_id, "12345");
        assert_eq!(settings.name, "true");
        assert_eq!(settings.last_configured_ssid, "1234");
        assert_eq!(settings.test_privet_ssid, "-7");
        assert!(!settings.local_pairing_enabled);
        assert_eq!(settings.model_id, "AAAAA");
    }

    #[test]
    fn text_fields_reject_structured_values() {
        let result = serde_json::from_value::<Settings>(serde_json::json!({ "name": ["a"] }));
        assert!(result.is_err());
    }
}
