// ── Setup SSID and discovery flags ──
//
// SSID layout: "<name> <idx>.<model id><flags>prv". Name plus index fit
// in 20 bytes; the tail is always 11 bytes, so the SSID never exceeds
// the 31 bytes a beacon can carry.

use rand::Rng;

use crate::delegate::{CloudDelegate, WifiDelegate};
use crate::state::{ConnectionState, ConnectionStatus, WifiType};

const DEVICE_NAME_SIZE: usize = 20;
const MODEL_ID_SIZE: usize = 5;
const SSID_SUFFIX: &str = "prv";
const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

type IndexSource = Box<dyn Fn() -> u32 + Send + Sync>;

/// Builds setup SSIDs and capability flags from delegate state.
pub struct SsidGenerator {
    random_index: IndexSource,
}

impl Default for SsidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SsidGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsidGenerator").finish_non_exhaustive()
    }
}

impl SsidGenerator {
    /// Index drawn uniformly from `0..100` for each SSID.
    pub fn new() -> Self {
        Self::with_index_source(|| rand::thread_rng().gen_range(0..100))
    }

    /// Replace the random index, e.g. with a constant in tests.
    pub fn with_index_source(source: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        Self {
            random_index: Box::new(source),
        }
    }

    /// Two base64 characters.
    ///
    /// First: bit 0 = WiFi needs setup, bit 1 = cloud registration needed.
    /// Second: bit 0 = 2.4GHz supported, bit 1 = 5GHz supported.
    pub fn generate_flags(cloud: &dyn CloudDelegate, wifi: Option<&dyn WifiDelegate>) -> String {
        let mut setup = 0_u8;
        if wifi.is_some_and(|w| is_setup_needed(&w.connection_state())) {
            setup |= 0b01;
        }
        if is_setup_needed(&cloud.connection_state()) {
            setup |= 0b10;
        }

        let mut bands = 0_u8;
        if let Some(wifi) = wifi {
            let types = wifi.types();
            if types.contains(&WifiType::Wifi24) {
                bands |= 0b01;
            }
            if types.contains(&WifiType::Wifi50) {
                bands |= 0b10;
            }
        }

        [setup, bands]
            .into_iter()
            .map(|bits| char::from(BASE64_ALPHABET[usize::from(bits)]))
            .collect()
    }

    pub fn generate_ssid(&self, cloud: &dyn CloudDelegate, wifi: Option<&dyn WifiDelegate>) -> String {
        let index = (self.random_index)().to_string();
        let name = cloud.name();
        let name = truncate(&name, DEVICE_NAME_SIZE.saturating_sub(index.len() + 1));
        let model_id = fit_model_id(&cloud.model_id());
        let flags = Self::generate_flags(cloud, wifi);

        format!("{name} {index}.{model_id}{flags}{SSID_SUFFIX}")
    }
}

fn is_setup_needed(state: &ConnectionState) -> bool {
    state.error().is_some() || state.is_status(ConnectionStatus::Unconfigured)
}

/// Longest prefix of `s` within `max` bytes, cut on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Exactly five bytes: truncated, or left-padded with spaces.
fn fit_model_id(model_id: &str) -> String {
    let model_id = truncate(model_id, MODEL_ID_SIZE);
    let padding = " ".repeat(MODEL_ID_SIZE - model_id.len());
    format!("{padding}{model_id}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use secrecy::SecretString;

    use super::*;
    use crate::JsonObject;
    use crate::auth::{AuthScope, UserInfo};
    use crate::delegate::CommandReply;
    use crate::error::{ErrorCode, PrivetError};
    use crate::state::{SetupState, SetupStatus};

    struct Cloud {
        name: String,
        state: ConnectionState,
    }

    impl Cloud {
        fn named(name: &str) -> Self {
            Self {
                name: name.into(),
                state: ConnectionState::new(ConnectionStatus::Online),
            }
        }
    }

    impl CloudDelegate for Cloud {
        fn device_id(&self) -> String {
            "id".into()
        }
        fn model_id(&self) -> String {
            "ABMID".into()
        }
        fn name(&self) -> String {
            self.name.clone()
        }
        fn description(&self) -> String {
            String::new()
        }
        fn location(&self) -> String {
            String::new()
        }
        fn oem_name(&self) -> String {
            String::new()
        }
        fn model_name(&self) -> String {
            String::new()
        }
        fn anonymous_max_scope(&self) -> AuthScope {
            AuthScope::Viewer
        }
        fn connection_state(&self) -> ConnectionState {
            self.state.clone()
        }
        fn setup_state(&self) -> SetupState {
            SetupState::new(SetupStatus::None)
        }
        fn cloud_id(&self) -> String {
            String::new()
        }
        fn update_device_info(&self, _: &str, _: &str, _: &str) {}
        fn setup(&self, _: &str, _: &str) -> Result<(), PrivetError> {
            Ok(())
        }
        fn legacy_command_defs(&self) -> JsonObject {
            JsonObject::new()
        }
        fn legacy_state(&self) -> JsonObject {
            JsonObject::new()
        }
        fn traits(&self) -> JsonObject {
            JsonObject::new()
        }
        fn components(&self) -> JsonObject {
            JsonObject::new()
        }
        fn find_component(&self, path: &str) -> Result<JsonObject, PrivetError> {
            Err(PrivetError::new("componentNotFound", path))
        }
        fn add_command(&self, _: &JsonObject, _: &UserInfo) -> CommandReply {
            unreachable!()
        }
        fn get_command(&self, _: &str, _: &UserInfo) -> CommandReply {
            unreachable!()
        }
        fn cancel_command(&self, _: &str, _: &UserInfo) -> CommandReply {
            unreachable!()
        }
        fn list_commands(&self, _: &UserInfo) -> CommandReply {
            unreachable!()
        }
    }

    struct Wifi {
        state: ConnectionState,
        types: BTreeSet<WifiType>,
    }

    impl WifiDelegate for Wifi {
        fn connection_state(&self) -> ConnectionState {
            self.state.clone()
        }
        fn setup_state(&self) -> SetupState {
            SetupState::new(SetupStatus::None)
        }
        fn configure_credentials(&self, _: &str, _: SecretString) -> Result<(), PrivetError> {
            Ok(())
        }
        fn currently_connected_ssid(&self) -> String {
            String::new()
        }
        fn hosted_ssid(&self) -> String {
            String::new()
        }
        fn types(&self) -> BTreeSet<WifiType> {
            self.types.clone()
        }
    }

    fn online_wifi(types: &[WifiType]) -> Wifi {
        Wifi {
            state: ConnectionState::new(ConnectionStatus::Online),
            types: types.iter().copied().collect(),
        }
    }

    #[test]
    fn flags_without_wifi() {
        let cloud = Cloud::named("TestDevice");
        assert_eq!(SsidGenerator::generate_flags(&cloud, None), "AA");
    }

    #[test]
    fn flags_encode_bands() {
        let cloud = Cloud::named("TestDevice");
        let wifi = online_wifi(&[WifiType::Wifi24]);
        assert_eq!(SsidGenerator::generate_flags(&cloud, Some(&wifi)), "AB");

        let wifi = online_wifi(&[WifiType::Wifi24, WifiType::Wifi50]);
        assert_eq!(SsidGenerator::generate_flags(&cloud, Some(&wifi)), "AD");
    }

    #[test]
    fn flags_encode_pending_setup() {
        let mut cloud = Cloud::named("TestDevice");
        cloud.state = ConnectionState::new(ConnectionStatus::Unconfigured);
        let wifi = Wifi {
            state: ConnectionState::failed(PrivetError::new(ErrorCode::InvalidState, "down")),
            types: BTreeSet::new(),
        };
        assert_eq!(SsidGenerator::generate_flags(&cloud, Some(&wifi)), "DA");

        cloud.state = ConnectionState::new(ConnectionStatus::Offline);
        assert_eq!(SsidGenerator::generate_flags(&cloud, Some(&wifi)), "BA");
    }

    #[test]
    fn ssid_layout() {
        let cloud = Cloud::named("TestDevice");
        let wifi = online_wifi(&[WifiType::Wifi24]);
        let generator = SsidGenerator::with_index_source(|| 7);

        assert_eq!(generator.generate_ssid(&cloud, Some(&wifi)), "TestDevice 7.ABMIDABprv");
    }

    #[test]
    fn long_names_are_truncated_to_fit() {
        let cloud = Cloud::named("Very long name which does not fit");
        let generator = SsidGenerator::with_index_source(|| 50);
        let ssid = generator.generate_ssid(&cloud, None);

        assert_eq!(ssid, "Very long name wh 50.ABMIDAAprv");
        assert_eq!(ssid.len(), 31);
    }

    #[test]
    fn multibyte_names_never_exceed_limit() {
        let cloud = Cloud::named("Ωmega Ωmega Ωmega Ωmega");
        let generator = SsidGenerator::with_index_source(|| 99);
        let ssid = generator.generate_ssid(&cloud, None);

        assert!(ssid.len() <= 31);
        assert!(ssid.ends_with(".ABMIDAAprv"));
    }

    #[test]
    fn random_index_stays_in_two_digits() {
        let cloud = Cloud::named("Dev");
        let generator = SsidGenerator::new();
        for _ in 0..50 {
            let ssid = generator.generate_ssid(&cloud, None);
            let index = ssid.split(' ').nth(1).unwrap().split('.').next().unwrap();
            assert!(index.parse::<u32>().unwrap() < 100);
        }
    }

    #[test]
    fn model_id_is_always_five_bytes() {
        assert_eq!(fit_model_id("ABMID"), "ABMID");
        assert_eq!(fit_model_id("ABMIDXY"), "ABMID");
        assert_eq!(fit_model_id("AB"), "   AB");
    }
}
