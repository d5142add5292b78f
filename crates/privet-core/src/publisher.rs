// ── DNS-SD publication ──
//
// Advertises the device as `_privet._tcp` with a TXT record describing its
// identity and setup flags. Callers run `update` whenever any of those
// inputs may have changed; identical records are not re-sent.

use std::sync::Arc;

use tracing::{debug, info};

use crate::delegate::{CloudDelegate, DeviceDelegate, WifiDelegate};
use crate::device_kind::device_ui_kind;
use crate::provider::DnsSdProvider;
use crate::wifi::SsidGenerator;

pub const PRIVET_SERVICE_TYPE: &str = "_privet._tcp";
const TXT_VERSION: &str = "3";

pub struct Publisher {
    cloud: Arc<dyn CloudDelegate>,
    wifi: Option<Arc<dyn WifiDelegate>>,
    device: Arc<dyn DeviceDelegate>,
    dns_sd: Arc<dyn DnsSdProvider>,
    /// Port and TXT record last handed to the responder.
    published: Option<(u16, Vec<String>)>,
}

impl Publisher {
    pub fn new(
        cloud: Arc<dyn CloudDelegate>,
        wifi: Option<Arc<dyn WifiDelegate>>,
        device: Arc<dyn DeviceDelegate>,
        dns_sd: Arc<dyn DnsSdProvider>,
    ) -> Self {
        Self {
            cloud,
            wifi,
            device,
            dns_sd,
            published: None,
        }
    }

    /// Publish the current record, or withdraw it when no HTTP port is open.
    pub fn update(&mut self) {
        let (port, _) = self.device.http_endpoint();
        if port == 0 {
            self.remove();
        } else {
            self.expose(port);
        }
    }

    pub fn is_published(&self) -> bool {
        self.published.is_some()
    }

    fn expose(&mut self, port: u16) {
        let txt = self.txt_record();
        if self
            .published
            .as_ref()
            .is_some_and(|(last_port, last_txt)| *last_port == port && *last_txt == txt)
        {
            return;
        }

        info!(port, "publishing privet service");
        debug!(?txt, "privet TXT record");
        self.dns_sd.publish_service(PRIVET_SERVICE_TYPE, port, &txt);
        self.published = Some((port, txt));
    }

    fn remove(&mut self) {
        if self.published.take().is_none() {
            return;
        }
        info!("withdrawing privet service");
        self.dns_sd.stop_publishing(PRIVET_SERVICE_TYPE);
    }

    fn txt_record(&self) -> Vec<String> {
        let model_id = self.cloud.model_id();
        let flags = SsidGenerator::generate_flags(&*self.cloud, self.wifi.as_deref());

        let mut txt = vec![
            format!("txtvers={TXT_VERSION}"),
            format!("ty={}", self.cloud.name()),
            format!("services={}", device_ui_kind(&model_id)),
            format!("id={}", self.cloud.device_id()),
            format!("mmid={model_id}"),
            format!("flags={flags}"),
        ];

        let cloud_id = self.cloud.cloud_id();
        if !cloud_id.is_empty() {
            txt.push(format!("gcd_id={cloud_id}"));
        }
        let description = self.cloud.description();
        if !description.is_empty() {
            txt.push(format!("note={description}"));
        }
        txt
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("published", &self.published)
            .finish_non_exhaustive()
    }
}
