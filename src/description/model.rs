//! Typed device/service model built from description documents.

use thiserror::Error;
use tracing::{debug, trace, warn};
use url::Url;
use xmltree::Element;

use super::fetch::{self, FetchError};
use crate::ssdp::DiscoveryRecord;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("device description is missing its <{0}> element")]
    MissingField(&'static str),
}

/// One node of the device tree described by a DDF. A device owns its
/// services and embedded devices; the tree is acyclic by construction.
#[derive(Debug, Clone)]
pub struct Device {
    pub device_type: String,
    pub friendly_name: String,
    pub udn: String,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub model_description: Option<String>,
    /// Base for relative service URLs; always ends with `/`.
    pub url_base: String,
    pub services: Vec<Service>,
    pub embedded_devices: Vec<Device>,
}

/// Where a service stands in its SCPD lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Stub from the DDF; SCPD not fetched (yet, or no `SCPDURL`).
    Pending,
    /// SCPD fetched and parsed; actions are callable.
    Ready,
    /// SCPD fetch or parse failed; siblings are unaffected.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Service {
    pub service_type: String,
    pub service_id: String,
    /// Resolved, absolute URLs.
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub status: ServiceStatus,
    pub state_table: Vec<StateVariable>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    pub name: String,
    /// UPnP scalar name (`ui2`, `string`, `boolean`, …), verbatim from the
    /// SCPD; drives output coercion in the SOAP dispatcher.
    pub data_type: String,
    pub default_value: Option<String>,
    pub allowed_values: Vec<String>,
    pub allowed_range: Option<AllowedRange>,
    pub send_events: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllowedRange {
    pub minimum: f64,
    pub maximum: f64,
    pub step: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Action {
    pub fn inputs(&self) -> impl Iterator<Item = &Argument> + '_ {
        self.arguments
            .iter()
            .filter(|a| a.direction == Direction::In)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Argument> + '_ {
        self.arguments
            .iter()
            .filter(|a| a.direction == Direction::Out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub direction: Direction,
    /// Names the state variable whose `dataType` governs coercion.
    pub related_state_variable: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Device {
    /// Full pipeline from one discovery record: DDF, device tree, SCPDs.
    pub fn from_discovery(record: &DiscoveryRecord) -> Result<Device, DescriptionError> {
        Self::from_location(&record.location)
    }

    /// Same pipeline from a known description URL.
    pub fn from_location(location: &str) -> Result<Device, DescriptionError> {
        let ddf = fetch::get_description(location)?;
        let url_base = url_base_for(location, &ddf);
        let device_elem = child(&ddf, "device").ok_or(DescriptionError::MissingField("device"))?;
        let mut device = Device::from_element(device_elem, &url_base)?;
        device.populate_scpds();
        Ok(device)
    }

    fn from_element(elem: &Element, url_base: &str) -> Result<Device, DescriptionError> {
        let device_type =
            child_text(elem, "deviceType").ok_or(DescriptionError::MissingField("deviceType"))?;
        let friendly_name = child_text(elem, "friendlyName")
            .ok_or(DescriptionError::MissingField("friendlyName"))?;
        let udn = child_text(elem, "UDN").ok_or(DescriptionError::MissingField("UDN"))?;

        let mut services = Vec::new();
        if let Some(list) = child(elem, "serviceList") {
            for service_elem in children(list, "service") {
                match Service::from_element(service_elem, url_base) {
                    Some(service) => services.push(service),
                    None => trace!("skipping incomplete <service> entry in {}", udn),
                }
            }
        }

        let mut embedded_devices = Vec::new();
        if let Some(list) = child(elem, "deviceList") {
            for sub in children(list, "device") {
                embedded_devices.push(Device::from_element(sub, url_base)?);
            }
        }

        Ok(Device {
            device_type,
            friendly_name,
            udn,
            manufacturer: child_text(elem, "manufacturer"),
            model_name: child_text(elem, "modelName"),
            model_number: child_text(elem, "modelNumber"),
            model_description: child_text(elem, "modelDescription"),
            url_base: url_base.to_string(),
            services,
            embedded_devices,
        })
    }

    /// Fetches and parses every service's SCPD, recursively. The DDF walk
    /// has already happened; each service fails or succeeds on its own.
    pub fn populate_scpds(&mut self) {
        for service in &mut self.services {
            service.populate_scpd();
        }
        for sub in &mut self.embedded_devices {
            sub.populate_scpds();
        }
    }

    /// First service of the given type, this device or any embedded one.
    pub fn find_service(&self, service_type: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.service_type.eq_ignore_ascii_case(service_type))
            .or_else(|| {
                self.embedded_devices
                    .iter()
                    .find_map(|d| d.find_service(service_type))
            })
    }

    /// Services of this device and every embedded device, depth first.
    pub fn all_services(&self) -> Vec<&Service> {
        let mut services: Vec<&Service> = self.services.iter().collect();
        for sub in &self.embedded_devices {
            services.extend(sub.all_services());
        }
        services
    }
}

impl Service {
    fn from_element(elem: &Element, url_base: &str) -> Option<Service> {
        let service_type = child_text(elem, "serviceType")?;
        let resolve = |name| child_text(elem, name).map(|u| build_url(url_base, &u));
        Some(Service {
            service_type,
            service_id: child_text(elem, "serviceId").unwrap_or_default(),
            scpd_url: resolve("SCPDURL").unwrap_or_default(),
            control_url: resolve("controlURL").unwrap_or_default(),
            event_sub_url: resolve("eventSubURL").unwrap_or_default(),
            status: ServiceStatus::Pending,
            state_table: Vec::new(),
            actions: Vec::new(),
        })
    }

    /// Fetches and parses this service's SCPD, moving the status to
    /// `Ready` or `Failed`. Without an `SCPDURL` the stub stays `Pending`.
    pub fn populate_scpd(&mut self) {
        if self.scpd_url.is_empty() {
            return;
        }
        match fetch::get_description(&self.scpd_url) {
            Ok(scpd) => {
                let (state_table, actions) = parse_scpd(&scpd);
                debug!(
                    "SCPD ready for {}: {} action(s), {} state variable(s)",
                    self.service_type,
                    actions.len(),
                    state_table.len()
                );
                self.state_table = state_table;
                self.actions = actions;
                self.status = ServiceStatus::Ready;
            }
            Err(e) => {
                warn!(
                    "❌ SCPD fetch failed for {} at {}: {}",
                    self.service_type, self.scpd_url, e
                );
                self.status = ServiceStatus::Failed(e.to_string());
            }
        }
    }

    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_table.iter().find(|v| v.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn is_ready(&self) -> bool {
        self.status == ServiceStatus::Ready
    }
}

/// `<URLBase>` when the DDF declares one, otherwise the description URL
/// stripped to its authority. The result always ends with `/`.
pub fn url_base_for(location: &str, ddf: &Element) -> String {
    if let Some(mut base) = child_text(ddf, "URLBase") {
        if !base.ends_with('/') {
            base.push('/');
        }
        return base;
    }
    match Url::parse(location) {
        Ok(mut url) => {
            url.set_path("/");
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => match location.rfind('/') {
            Some(idx) if idx > "http://".len() => format!("{}/", &location[..idx]),
            _ => format!("{}/", location),
        },
    }
}

/// RFC 3986 resolution of `rel` against `base`. Absolute URLs pass
/// through; an unparseable base falls back to plain concatenation.
pub fn build_url(base: &str, rel: &str) -> String {
    if rel.starts_with("http://") || rel.starts_with("https://") {
        return rel.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(rel)) {
        Ok(url) => url.to_string(),
        Err(_) => {
            if base.ends_with('/') && rel.starts_with('/') {
                format!("{}{}", base.trim_end_matches('/'), rel)
            } else if base.ends_with('/') || rel.starts_with('/') {
                format!("{}{}", base, rel)
            } else {
                format!("{}/{}", base, rel)
            }
        }
    }
}

/// Walks an SCPD tree into the state table and action list. Lenient:
/// entries missing their mandatory children are skipped, not fatal.
pub fn parse_scpd(scpd: &Element) -> (Vec<StateVariable>, Vec<Action>) {
    let mut state_table = Vec::new();
    if let Some(list) = child(scpd, "serviceStateTable") {
        for var in children(list, "stateVariable") {
            let Some(name) = child_text(var, "name") else {
                continue;
            };
            let Some(data_type) = child_text(var, "dataType") else {
                continue;
            };
            // sendEvents defaults to yes per the UPnP architecture.
            let send_events = var
                .attributes
                .get("sendEvents")
                .map(|v| v.as_str() != "no")
                .unwrap_or(true);
            let allowed_values = child(var, "allowedValueList")
                .map(|list| {
                    children(list, "allowedValue")
                        .filter_map(element_text)
                        .collect()
                })
                .unwrap_or_default();
            state_table.push(StateVariable {
                name,
                data_type,
                default_value: child_text(var, "defaultValue"),
                allowed_values,
                allowed_range: child(var, "allowedValueRange").and_then(parse_range),
                send_events,
            });
        }
    }

    let mut actions = Vec::new();
    if let Some(list) = child(scpd, "actionList") {
        for action in children(list, "action") {
            let Some(name) = child_text(action, "name") else {
                continue;
            };
            let arguments = child(action, "argumentList")
                .map(|list| {
                    children(list, "argument")
                        .filter_map(parse_argument)
                        .collect()
                })
                .unwrap_or_default();
            actions.push(Action { name, arguments });
        }
    }

    (state_table, actions)
}

fn parse_argument(elem: &Element) -> Option<Argument> {
    let name = child_text(elem, "name")?;
    let direction = match child_text(elem, "direction")?.to_ascii_lowercase().as_str() {
        "in" => Direction::In,
        "out" => Direction::Out,
        other => {
            trace!("unknown argument direction '{}' for {}", other, name);
            return None;
        }
    };
    Some(Argument {
        name,
        direction,
        related_state_variable: child_text(elem, "relatedStateVariable")?,
    })
}

fn parse_range(elem: &Element) -> Option<AllowedRange> {
    Some(AllowedRange {
        minimum: child_text(elem, "minimum")?.parse().ok()?,
        maximum: child_text(elem, "maximum")?.parse().ok()?,
        step: child_text(elem, "step").and_then(|s| s.parse().ok()),
    })
}

/// First child element with the given local name. xmltree already splits
/// prefixes off, so this matches namespaced documents too.
pub(crate) fn child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name == name))
}

pub(crate) fn children<'a>(
    parent: &'a Element,
    name: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    parent
        .children
        .iter()
        .filter_map(move |n| n.as_element().filter(|e| e.name == name))
}

pub(crate) fn child_text(parent: &Element, name: &str) -> Option<String> {
    child(parent, name).and_then(element_text)
}

fn element_text(elem: &Element) -> Option<String> {
    elem.get_text().map(|t| t.trim().to_string())
}
