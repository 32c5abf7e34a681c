//! Device registry
//!
//! Discovers reachable front ends through a transport scan, keeps only the
//! supported models and maps a human-readable description to a connection
//! endpoint. The whole set is rebuilt on every refresh.

use super::iio_trait::{ContextInfo, IioTransport};
use crate::config::{DiscoverySettings, StaticEndpoint};
use crate::error::{AcqError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;

/// One supported front end found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Description reported by the transport (primary key)
    pub description: String,
    /// Name shown to the user
    pub display_name: String,
    /// Connection endpoint
    pub uri: String,
    /// Transport backend parsed from the endpoint, e.g. `usb` or `ip`
    pub backend: String,
    /// Model parsed from the description
    pub model: String,
    /// Serial number parsed from the description
    pub serial: String,
}

/// Parses backend, model and serial out of scan entries
///
/// Parsing never fails; fields that cannot be extracted get a placeholder.
#[derive(Debug, Clone)]
struct DescriptionParser {
    backend: Regex,
    model: Regex,
    serial: Regex,
}

impl DescriptionParser {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| AcqError::Discovery(format!("bad pattern {}: {}", pattern, e)))
        };
        Ok(Self {
            backend: compile(r"^(.+):")?,
            model: compile(r"\((.+)\),")?,
            serial: compile(r"serial=([0-9A-Za-z]+)")?,
        })
    }

    fn capture(re: &Regex, text: &str, fallback: &str) -> String {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| fallback.to_string())
    }

    fn describe(&self, info: &ContextInfo) -> DeviceDescriptor {
        DeviceDescriptor {
            description: info.description.clone(),
            display_name: info.description.clone(),
            uri: info.uri.clone(),
            backend: Self::capture(&self.backend, &info.uri, "unknown"),
            model: Self::capture(&self.model, &info.description, "Unknown"),
            serial: Self::capture(&self.serial, &info.description, "unknown"),
        }
    }
}

/// Registry of supported front ends, in scan order
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    settings: DiscoverySettings,
    devices: Vec<DeviceDescriptor>,
    last_refresh: Option<DateTime<Utc>>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new(settings: DiscoverySettings) -> Self {
        Self {
            settings,
            devices: Vec::new(),
            last_refresh: None,
        }
    }

    /// Rescan the transport and rebuild the device set
    ///
    /// A scan failure is logged and leaves the registry empty apart from the
    /// configured static endpoints. Returns the number of devices found.
    pub fn refresh(&mut self, transport: &dyn IioTransport) -> usize {
        self.devices.clear();
        self.last_refresh = Some(Utc::now());

        let parser = match DescriptionParser::new() {
            Ok(parser) => parser,
            Err(e) => {
                tracing::error!("{}", e);
                return 0;
            }
        };

        match transport.scan(&self.settings.scan_schemes) {
            Ok(contexts) => {
                for info in contexts {
                    if !self.is_supported(&info.description) {
                        tracing::warn!("Ignored IIO device: [{}] {}", info.uri, info.description);
                        continue;
                    }
                    let descriptor = parser.describe(&info);
                    if self.insert(descriptor) {
                        tracing::debug!("Found device {} at {}", info.description, info.uri);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to enumerate contexts: {}", e);
            }
        }

        let endpoints: Vec<StaticEndpoint> = self.settings.static_endpoints.clone();
        for endpoint in endpoints {
            let info = ContextInfo::new(endpoint.description, endpoint.uri);
            self.insert(parser.describe(&info));
        }

        tracing::info!("Device scan complete: {} device(s)", self.devices.len());
        self.devices.len()
    }

    /// Whether a description names a supported model
    pub fn is_supported(&self, description: &str) -> bool {
        self.settings
            .whitelist
            .iter()
            .any(|model| description.contains(model.as_str()))
    }

    /// Add a descriptor unless its description, name or endpoint is taken
    fn insert(&mut self, descriptor: DeviceDescriptor) -> bool {
        let duplicate = self.devices.iter().any(|d| {
            d.description == descriptor.description
                || d.display_name == descriptor.display_name
                || d.uri == descriptor.uri
        });
        if duplicate {
            return false;
        }
        self.devices.push(descriptor);
        true
    }

    /// Resolve a description to a device
    ///
    /// Returns the exact match, or the first device when the description is
    /// unknown. Callers compare the returned description with the requested
    /// one to detect the fallback.
    pub fn resolve(&self, description: &str) -> Result<&DeviceDescriptor> {
        let first = self.devices.first().ok_or(AcqError::NotFound)?;
        Ok(self
            .devices
            .iter()
            .find(|d| d.description == description)
            .unwrap_or(first))
    }

    /// Look up a device by endpoint
    pub fn by_uri(&self, uri: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.uri == uri)
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Time of the last refresh, if any
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::iio_trait::MockIioTransport;

    const PLUTO_DESC: &str =
        "0456:b673 (Analog Devices Inc. PlutoSDR (ADALM-PLUTO)), serial=104473b04a060006f8ff2900f5d4a8b7b9";

    fn transport_with(entries: Vec<ContextInfo>) -> MockIioTransport {
        let mut transport = MockIioTransport::new();
        transport
            .expect_scan()
            .withf(|schemes| schemes == "usb:ip")
            .returning(move |_| Ok(entries.clone()));
        transport
    }

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(DiscoverySettings::default())
    }

    #[test]
    fn test_parses_backend_model_serial() {
        let transport = transport_with(vec![ContextInfo::new(PLUTO_DESC, "usb:1.2.5")]);
        let mut reg = registry();
        assert_eq!(reg.refresh(&transport), 1);

        let dev = &reg.devices()[0];
        assert_eq!(dev.backend, "usb");
        assert_eq!(dev.model, "Analog Devices Inc. PlutoSDR (ADALM-PLUTO)");
        assert_eq!(dev.serial, "104473b04a060006f8ff2900f5d4a8b7b9");
        assert_eq!(dev.display_name, PLUTO_DESC);
        assert!(reg.last_refresh().is_some());
    }

    #[test]
    fn test_unparseable_fields_use_placeholders() {
        let transport = transport_with(vec![ContextInfo::new("bare ad9361 board", "local")]);
        let mut reg = registry();
        reg.refresh(&transport);

        let dev = &reg.devices()[0];
        assert_eq!(dev.backend, "unknown");
        assert_eq!(dev.model, "Unknown");
        assert_eq!(dev.serial, "unknown");
    }

    #[test]
    fn test_filters_unsupported_and_duplicates() {
        let transport = transport_with(vec![
            ContextInfo::new(PLUTO_DESC, "usb:1.2.5"),
            ContextInfo::new("Some RTL dongle", "usb:1.3.1"),
            ContextInfo::new(PLUTO_DESC, "ip:192.168.2.1"),
            ContextInfo::new("ANTSDR E200", "usb:1.2.5"),
            ContextInfo::new("LibreSDR rev.5", "ip:192.168.1.10"),
        ]);
        let mut reg = registry();
        assert_eq!(reg.refresh(&transport), 2);
        assert_eq!(reg.devices()[1].description, "LibreSDR rev.5");
    }

    #[test]
    fn test_scan_failure_leaves_registry_empty() {
        let mut transport = MockIioTransport::new();
        transport
            .expect_scan()
            .returning(|_| Err(AcqError::Discovery("no scan backend".to_string())));

        let mut reg = registry();
        reg.refresh(&transport);
        assert!(reg.is_empty());
        assert!(matches!(reg.resolve("anything"), Err(AcqError::NotFound)));
    }

    #[test]
    fn test_resolve_falls_back_to_first() {
        let transport = transport_with(vec![
            ContextInfo::new("PlutoSDR A", "usb:1"),
            ContextInfo::new("PlutoSDR B", "usb:2"),
        ]);
        let mut reg = registry();
        reg.refresh(&transport);

        assert_eq!(reg.resolve("PlutoSDR B").unwrap().uri, "usb:2");
        assert_eq!(reg.resolve("PlutoSDR C").unwrap().uri, "usb:1");
        assert_eq!(reg.by_uri("usb:2").map(|d| d.description.as_str()), Some("PlutoSDR B"));
    }

    #[test]
    fn test_static_endpoints_appended_after_scan() {
        let transport = transport_with(vec![ContextInfo::new("PlutoSDR A", "usb:1")]);
        let mut settings = DiscoverySettings::default();
        settings.static_endpoints.push(StaticEndpoint {
            description: "Default (192.168.2.1)".to_string(),
            uri: "ip:192.168.2.1".to_string(),
        });
        let mut reg = DeviceRegistry::new(settings);

        assert_eq!(reg.refresh(&transport), 2);
        let last = &reg.devices()[1];
        assert_eq!(last.uri, "ip:192.168.2.1");
        assert_eq!(last.backend, "ip");
    }

    #[test]
    fn test_refresh_replaces_previous_set() {
        let mut reg = registry();
        reg.refresh(&transport_with(vec![ContextInfo::new("PlutoSDR A", "usb:1")]));
        reg.refresh(&transport_with(vec![ContextInfo::new("PlutoSDR B", "usb:2")]));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.devices()[0].description, "PlutoSDR B");
    }
}
