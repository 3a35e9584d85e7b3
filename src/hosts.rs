//! Host inventory records, label selection and payload resolution.
//!
//! An inventory is a YAML list of [`HostTarget`] entries. Entries carry a
//! free-form label map; a selector of the form `key=value[,key=value...]`
//! selects every entry whose labels contain all listed pairs, while an
//! explicit hostname match short-circuits label selection entirely.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::vendor::DeviceFamily;

const DEFAULT_READ_TIMEOUT_SECS: u64 = 15;

fn default_ssh_port() -> u16 {
    22
}

/// Identity and connection parameters for one device.
///
/// Immutable for the duration of one session; the fleet executor clones the
/// selected entries before dispatching workers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HostTarget {
    pub hostname: String,
    /// Explicit connection address; the hostname is dialed when absent.
    #[serde(default)]
    pub ssh_ip: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Secret for the privilege escalation dialog, if the family has one.
    #[serde(default)]
    pub enable_secret: Option<String>,
    #[serde(default)]
    pub device_type: DeviceFamily,
    /// Private key file used in addition to password authentication.
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default)]
    pub strict_host_check: bool,
    /// Known-hosts file consulted when strict checking is on; the user
    /// default file is used when unset.
    #[serde(default)]
    pub known_hosts: Option<String>,
    /// Offer legacy key exchanges and CBC ciphers for old firmware.
    #[serde(default)]
    pub legacy_ciphers: bool,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    /// Pause after every write, for devices that drop pasted input.
    #[serde(default)]
    pub write_delay_ms: Option<u64>,
    /// Skip per-line acknowledgment when pasting configuration.
    #[serde(default)]
    pub speed_mode: bool,
    /// True runs the payload as exec commands, false pastes it as
    /// configuration.
    #[serde(default)]
    pub exec_mode: bool,
    /// Inline command string (`;` separates lines) or a path to a
    /// script/configuration file.
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl HostTarget {
    /// Creates a target with defaults for everything but the hostname.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ssh_ip: None,
            ssh_port: default_ssh_port(),
            username: String::new(),
            password: String::new(),
            enable_secret: None,
            device_type: DeviceFamily::default(),
            key_file: None,
            strict_host_check: false,
            known_hosts: None,
            legacy_ciphers: false,
            read_timeout_secs: None,
            write_delay_ms: None,
            speed_mode: false,
            exec_mode: false,
            payload: None,
            labels: HashMap::new(),
        }
    }

    /// Address and port the transport dials.
    pub fn connection_addr(&self) -> (String, u16) {
        let host = self
            .ssh_ip
            .clone()
            .unwrap_or_else(|| self.hostname.clone());
        (host, self.ssh_port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS))
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms.unwrap_or(0))
    }

    /// Checks this entry against a `key=value[,key=value...]` selector.
    ///
    /// All listed pairs must be present in the label map. An empty or
    /// malformed selector matches nothing.
    pub fn matches_labels(&self, selector: &str) -> bool {
        if selector.trim().is_empty() {
            return false;
        }
        selector.split(',').all(|pair| match pair.split_once('=') {
            Some((key, value)) => self
                .labels
                .get(key.trim())
                .is_some_and(|have| have.as_str() == value.trim()),
            None => false,
        })
    }

    /// Merges run-wide command line settings onto this entry.
    ///
    /// A script payload switches the entry to exec mode, a config payload
    /// to configuration mode; timeouts only override when given.
    pub fn apply_overrides(
        &mut self,
        script: Option<&str>,
        config: Option<&str>,
        read_timeout_secs: Option<u64>,
        write_delay_ms: Option<u64>,
    ) {
        if let Some(script) = script.filter(|s| !s.is_empty()) {
            self.payload = Some(script.to_string());
            self.exec_mode = true;
        } else if let Some(config) = config.filter(|s| !s.is_empty()) {
            self.payload = Some(config.to_string());
            self.exec_mode = false;
        }
        if read_timeout_secs.is_some() {
            self.read_timeout_secs = read_timeout_secs;
        }
        if write_delay_ms.is_some() {
            self.write_delay_ms = write_delay_ms;
        }
    }

    /// Resolves the payload to the text that is sent to the device.
    ///
    /// A payload naming an existing file is read from disk; anything else is
    /// treated as an inline command string with `;` separating lines.
    pub async fn resolve_payload(&self) -> Result<Option<String>, SessionError> {
        let Some(payload) = self.payload.as_deref() else {
            return Ok(None);
        };
        if Path::new(payload).is_file() {
            debug!("{}: reading payload file {payload}", self.hostname);
            return Ok(Some(tokio::fs::read_to_string(payload).await?));
        }
        Ok(Some(payload.replace(';', "\n")))
    }
}

/// Parses a YAML inventory document into host targets.
///
/// A malformed inventory aborts the whole run before any worker starts;
/// this is the only error not scoped to a single host.
pub fn load_inventory(yaml: &str) -> Result<Vec<HostTarget>, SessionError> {
    let hosts: Vec<HostTarget> = serde_yaml::from_str(yaml)?;
    debug!("loaded {} inventory entries", hosts.len());
    Ok(hosts)
}

/// Selects inventory entries by hostname or label selector.
///
/// A non-empty hostname short-circuits: only exact hostname matches are
/// returned. Otherwise the label selector decides.
pub fn select_targets(
    hosts: Vec<HostTarget>,
    selector: &str,
    hostname: &str,
) -> Vec<HostTarget> {
    hosts
        .into_iter()
        .filter(|host| {
            if !hostname.is_empty() {
                host.hostname == hostname
            } else {
                host.matches_labels(selector)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
- hostname: core1
  username: ops
  password: secret
  enable_secret: more-secret
  device_type: ironware
  ssh_port: 2242
  payload: scripts/bgp_summary
  labels:
    location: frankfurt
    env: prod
- hostname: edge1
  username: ops
  password: secret
  device_type: junos
  labels:
    location: amsterdam
    env: prod
- hostname: lab1
  username: ops
  password: secret
  device_type: vdx
  labels:
    location: berlin
    env: stage
"#;

    #[test]
    fn inventory_parses_with_defaults() {
        let hosts = load_inventory(INVENTORY).expect("parse inventory");
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[0].ssh_port, 2242);
        assert_eq!(hosts[1].ssh_port, 22);
        assert_eq!(hosts[0].device_type, DeviceFamily::Ironware);
        assert_eq!(hosts[1].device_type, DeviceFamily::Junos);
        assert_eq!(hosts[0].labels["location"], "frankfurt");
        assert!(!hosts[2].exec_mode);
    }

    #[test]
    fn device_type_aliases_parse_from_yaml() {
        let hosts =
            load_inventory("- hostname: r1\n  device_type: juniper\n").expect("parse alias");
        assert_eq!(hosts[0].device_type, DeviceFamily::Junos);
    }

    #[test]
    fn malformed_inventory_is_rejected() {
        let err = match load_inventory("- username-only: true\n") {
            Ok(_) => panic!("missing hostname should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, SessionError::Inventory(_)));
    }

    #[test]
    fn selector_requires_all_pairs() {
        let hosts = load_inventory(INVENTORY).expect("parse inventory");
        assert!(hosts[0].matches_labels("env=prod"));
        assert!(hosts[0].matches_labels("env=prod,location=frankfurt"));
        assert!(!hosts[0].matches_labels("env=prod,location=amsterdam"));
        assert!(!hosts[0].matches_labels(""));
        assert!(!hosts[0].matches_labels("malformed"));
    }

    #[test]
    fn label_selection_picks_matching_hosts() {
        let hosts = load_inventory(INVENTORY).expect("parse inventory");
        let selected = select_targets(hosts, "env=prod", "");
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|h| h.labels["env"] == "prod"));
    }

    #[test]
    fn hostname_match_short_circuits_labels() {
        let hosts = load_inventory(INVENTORY).expect("parse inventory");
        let selected = select_targets(hosts, "env=prod", "lab1");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].hostname, "lab1");
    }

    #[test]
    fn overrides_set_payload_and_mode() {
        let mut host = HostTarget::new("core1");
        host.apply_overrides(Some("show version"), None, Some(30), None);
        assert_eq!(host.payload.as_deref(), Some("show version"));
        assert!(host.exec_mode);
        assert_eq!(host.read_timeout(), Duration::from_secs(30));

        host.apply_overrides(None, Some("interface eth0"), None, Some(50));
        assert_eq!(host.payload.as_deref(), Some("interface eth0"));
        assert!(!host.exec_mode);
        assert_eq!(host.write_delay(), Duration::from_millis(50));
    }

    #[test]
    fn connection_addr_prefers_explicit_ip() {
        let mut host = HostTarget::new("core1");
        assert_eq!(host.connection_addr(), ("core1".to_string(), 22));
        host.ssh_ip = Some("192.0.2.10".to_string());
        assert_eq!(host.connection_addr(), ("192.0.2.10".to_string(), 22));
    }

    #[tokio::test]
    async fn inline_payload_splits_on_semicolons() {
        let mut host = HostTarget::new("core1");
        host.payload = Some("show version;show chassis".to_string());
        let resolved = host.resolve_payload().await.expect("resolve payload");
        assert_eq!(resolved.as_deref(), Some("show version\nshow chassis"));
    }

    #[tokio::test]
    async fn missing_payload_resolves_to_none() {
        let host = HostTarget::new("core1");
        assert!(host.resolve_payload().await.expect("resolve").is_none());
    }
}
