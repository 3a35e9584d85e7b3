//! Built-in device family profiles.
//!
//! Each supported CLI dialect is described by one read-only [`VendorProfile`]
//! holding the prompt detection pattern, prompt substitution rules, read
//! triggers, command rewrite table, configuration error pattern and the
//! family's persistence policy. The session engine is written once and
//! driven entirely by this data; there is no per-family code path.

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Tags accepted for the inventory's device-type field.
pub const BUILTIN_FAMILIES: &[&str] = &["ironware", "junos", "slx", "vdx"];

/// Supported device families.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    /// Brocade/Extreme MLX and XMR routers running Ironware.
    #[default]
    #[serde(alias = "netiron", alias = "mlx", alias = "brocade")]
    Ironware,
    /// Juniper routers and switches running JunOS.
    #[serde(alias = "juniper")]
    Junos,
    /// Extreme SLX series.
    Slx,
    /// Brocade VDX series.
    Vdx,
}

impl DeviceFamily {
    /// Parses an inventory device-type tag (case-insensitive, with aliases).
    pub fn from_tag(tag: &str) -> Result<Self, SessionError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "ironware" | "netiron" | "mlx" | "brocade" => Ok(DeviceFamily::Ironware),
            "junos" | "juniper" => Ok(DeviceFamily::Junos),
            "slx" => Ok(DeviceFamily::Slx),
            "vdx" => Ok(DeviceFamily::Vdx),
            other => Err(SessionError::UnknownFamily(other.to_string())),
        }
    }

    /// Canonical tag for this family.
    pub fn tag(self) -> &'static str {
        match self {
            DeviceFamily::Ironware => "ironware",
            DeviceFamily::Junos => "junos",
            DeviceFamily::Slx => "slx",
            DeviceFamily::Vdx => "vdx",
        }
    }

    /// Returns the built-in profile for this family.
    pub fn profile(self) -> &'static VendorProfile {
        match self {
            DeviceFamily::Ironware => &PROFILES[0],
            DeviceFamily::Junos => &PROFILES[1],
            DeviceFamily::Slx => &PROFILES[2],
            DeviceFamily::Vdx => &PROFILES[3],
        }
    }
}

/// Privilege escalation dialog for families that authenticate after the
/// shell opens (connect lands in an unprivileged prompt).
#[derive(Debug, Clone)]
pub struct LoginDialog {
    /// Command that starts the escalation (e.g. `enable`).
    pub escalate: &'static str,
    /// Substring the device emits when asking for the enable secret.
    pub password_prompt: &'static str,
}

/// How a family persists applied configuration.
#[derive(Debug, Clone)]
pub enum PersistPolicy {
    /// Explicit save step; success is any of the listed phrases appearing.
    WriteMemory {
        command: &'static str,
        success: &'static [&'static str],
    },
    /// Transactional commit with rollback on failure.
    Commit {
        command: &'static str,
        /// Phrase confirming the configuration check passed.
        check_success: &'static str,
        /// Phrase confirming the commit finished.
        complete: &'static str,
        rollback: &'static str,
        rollback_success: &'static str,
    },
    /// Save step that asks an interactive yes/no question first.
    CopyConfirm {
        command: &'static str,
        confirm_prompt: &'static str,
        answer: &'static str,
        /// Settling delay after the device confirms, in milliseconds.
        settle_ms: u64,
    },
    /// Configuration is active immediately; persisting is a no-op.
    NoOp,
}

/// Prompt detection and derivation rules for one family.
///
/// The substitution pairs are applied to the canonical prompt with a single
/// first-occurrence replacement, matching how the devices themselves build
/// their mode prompts from the hostname.
#[derive(Debug)]
pub struct PromptRules {
    /// Matches the raw prompt in the first chunk read after shell start.
    pub detect: Regex,
    /// Derives the enabled prompt from the unprivileged one; only present
    /// for families with a login dialog, where the canonical prompt is the
    /// unprivileged form.
    pub enabled_swap: Option<(&'static str, &'static str)>,
    /// Derives the configuration prompt from the canonical prompt.
    pub config_swap: (&'static str, &'static str),
    /// Derives the configuration-subsection prompt from the canonical
    /// prompt. Subsection prompts are prefixes of the full config prompt on
    /// most families, so waiting for them frames both cases.
    pub config_section_swap: (&'static str, &'static str),
}

/// Static dialect description for one device family.
#[derive(Debug)]
pub struct VendorProfile {
    pub family: DeviceFamily,
    pub prompts: PromptRules,
    /// Trigger substrings used for the very first read, before any prompt
    /// is known.
    pub read_triggers: &'static [&'static str],
    /// Matches rejected configuration statements in echoed output.
    pub error_pattern: Option<Regex>,
    /// Logical command name -> literal vendor syntax, applied token-wise.
    pub rewrites: &'static [(&'static str, &'static str)],
    /// Whether the device needs a pseudo terminal before the shell opens.
    pub requires_pty: bool,
    /// Command that disables terminal paging, if the family has one.
    pub paging_off: Option<&'static str>,
    /// Escalation dialog for families that connect unprivileged.
    pub login: Option<LoginDialog>,
    /// Command entering configuration mode and the substring that confirms
    /// the configuration prompt appeared.
    pub enter_config: &'static str,
    pub enter_config_trigger: &'static str,
    /// Command sequence leaving configuration mode back to enabled.
    pub leave_config: &'static [&'static str],
    /// Command dropping from enabled back to the unprivileged prompt.
    pub leave_enabled: &'static str,
    pub persist: PersistPolicy,
}

impl VendorProfile {
    /// Rewrites recognized logical command tokens to the family's syntax.
    ///
    /// Tokens not present in the table pass through unchanged, so mixed
    /// lines like `fleet_bgpn 192.0.2.1 fleet_pipe fleet_include Estab`
    /// expand in place.
    pub fn rewrite_command(&self, line: &str) -> String {
        if self.rewrites.is_empty() {
            return line.to_string();
        }
        line.split_whitespace()
            .map(|token| {
                self.rewrites
                    .iter()
                    .find(|(name, _)| *name == token)
                    .map(|(_, syntax)| *syntax)
                    .unwrap_or(token)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn pattern(re: &str) -> Regex {
    match Regex::new(re) {
        Ok(re) => re,
        Err(err) => panic!("invalid builtin profile pattern: {err}"),
    }
}

static IRONWARE_REWRITES: &[(&str, &str)] = &[
    ("fleet_log", "show logging"),
    ("fleet_chassis", "show chassis"),
    ("fleet_route", "show ip route"),
    ("fleet_route6", "show ipv6 route"),
    ("fleet_route_sum", "show ip route summary"),
    ("fleet_route6_sum", "show ipv6 route summary"),
    ("fleet_bgp", "show ip bgp summary"),
    ("fleet_bgp6", "show ipv6 bgp summary"),
    ("fleet_bgpn", "show ip bgp neighbors"),
    ("fleet_bgpn6", "show ipv6 bgp neighbors"),
    ("fleet_vlans", "show vlan"),
    ("fleet_include", "include"),
    ("fleet_pipe", "|"),
];

static JUNOS_REWRITES: &[(&str, &str)] = &[
    ("fleet_log", "show log messages"),
    ("fleet_chassis", "show chassis hardware"),
    ("fleet_route", "show route"),
    ("fleet_route6", "show route table inet6.0"),
    ("fleet_route_sum", "show route summary"),
    ("fleet_bgp", "show bgp summary"),
    ("fleet_bgpn", "show bgp neighbor"),
    ("fleet_vlans", "show vlans"),
    ("fleet_include", "match"),
    ("fleet_pipe", "|"),
];

static SLX_REWRITES: &[(&str, &str)] = &[
    ("fleet_log", "show logging"),
    ("fleet_chassis", "show chassis"),
    ("fleet_route", "show ip route"),
    ("fleet_route6", "show ipv6 route"),
    ("fleet_route_sum", "show ip route summary"),
    ("fleet_route6_sum", "show ipv6 route summary"),
    ("fleet_bgp", "show ip bgp summary"),
    ("fleet_bgp6", "show ipv6 bgp summary"),
    ("fleet_bgpn", "show ip bgp neighbors"),
    ("fleet_bgpn6", "show ipv6 bgp neighbors"),
    ("fleet_vlans", "show vlan brief"),
    ("fleet_include", "include"),
    ("fleet_pipe", "|"),
];

static VDX_REWRITES: &[(&str, &str)] = &[
    ("fleet_log", "show logging raslog"),
    ("fleet_chassis", "show chassis"),
    ("fleet_route", "show ip route"),
    ("fleet_route6", "show ipv6 route"),
    ("fleet_bgp", "show ip bgp summary"),
    ("fleet_bgpn", "show ip bgp neighbors"),
    ("fleet_vlans", "show vlan brief"),
    ("fleet_include", "include"),
    ("fleet_pipe", "|"),
];

static PROFILES: Lazy<Vec<VendorProfile>> = Lazy::new(|| {
    vec![
        // Ironware connects unprivileged and escalates through the enable
        // dialog; the canonical prompt is the unprivileged one.
        VendorProfile {
            family: DeviceFamily::Ironware,
            prompts: PromptRules {
                detect: pattern(r"[\w.-]+[>#] ?$"),
                enabled_swap: Some((">", "#")),
                config_swap: (">", "(config)#"),
                config_section_swap: (">", "(config"),
            },
            read_triggers: &[">", "#"],
            error_pattern: Some(pattern(r"(?i)invalid (input|command)|ambiguous input|error")),
            rewrites: IRONWARE_REWRITES,
            requires_pty: false,
            paging_off: Some("skip-page-display"),
            login: Some(LoginDialog {
                escalate: "enable",
                password_prompt: "Password:",
            }),
            enter_config: "conf t",
            enter_config_trigger: "(config)#",
            leave_config: &["end"],
            leave_enabled: "exit",
            persist: PersistPolicy::WriteMemory {
                command: "write memory",
                success: &["(config)#", "Write startup-config done."],
            },
        },
        VendorProfile {
            family: DeviceFamily::Junos,
            prompts: PromptRules {
                detect: pattern(r"[\w.-]+> ?$"),
                enabled_swap: None,
                config_swap: (">", "#"),
                config_section_swap: (">", "#"),
            },
            read_triggers: &[">"],
            error_pattern: Some(pattern(r"(?i)syntax error|unknown command|missing argument")),
            rewrites: JUNOS_REWRITES,
            requires_pty: false,
            paging_off: Some("set cli screen-length 0"),
            login: None,
            enter_config: "edit",
            enter_config_trigger: "[edit]",
            leave_config: &["exit configuration-mode"],
            leave_enabled: "exit",
            persist: PersistPolicy::Commit {
                command: "commit",
                check_success: "configuration check succeeds",
                complete: "commit complete",
                rollback: "rollback",
                rollback_success: "load complete",
            },
        },
        // SLX wants a pseudo terminal and confirms the startup-config copy
        // interactively.
        VendorProfile {
            family: DeviceFamily::Slx,
            prompts: PromptRules {
                detect: pattern(r"[@?.\w-]+# ?$"),
                enabled_swap: None,
                config_swap: ("#", "(config)#"),
                config_section_swap: ("#", "(conf"),
            },
            read_triggers: &["# "],
            error_pattern: Some(pattern(r"(?i)syntax error|invalid input")),
            rewrites: SLX_REWRITES,
            requires_pty: true,
            paging_off: Some("terminal length 0"),
            login: None,
            enter_config: "conf t",
            enter_config_trigger: "(config)#",
            leave_config: &["exit configuration-mode"],
            leave_enabled: "exit",
            persist: PersistPolicy::CopyConfirm {
                command: "copy running-config startup-config",
                confirm_prompt: "continue? [y/n]",
                answer: "y",
                settle_ms: 2000,
            },
        },
        // VDX also needs a pty; its configuration is immediately durable.
        VendorProfile {
            family: DeviceFamily::Vdx,
            prompts: PromptRules {
                detect: pattern(r"[\w.-]+# ?$"),
                enabled_swap: None,
                config_swap: ("#", "(config)#"),
                config_section_swap: ("#", "(config"),
            },
            read_triggers: &["# "],
            error_pattern: Some(pattern(r"(?i)syntax error|invalid input")),
            rewrites: VDX_REWRITES,
            requires_pty: true,
            paging_off: Some("terminal length 0"),
            login: None,
            enter_config: "conf t",
            enter_config_trigger: "(config)#",
            leave_config: &["end"],
            leave_enabled: "exit",
            persist: PersistPolicy::NoOp,
        },
    ]
});

/// Capability tags describing what a profile supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfileCapability {
    LoginDialog,
    TransactionalCommit,
    CommitRollback,
    InteractiveConfirm,
    PersistNoop,
    RequiresPty,
}

/// Serializable description of a built-in profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileMetadata {
    pub name: String,
    pub vendor: String,
    pub os: String,
    pub capabilities: Vec<ProfileCapability>,
}

fn metadata_for(family: DeviceFamily) -> ProfileMetadata {
    let profile = family.profile();
    let mut capabilities = Vec::new();
    if profile.login.is_some() {
        capabilities.push(ProfileCapability::LoginDialog);
    }
    match profile.persist {
        PersistPolicy::Commit { .. } => {
            capabilities.push(ProfileCapability::TransactionalCommit);
            capabilities.push(ProfileCapability::CommitRollback);
        }
        PersistPolicy::CopyConfirm { .. } => {
            capabilities.push(ProfileCapability::InteractiveConfirm);
        }
        PersistPolicy::NoOp => capabilities.push(ProfileCapability::PersistNoop),
        PersistPolicy::WriteMemory { .. } => {}
    }
    if profile.requires_pty {
        capabilities.push(ProfileCapability::RequiresPty);
    }
    let (vendor, os) = match family {
        DeviceFamily::Ironware => ("Brocade", "Ironware"),
        DeviceFamily::Junos => ("Juniper", "JunOS"),
        DeviceFamily::Slx => ("Extreme", "SLX-OS"),
        DeviceFamily::Vdx => ("Brocade", "NOS"),
    };
    ProfileMetadata {
        name: family.tag().to_string(),
        vendor: vendor.to_string(),
        os: os.to_string(),
        capabilities,
    }
}

/// Returns metadata for all built-in profiles.
pub fn profile_catalog() -> Vec<ProfileMetadata> {
    [
        DeviceFamily::Ironware,
        DeviceFamily::Junos,
        DeviceFamily::Slx,
        DeviceFamily::Vdx,
    ]
    .into_iter()
    .map(metadata_for)
    .collect()
}

/// Exports the profile catalog as pretty JSON.
pub fn catalog_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&profile_catalog())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_tag_resolves_to_a_profile() {
        for tag in BUILTIN_FAMILIES {
            let family = DeviceFamily::from_tag(tag).expect("builtin tag should parse");
            assert_eq!(family.tag(), *tag);
            assert_eq!(family.profile().family, family);
        }
    }

    #[test]
    fn family_aliases_are_accepted() {
        assert_eq!(
            DeviceFamily::from_tag("NetIron").expect("alias"),
            DeviceFamily::Ironware
        );
        assert_eq!(
            DeviceFamily::from_tag("juniper").expect("alias"),
            DeviceFamily::Junos
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = match DeviceFamily::from_tag("routeros") {
            Ok(_) => panic!("unknown tag should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, SessionError::UnknownFamily(tag) if tag == "routeros"));
    }

    #[test]
    fn rewrite_expands_tokens_in_place() {
        let profile = DeviceFamily::Ironware.profile();
        assert_eq!(
            profile.rewrite_command("fleet_bgpn 192.0.2.1"),
            "show ip bgp neighbors 192.0.2.1"
        );
        assert_eq!(
            profile.rewrite_command("fleet_route fleet_pipe fleet_include 10.0.0.0"),
            "show ip route | include 10.0.0.0"
        );
        assert_eq!(profile.rewrite_command("show version"), "show version");
    }

    #[test]
    fn rewrite_differs_per_family() {
        assert_eq!(
            DeviceFamily::Junos.profile().rewrite_command("fleet_route"),
            "show route"
        );
        assert_eq!(
            DeviceFamily::Slx.profile().rewrite_command("fleet_route"),
            "show ip route"
        );
    }

    #[test]
    fn pty_is_required_only_by_slx_and_vdx() {
        assert!(!DeviceFamily::Ironware.profile().requires_pty);
        assert!(!DeviceFamily::Junos.profile().requires_pty);
        assert!(DeviceFamily::Slx.profile().requires_pty);
        assert!(DeviceFamily::Vdx.profile().requires_pty);
    }

    #[test]
    fn catalog_lists_all_families_with_persist_capabilities() {
        let catalog = profile_catalog();
        assert_eq!(catalog.len(), BUILTIN_FAMILIES.len());

        let junos = catalog
            .iter()
            .find(|m| m.name == "junos")
            .expect("junos in catalog");
        assert!(junos.capabilities.contains(&ProfileCapability::CommitRollback));

        let vdx = catalog
            .iter()
            .find(|m| m.name == "vdx")
            .expect("vdx in catalog");
        assert!(vdx.capabilities.contains(&ProfileCapability::PersistNoop));
    }

    #[test]
    fn catalog_exports_as_json() {
        let json = catalog_json().expect("encode catalog");
        assert!(json.contains("\"ironware\""));
        assert!(json.contains("transactional_commit"));
    }
}
