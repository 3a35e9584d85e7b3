//! Prompt detection and mode-prompt derivation.
//!
//! A device announces only one prompt when the shell opens. The full set of
//! mode prompts is derived from it with the family's substitution rules:
//! one `(find, replace)` pair per derived prompt, applied once to the
//! canonical form. Once detected, a session's prompts never change.

use log::debug;

use crate::error::SessionError;
use crate::session::modes::Mode;
use crate::vendor::VendorProfile;

/// The resolved prompt strings of one session, one field per operating
/// mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub unprivileged: String,
    pub enabled: String,
    pub config: String,
    /// Prefix shared by the configuration prompt and its subsection
    /// variants (`hostname(config-if...)#`), used to frame pasted lines.
    pub config_section: String,
}

impl PromptSet {
    /// Derives the prompt set from the first chunk read after shell start
    /// and reports which mode the session begins in.
    ///
    /// Families with a login dialog treat the unprivileged prompt as the
    /// canonical form and may land in either the unprivileged or the
    /// enabled mode; everyone else starts enabled.
    pub fn detect(profile: &VendorProfile, raw: &str) -> Result<(Self, Mode), SessionError> {
        let rules = &profile.prompts;
        let detected = rules
            .detect
            .find(raw)
            .map(|m| m.as_str().trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SessionError::PromptDetect {
                seen: raw.trim().to_string(),
            })?;

        let (set, mode) = if let Some((unpriv_mark, enabled_mark)) = rules.enabled_swap {
            let starts_enabled = detected.ends_with(enabled_mark);
            let unprivileged = if starts_enabled {
                detected.replacen(enabled_mark, unpriv_mark, 1)
            } else {
                detected
            };
            let enabled = unprivileged.replacen(unpriv_mark, enabled_mark, 1);
            let (find, replace) = rules.config_swap;
            let config = unprivileged.replacen(find, replace, 1);
            let (find, replace) = rules.config_section_swap;
            let config_section = unprivileged.replacen(find, replace, 1);
            (
                Self {
                    unprivileged,
                    enabled,
                    config,
                    config_section,
                },
                if starts_enabled {
                    Mode::Enabled
                } else {
                    Mode::Unprivileged
                },
            )
        } else {
            let enabled = detected;
            let (find, replace) = rules.config_swap;
            let config = enabled.replacen(find, replace, 1);
            let (find, replace) = rules.config_section_swap;
            let config_section = enabled.replacen(find, replace, 1);
            (
                Self {
                    unprivileged: enabled.clone(),
                    enabled,
                    config,
                    config_section,
                },
                Mode::Enabled,
            )
        };

        debug!(
            "detected prompts, enabled: {:?}, config: {:?}, section: {:?}",
            set.enabled, set.config, set.config_section
        );
        Ok((set, mode))
    }

    /// Classifies output ending in one of the known prompts.
    ///
    /// Unmatched output yields [`Mode::Unknown`] rather than an error; the
    /// caller decides whether that is acceptable.
    pub fn classify(&self, output: &str) -> Mode {
        let tail = output.trim_end();
        if tail.ends_with(&self.config) {
            Mode::Config
        } else if tail.ends_with(&self.enabled) {
            Mode::Enabled
        } else if tail.ends_with(&self.unprivileged) {
            Mode::Unprivileged
        } else {
            Mode::Unknown
        }
    }
}
