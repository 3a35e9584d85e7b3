//! Operating modes and transition planning.
//!
//! The mode graph is a chain: unprivileged <-> enabled <-> config. Plans
//! are computed as data and executed by the engine with the family's
//! command sequences, so a transition between non-adjacent modes is just
//! the composition of the two adjacent steps.

use crate::error::SessionError;

/// Operating mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Logged in but not privilege-escalated.
    Unprivileged,
    /// Full read access to device state.
    Enabled,
    /// Configuration statements take effect.
    Config,
    /// Output did not match any known prompt.
    Unknown,
}

/// One step of a mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModeStep {
    /// Run the privilege escalation dialog.
    Escalate,
    /// Enter configuration mode.
    EnterConfig,
    /// Leave configuration mode back to enabled.
    LeaveConfig,
    /// Drop from enabled back to the unprivileged prompt.
    Deescalate,
}

/// Computes the command steps needed to move between modes.
///
/// Same-mode plans are empty, so repeated switches issue no writes.
pub(crate) fn transition_plan(from: Mode, to: Mode) -> Result<Vec<ModeStep>, SessionError> {
    if from == to {
        return Ok(Vec::new());
    }
    match (from, to) {
        (_, Mode::Unknown) => Err(SessionError::Internal(
            "cannot switch into the unknown mode".to_string(),
        )),
        (Mode::Unknown, target) => Err(SessionError::Internal(format!(
            "session mode is unknown, cannot plan a switch to {target:?}"
        ))),
        (Mode::Unprivileged, Mode::Enabled) => Ok(vec![ModeStep::Escalate]),
        (Mode::Unprivileged, Mode::Config) => Ok(vec![ModeStep::Escalate, ModeStep::EnterConfig]),
        (Mode::Enabled, Mode::Config) => Ok(vec![ModeStep::EnterConfig]),
        (Mode::Enabled, Mode::Unprivileged) => Ok(vec![ModeStep::Deescalate]),
        (Mode::Config, Mode::Enabled) => Ok(vec![ModeStep::LeaveConfig]),
        (Mode::Config, Mode::Unprivileged) => {
            Ok(vec![ModeStep::LeaveConfig, ModeStep::Deescalate])
        }
        // All remaining pairs are equal and handled above.
        (from, to) => Err(SessionError::Internal(format!(
            "no transition from {from:?} to {to:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_mode_plans_are_empty() {
        for mode in [Mode::Unprivileged, Mode::Enabled, Mode::Config] {
            assert!(transition_plan(mode, mode).expect("plan").is_empty());
        }
    }

    #[test]
    fn adjacent_transitions_are_single_steps() {
        assert_eq!(
            transition_plan(Mode::Enabled, Mode::Config).expect("plan"),
            vec![ModeStep::EnterConfig]
        );
        assert_eq!(
            transition_plan(Mode::Config, Mode::Enabled).expect("plan"),
            vec![ModeStep::LeaveConfig]
        );
        assert_eq!(
            transition_plan(Mode::Unprivileged, Mode::Enabled).expect("plan"),
            vec![ModeStep::Escalate]
        );
    }

    #[test]
    fn non_adjacent_transitions_compose_adjacent_steps() {
        assert_eq!(
            transition_plan(Mode::Unprivileged, Mode::Config).expect("plan"),
            vec![ModeStep::Escalate, ModeStep::EnterConfig]
        );
        assert_eq!(
            transition_plan(Mode::Config, Mode::Unprivileged).expect("plan"),
            vec![ModeStep::LeaveConfig, ModeStep::Deescalate]
        );
    }

    #[test]
    fn unknown_modes_cannot_be_planned() {
        assert!(transition_plan(Mode::Unknown, Mode::Enabled).is_err());
        assert!(transition_plan(Mode::Enabled, Mode::Unknown).is_err());
    }
}
