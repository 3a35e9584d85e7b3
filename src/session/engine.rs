//! The session engine: connect, switch modes, paste configuration, run
//! commands, persist.
//!
//! One `DeviceSession` drives one device. All operations follow the same
//! discipline: every written line is framed by exactly one read that waits
//! for the prompt belonging to the current mode, so output never bleeds
//! between commands.

use std::time::Duration;

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::sleep;

use crate::error::SessionError;
use crate::hosts::HostTarget;
use crate::session::modes::{transition_plan, Mode, ModeStep};
use crate::session::prompts::PromptSet;
use crate::session::reader::{read_until, ReadError};
use crate::session::transport::ShellTransport;
use crate::vendor::{PersistPolicy, VendorProfile};

/// Strips carriage-return and backspace runs devices emit at line starts,
/// so error patterns match the echoed text.
static SCRUB_LINE_START: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
        Ok(re) => re,
        Err(err) => panic!("invalid SCRUB_LINE_START regex: {err}"),
    });

/// Per-session timing and pacing knobs.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline for every read-until-prompt.
    pub read_timeout: Duration,
    /// Pause after every write, for devices that drop pasted input.
    pub write_delay: Duration,
    /// Skip per-line acknowledgment when pasting configuration.
    pub speed_mode: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(15),
            write_delay: Duration::ZERO,
            speed_mode: false,
        }
    }
}

impl SessionOptions {
    pub fn from_target(target: &HostTarget) -> Self {
        Self {
            read_timeout: target.read_timeout(),
            write_delay: target.write_delay(),
            speed_mode: target.speed_mode,
        }
    }
}

/// One live connection to a device.
pub struct DeviceSession {
    transport: ShellTransport,
    profile: &'static VendorProfile,
    options: SessionOptions,
    enable_secret: Option<String>,
    prompts: Option<PromptSet>,
    mode: Mode,
    transcript: String,
}

impl DeviceSession {
    /// Opens a transport to the target and brings the session to a known
    /// mode: prompt detection, privilege escalation where the family needs
    /// it, paging suppression, then a mode probe.
    pub async fn connect(target: &HostTarget) -> Result<Self, SessionError> {
        let profile = target.device_type.profile();
        let transport = ShellTransport::open(target, profile.requires_pty).await?;
        let mut session = Self::over_transport(
            transport,
            profile,
            SessionOptions::from_target(target),
            target.enable_secret.clone(),
        );
        session.initialize().await?;
        Ok(session)
    }

    /// Wraps an existing transport without touching the network. The
    /// caller still has to run [`DeviceSession::initialize`].
    pub fn over_transport(
        transport: ShellTransport,
        profile: &'static VendorProfile,
        options: SessionOptions,
        enable_secret: Option<String>,
    ) -> Self {
        Self {
            transport,
            profile,
            options,
            enable_secret,
            prompts: None,
            mode: Mode::Unknown,
            transcript: String::new(),
        }
    }

    /// Runs the connect dialog on the already-open transport.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        let triggers = self.profile.read_triggers;
        let banner = self.read_till(triggers).await?;
        let (prompts, mode) = PromptSet::detect(self.profile, &banner)?;
        self.prompts = Some(prompts);
        self.mode = mode;

        if self.mode == Mode::Unprivileged {
            self.escalate().await?;
        }

        if let Some(paging_off) = self.profile.paging_off {
            self.write_line(paging_off).await?;
            let enabled = self.prompt_set()?.enabled.clone();
            self.read_till(&[enabled.as_str()]).await?;
            debug!("terminal paging disabled");
        }

        self.probe_mode().await?;
        Ok(())
    }

    /// Resolves the current mode by sending a bare newline and reading
    /// until any known prompt returns. Output that matches none of them
    /// leaves the session in [`Mode::Unknown`] instead of failing.
    pub async fn probe_mode(&mut self) -> Result<Mode, SessionError> {
        self.write_line("").await?;
        let prompts = self.prompt_set()?.clone();
        let seen = self
            .read_till(&[
                prompts.config.as_str(),
                prompts.enabled.as_str(),
                prompts.unprivileged.as_str(),
            ])
            .await?;
        self.mode = prompts.classify(&seen);
        debug!("current mode: {:?}", self.mode);
        Ok(self.mode)
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Prompts resolved at connect time, if detection has run.
    pub fn prompts(&self) -> Option<&PromptSet> {
        self.prompts.as_ref()
    }

    /// Output captured so far for this host.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Whether the transport can still carry writes.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Moves the session to the requested mode, composing adjacent
    /// transitions as needed. A no-op when already there.
    pub async fn switch_mode(&mut self, target: Mode) -> Result<(), SessionError> {
        let plan = transition_plan(self.mode, target)?;
        for step in plan {
            match step {
                ModeStep::Escalate => self.escalate().await?,
                ModeStep::EnterConfig => {
                    let enter = self.profile.enter_config;
                    let trigger = self.profile.enter_config_trigger;
                    self.write_line(enter).await?;
                    self.read_till(&[trigger]).await?;
                    self.mode = Mode::Config;
                    debug!("configuration mode on");
                }
                ModeStep::LeaveConfig => {
                    let leave = self.profile.leave_config;
                    for command in leave {
                        self.write_line(command).await?;
                    }
                    let enabled = self.prompt_set()?.enabled.clone();
                    self.read_till(&[enabled.as_str()]).await?;
                    self.mode = Mode::Enabled;
                }
                ModeStep::Deescalate => {
                    let leave = self.profile.leave_enabled;
                    self.write_line(leave).await?;
                    let unprivileged = self.prompt_set()?.unprivileged.clone();
                    self.read_till(&[unprivileged.as_str()]).await?;
                    self.mode = Mode::Unprivileged;
                }
            }
        }
        Ok(())
    }

    /// Pastes configuration into the device line by line.
    ///
    /// Comment lines never reach the device. Unless speed mode is on, each
    /// line waits for the configuration prompt to return and is checked
    /// against the family's error pattern; a hit aborts the paste with the
    /// offending line attached. One `+` marker is appended to the
    /// transcript per applied line.
    pub async fn paste_configuration(&mut self, content: &str) -> Result<(), SessionError> {
        self.switch_mode(Mode::Config).await?;
        let section = self.prompt_set()?.config_section.clone();

        for raw_line in content.lines() {
            let line = raw_line.trim_end();
            let first = line.trim_start();
            if first.starts_with('!') || first.starts_with('#') {
                continue;
            }
            self.write_line(line).await?;

            if !self.options.speed_mode {
                let echoed = self.read_till(&[section.as_str()]).await?;
                trace!("captured {echoed:?}");
                if let Some(pattern) = self.profile.error_pattern.as_ref() {
                    let cleaned = SCRUB_LINE_START.replace_all(&echoed, "");
                    if pattern.is_match(&cleaned) {
                        return Err(SessionError::ConfigError {
                            line: line.to_string(),
                            output: echoed,
                        });
                    }
                }
            }
            self.transcript.push('+');
        }
        self.transcript.push('\n');
        Ok(())
    }

    /// Runs exec commands line by line, capturing each response.
    ///
    /// Logical command names are rewritten through the family table before
    /// sending. End-of-stream is tolerated, since the last command may
    /// close the channel.
    pub async fn run_commands(&mut self, content: &str) -> Result<(), SessionError> {
        self.switch_mode(Mode::Enabled).await?;
        let enabled = self.prompt_set()?.enabled.clone();

        for raw_line in content.lines() {
            let line = self.profile.rewrite_command(raw_line.trim_end());
            self.write_line(&line).await?;
            let response = self.read_till_eof_ok(&[enabled.as_str()]).await?;
            self.transcript.push_str(&response);
            self.transcript.push('\n');
        }
        Ok(())
    }

    /// Persists the running configuration according to the family policy.
    pub async fn write_configuration(&mut self) -> Result<(), SessionError> {
        // All policy fields are Copy, so the match binds plain values and
        // leaves `self` free for the session calls below.
        match self.profile.persist {
            PersistPolicy::NoOp => Ok(()),

            PersistPolicy::WriteMemory { command, success } => {
                self.switch_mode(Mode::Enabled).await?;
                self.write_line(command).await?;
                self.read_till(success).await?;
                debug!("write startup-config done");
                Ok(())
            }

            PersistPolicy::Commit {
                command,
                check_success,
                complete,
                rollback,
                rollback_success,
            } => {
                self.switch_mode(Mode::Config).await?;
                self.write_line(command).await?;
                if let Err(err) = self.read_till(&[check_success]).await {
                    // The check never confirmed: roll back once and surface
                    // the original failure together with the rollback
                    // outcome.
                    let rollback_ok = self.try_rollback(rollback, rollback_success).await;
                    return Err(SessionError::CommitFailed {
                        reason: format!("configuration check failed: {err}"),
                        rollback_ok: Some(rollback_ok),
                    });
                }
                match self.read_till(&[complete]).await {
                    Ok(_) => Ok(()),
                    Err(err) => Err(SessionError::CommitFailed {
                        reason: format!("commit not completed: {err}"),
                        rollback_ok: None,
                    }),
                }
            }

            PersistPolicy::CopyConfirm {
                command,
                confirm_prompt,
                answer,
                settle_ms,
            } => {
                self.switch_mode(Mode::Enabled).await?;
                self.write_line(command).await?;
                if let Err(err) = self.read_till(&[confirm_prompt]).await {
                    return Err(SessionError::CommitFailed {
                        reason: format!("no confirmation prompt: {err}"),
                        rollback_ok: None,
                    });
                }
                self.write_line(answer).await?;
                let enabled = self.prompt_set()?.enabled.clone();
                self.read_till(&[enabled.as_str()]).await?;
                // Let the device settle before anything else is sent.
                sleep(Duration::from_millis(settle_ms)).await;
                Ok(())
            }
        }
    }

    /// Alias matching the commit-oriented families' vocabulary.
    pub async fn commit_configuration(&mut self) -> Result<(), SessionError> {
        self.write_configuration().await
    }

    /// Releases the transport. Idempotent and safe on a session that never
    /// finished connecting.
    pub fn close(&mut self) {
        self.transport.force_close();
    }

    async fn escalate(&mut self) -> Result<(), SessionError> {
        let Some(login) = self.profile.login.as_ref() else {
            return Err(SessionError::LoginFailure(
                "family has no escalation dialog".to_string(),
            ));
        };
        let secret = self.enable_secret.clone().unwrap_or_default();
        let enabled = self.prompt_set()?.enabled.clone();

        self.write_line(login.escalate).await?;
        if let Err(err) = self.read_till(&[login.password_prompt]).await {
            return Err(SessionError::LoginFailure(format!(
                "waiting for password prompt: {err}"
            )));
        }
        self.write_line(&secret).await?;
        if let Err(err) = self.read_till(&[enabled.as_str()]).await {
            return Err(SessionError::LoginFailure(format!(
                "waiting for enabled prompt: {err}"
            )));
        }
        self.mode = Mode::Enabled;
        debug!("privilege escalation complete");
        Ok(())
    }

    /// Attempts the one rollback a failed commit gets. Errors on the way
    /// are swallowed into the returned outcome; the commit failure stays
    /// the primary error.
    async fn try_rollback(&mut self, rollback: &str, rollback_success: &str) -> bool {
        debug!("commit failed, attempting rollback");
        if self.switch_mode(Mode::Config).await.is_err() {
            return false;
        }
        if self.write_line(rollback).await.is_err() {
            return false;
        }
        self.read_till(&[rollback_success]).await.is_ok()
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        trace!("send command: {line:?}");
        self.transport.send(format!("{line}\n")).await?;
        if !self.options.write_delay.is_zero() {
            sleep(self.options.write_delay).await;
        }
        Ok(())
    }

    /// Reads until any trigger appears. A timeout forcibly closes the
    /// transport before surfacing.
    async fn read_till(&mut self, triggers: &[&str]) -> Result<String, SessionError> {
        match read_until(&mut self.transport.rx, self.options.read_timeout, triggers).await {
            Ok(buffer) => Ok(buffer),
            Err(ReadError::TimedOut { partial }) => {
                debug!("timed out waiting for {triggers:?}");
                self.transport.force_close();
                Err(SessionError::Timeout {
                    waiting_for: triggers.join("|"),
                    partial,
                })
            }
            Err(ReadError::Closed { partial }) => Err(SessionError::ChannelClosed {
                waiting_for: triggers.join("|"),
                partial,
            }),
        }
    }

    /// Like [`read_till`], but a closed stream returns the partial buffer
    /// instead of an error.
    async fn read_till_eof_ok(&mut self, triggers: &[&str]) -> Result<String, SessionError> {
        match self.read_till(triggers).await {
            Ok(buffer) => Ok(buffer),
            Err(SessionError::ChannelClosed { partial, .. }) => Ok(partial),
            Err(err) => Err(err),
        }
    }

    fn prompt_set(&self) -> Result<&PromptSet, SessionError> {
        self.prompts
            .as_ref()
            .ok_or_else(|| SessionError::Internal("prompts not detected yet".to_string()))
    }
}
