//! SSH transport bridged to a duplex text stream.
//!
//! The engine never touches the SSH channel directly. `open` dials the
//! device, requests an optional pseudo terminal plus a shell, and spawns an
//! I/O task that shovels bytes between the channel and a pair of mpsc
//! queues. Everything above this layer (and every test) only sees the
//! queue halves.

use std::borrow::Cow;
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use log::debug;
use russh::{ChannelMsg, Preferred};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::config;
use crate::error::SessionError;
use crate::hosts::HostTarget;

/// SSH algorithm policy for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Modern algorithms only (default).
    #[default]
    Modern,
    /// Appends old key exchanges and CBC ciphers for ancient firmware.
    LegacyCompatible,
}

impl TransportSecurity {
    pub fn for_target(target: &HostTarget) -> Self {
        if target.legacy_ciphers {
            TransportSecurity::LegacyCompatible
        } else {
            TransportSecurity::Modern
        }
    }

    fn preferred(self) -> Preferred {
        match self {
            TransportSecurity::Modern => Preferred {
                kex: Cow::Borrowed(config::DEFAULT_KEX_ORDER),
                key: Cow::Borrowed(config::DEFAULT_KEY_TYPES),
                cipher: Cow::Borrowed(config::DEFAULT_CIPHERS),
                mac: Cow::Borrowed(config::DEFAULT_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::COMPRESSION_ALGORITHMS),
            },
            TransportSecurity::LegacyCompatible => Preferred {
                kex: Cow::Borrowed(config::LEGACY_KEX_ORDER),
                key: Cow::Borrowed(config::LEGACY_KEY_TYPES),
                cipher: Cow::Borrowed(config::LEGACY_CIPHERS),
                mac: Cow::Borrowed(config::LEGACY_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::COMPRESSION_ALGORITHMS),
            },
        }
    }
}

/// Duplex byte stream to a device shell.
pub struct ShellTransport {
    client: Option<Client>,
    tx: Option<Sender<String>>,
    pub(crate) rx: Receiver<String>,
}

impl ShellTransport {
    /// Dials the target and opens a shell on a new channel.
    pub async fn open(target: &HostTarget, request_pty: bool) -> Result<Self, SessionError> {
        let (host, port) = target.connection_addr();
        let security = TransportSecurity::for_target(target);

        let ssh_config = Config {
            preferred: security.preferred(),
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let server_check = if target.strict_host_check {
            match &target.known_hosts {
                Some(path) => ServerCheckMethod::KnownHostsFile(path.clone()),
                None => ServerCheckMethod::DefaultKnownHostsFile,
            }
        } else {
            ServerCheckMethod::NoCheck
        };

        let auth = match &target.key_file {
            Some(path) => AuthMethod::with_key_file(path, None),
            None => AuthMethod::with_password(&target.password),
        };

        let client = Client::connect_with_config(
            (host.clone(), port),
            &target.username,
            auth,
            server_check,
            ssh_config,
        )
        .await?;
        debug!("{host}:{port} TCP connection successful");

        let mut channel = client.get_channel().await?;
        if request_pty {
            // A dumb terminal keeps control characters and colors out of
            // the stream.
            channel.request_pty(false, "dumb", 80, 40, 0, 0, &[]).await?;
        }
        channel.request_shell(false).await?;
        debug!("{host}:{port} shell request successful");

        let (sender_to_shell, mut receiver_from_session) = mpsc::channel::<String>(256);
        let (sender_to_session, receiver_from_shell) = mpsc::channel::<String>(256);

        let io_addr = format!("{host}:{port}");
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = receiver_from_session.recv() => {
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{io_addr} failed to send data to shell: {e:?}");
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                if let Ok(s) = std::str::from_utf8(data)
                                    && sender_to_session.send(s.to_string()).await.is_err()
                                {
                                    debug!("{io_addr} shell output receiver dropped, closing task");
                                    break;
                                }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{io_addr} shell exited with status {exit_status}");
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{io_addr} shell sent EOF");
                                break;
                            }
                            _ => {}
                        }
                    },
                    else => break,
                }
            }
            debug!("{io_addr} shell I/O task ended");
        });

        Ok(Self {
            client: Some(client),
            tx: Some(sender_to_shell),
            rx: receiver_from_shell,
        })
    }

    /// Builds a transport from bare channel halves.
    ///
    /// Used by tests that script the device side of the conversation.
    pub fn from_pipes(tx: Sender<String>, rx: Receiver<String>) -> Self {
        Self {
            client: None,
            tx: Some(tx),
            rx,
        }
    }

    /// Sends raw bytes to the shell.
    pub async fn send(&self, data: String) -> Result<(), SessionError> {
        match &self.tx {
            Some(tx) => Ok(tx.send(data).await?),
            None => Err(SessionError::ChannelClosed {
                waiting_for: "write".to_string(),
                partial: String::new(),
            }),
        }
    }

    /// Tears the connection down. Idempotent; the SSH client closes on
    /// drop.
    pub fn force_close(&mut self) {
        if self.tx.take().is_some() {
            debug!("transport closed");
        }
        self.client.take();
        self.rx.close();
    }

    /// Whether the transport can still carry writes.
    pub fn is_open(&self) -> bool {
        match (&self.client, &self.tx) {
            (Some(client), Some(_)) => !client.is_closed(),
            (None, Some(_)) => true,
            _ => false,
        }
    }
}
