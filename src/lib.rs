//! # fleetsh - Concurrent network device configuration over SSH
//!
//! `fleetsh` automates command execution and configuration deployment
//! across fleets of network devices that only expose an interactive,
//! text-based CLI. Devices like these have no structured RPC: the crate
//! reconstructs command/response framing from the raw shell byte stream by
//! detecting vendor prompts, drives each vendor's privilege/configuration
//! mode machine, and runs many such sessions concurrently with bounded
//! resources and per-host fault isolation.
//!
//! ## Features
//!
//! - **Prompt detection**: the full set of mode prompts is derived from one
//!   observed prompt using per-family substitution rules
//! - **Mode state machine**: transitions between unprivileged, enabled and
//!   configuration mode, composed automatically for non-adjacent pairs
//! - **Vendor dialects as data**: Ironware, JunOS, SLX and VDX profiles
//!   with command rewrite tables, error patterns and commit/rollback
//!   semantics; the engine itself is vendor-agnostic
//! - **Bounded fleet execution**: one worker per host behind a capacity
//!   semaphore, results streamed in completion order
//! - **Legacy device compatibility**: opt-in old key exchanges and CBC
//!   ciphers for ancient firmware
//! - **Async/await**: built on Tokio; every session is internally strictly
//!   sequential
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetsh::fleet::{self, FleetConfig};
//! use fleetsh::hosts;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inventory = hosts::load_inventory(
//!         r#"
//! - hostname: core1
//!   username: ops
//!   password: secret
//!   enable_secret: more-secret
//!   device_type: ironware
//!   exec_mode: true
//!   payload: "show version;fleet_bgp"
//!   labels:
//!     env: prod
//! "#,
//!     )?;
//!
//!     let selected = hosts::select_targets(inventory, "env=prod", "");
//!     let mut results = fleet::run(selected, FleetConfig { max_concurrent: 2 });
//!
//!     while let Some(result) = results.recv().await {
//!         match result.error {
//!             None => println!("{}\n{}", result.hostname, result.output),
//!             Some(err) => eprintln!("{}: {err}", result.hostname),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`fleet`] - bounded concurrent dispatch and result aggregation
//! - [`session::DeviceSession`] - one live CLI session with prompt and
//!   mode tracking
//! - [`vendor`] - built-in device family profiles
//! - [`hosts`] - inventory records and label selection
//! - [`error::SessionError`] - error taxonomy for sessions and runs
//! - [`config`] - SSH algorithm preference tables

pub mod config;
pub mod error;
pub mod fleet;
pub mod hosts;
pub mod session;
pub mod vendor;
