//! # Lag Compensation Game Server Library
//!
//! This library provides the authoritative server for a networked multiplayer
//! game whose defining feature is server-side lag compensation: client hit
//! claims are validated against a reconstruction of where the target actually
//! was when the shooter fired, not where it is by the time the claim arrives.
//!
//! ## Core Responsibilities
//!
//! ### Historical State Reconstruction
//! Every simulation tick the server records a timestamped pose snapshot for
//! each tracked entity into a bounded ring buffer. When a hit claim arrives,
//! the server rewinds its clock by half the shooter's smoothed round-trip
//! time (plus a small interpolation allowance) and rebuilds the target's
//! pose at that moment by interpolating between the bracketing snapshots.
//!
//! ### Hit Validation
//! A claim is accepted only if the claimed hit point lies within a configured
//! tolerance radius of the reconstructed target position. Reconstruction
//! clamps at the edges of retained history and never extrapolates forward,
//! so high-latency clients cannot be credited for positions the target was
//! never observed to occupy.
//!
//! ### Graceful Degradation
//! Missing data never aborts validation: unknown shooters fall back to a
//! conservative default RTT, targets without usable history are checked
//! against their newest recorded pose, and a kill switch can disable
//! compensation entirely at runtime. The hot path never panics.
//!
//! ## Architecture Design
//!
//! ### Single Simulation Writer
//! All mutation of world state, pose history, RTT estimates and statistics
//! happens on the main server loop. Network tasks only move packets through
//! channels, which serializes hit claims in server-receipt order and keeps
//! every engine entry point synchronous and lock-free.
//!
//! ### Bounded Memory
//! Pose history, RTT estimates and the diagnostics ring are all bounded per
//! participant and dropped eagerly on disconnect, so a long-running match
//! holds memory proportional to the live player count, not to uptime.
//!
//! ## Module Organization
//!
//! - [`history`] — per-entity snapshot ring buffers and the store that owns
//!   them
//! - [`interpolation`] — pose reconstruction at arbitrary past timestamps
//! - [`rtt`] — exponentially smoothed per-participant round-trip times
//! - [`validation`] — the lag compensation engine orchestrating the above
//! - [`stats`] — rolling validation counters and the recent-decision ring
//! - [`game`] — live world state: spawns, movement, per-tick integration
//! - [`client_manager`] — connection lifecycle, input buffering, timeouts
//! - [`network`] — UDP transport, heartbeat RTT probes, the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::validation::LagCompensationConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16), // 60Hz tick
//!         32,
//!         LagCompensationConfig::default(),
//!     ).await?;
//!
//!     // Runs the main loop: records pose history every tick, probes RTT,
//!     // validates incoming hit claims against rewound state, and
//!     // broadcasts authoritative world updates.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod history;
pub mod interpolation;
pub mod network;
pub mod rtt;
pub mod stats;
pub mod validation;
