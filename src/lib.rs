//! Sinkhole - a DNS sinkhole proxy for small networks.
//!
//! Sinkhole listens for DNS queries over UDP, answers queries for blocked
//! names with a synthesized NXDOMAIN and relays everything else to a single
//! upstream resolver. It keeps lifetime counters, a trailing-window block
//! rate and a small per-client table for dashboards.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`dns`]: Wire codec, classifier and upstream relays
//! - [`lists`]: Block/allow/keyword lists, loading and hot reload
//! - [`stats`]: Counters, rolling window and client table
//! - [`server`]: Per-packet dispatch and the serve loop
//! - [`status`]: Status line publisher
//! - [`network`]: Device address lookup
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The relay sits behind the [`dns::Relay`] trait, so dispatch can be
//! exercised without network access:
//!
//! ```rust
//! use sinkhole::dns::classifier::classify;
//! use sinkhole::lists::Lists;
//!
//! let lists = Lists::new(["ads.example.com"], [""; 0], ["tracker"]);
//! assert!(classify("x.ads.example.com", &lists).is_blocked());
//! assert!(classify("tracker.example.org", &lists).is_blocked());
//! assert!(!classify("example.com", &lists).is_blocked());
//! ```

pub mod config;
pub mod dns;
pub mod error;
pub mod lists;
pub mod metrics;
pub mod network;
pub mod server;
pub mod stats;
pub mod status;

pub use config::Config;
pub use error::{Error, Result};
