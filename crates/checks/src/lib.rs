//! Icinga/Nagios health checks for a federated Matrix Synapse deployment.
//!
//! Each check lives in its own module with a clap `Args` struct and a `run`
//! function returning a [`probe::CheckOutput`]; the binaries under
//! `src/bin/` only parse arguments, set up logging and hand `run` to
//! [`probe::run_check`].
//!
//! | Binary | Module |
//! |---|---|
//! | `check-federation` | [`federation`] |
//! | `check-federation-tester` | [`federation_tester`] |
//! | `check-matrix-synapse` | [`synapse_metrics`] |
//! | `check-media-cdn` | [`media_cdn`] |
//! | `check-monitor-bot` | [`monitor_bot`] |
//! | `matrix-notify` | [`notification`] |
//! | `icinga2kuma` | [`kuma`] |

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod error;
pub mod federation;
pub mod federation_tester;
pub mod grafana;
pub mod icinga;
pub mod kuma;
pub mod media_cdn;
pub mod monitor_bot;
pub mod notification;
pub mod synapse_metrics;

pub use error::CheckError;
