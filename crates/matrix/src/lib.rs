//! Thin Matrix client-server API client for the health checks.
//!
//! [`MatrixClient`] wraps the handful of v3 endpoints the checks use and
//! implements [`probe::ChannelParty`], so two clients on different
//! homeservers can drive the federation round-trip probe.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod credentials;
pub mod error;
mod party;
pub mod types;

pub use client::{mxc_to_http, MatrixClient};
pub use credentials::StoredCredentials;
pub use error::{call_outcome, MatrixError};
pub use types::{LoginResponse, RoomEvent};
