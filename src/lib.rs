//! rovlink - command and telemetry link between a topside station and an ROV
//!
//! - [`command`] - fixed-rate, CRC-protected command stream to the vehicle
//! - [`telemetry`] - resource and inertial receivers, shared store, record forwarder
//! - [`controller`] - game controller polling, calibration and shaping
//! - [`config`] - TOML configuration
//! - [`checksum`] - CRC-32 shared by both directions

pub mod checksum;
pub mod command;
pub mod config;
pub mod controller;
pub mod telemetry;
pub mod worker;
