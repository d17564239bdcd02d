//! Application Layer
//!
//! Ports describing the external systems, and the services that drive them.

pub mod ports;
pub mod services;
