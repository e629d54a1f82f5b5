//! Manager wiring for the Metal3 cluster-api infrastructure provider
//!
//! The binary glues together the pieces a controller-manager deployment
//! needs: CLI flags, webhook TLS policy, API readiness gating, controller
//! and webhook registration, leader election, and the run loop.

#![deny(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod controllers;
pub mod manager;
pub mod metrics;
pub mod readiness;
pub mod server;
pub mod tls;
pub mod webhook;
