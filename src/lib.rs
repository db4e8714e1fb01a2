//! Fleetwatch - Request Governance for a Container-Fleet Dashboard
//!
//! This crate sits between a dashboard's HTTP layer and the cloud APIs it
//! reads from. It validates every piece of user input, rate limits callers
//! with progressive blocking, and fans status queries out across many
//! clusters without tripping the provider's own throttling.

pub mod config;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod ratelimit;
pub mod remote;
pub mod validate;
