//! Operations exposed to the dashboard's HTTP layer.
//!
//! Every operation validates its input first, then consults the matching rate
//! limiter, and only then talks to the remote service. The HTTP layer maps
//! [`GatewayError`](crate::error::GatewayError) to a status code, a
//! `Retry-After` header and an [`ErrorBody`](crate::error::ErrorBody).

mod caller;
mod service;

pub use caller::CallerId;
pub use service::{Gateway, HealthReport, Maintenance, MetricsRequest};
