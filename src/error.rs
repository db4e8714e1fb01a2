//! Error types for the Fleetwatch governance layer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::validate::ValidationError;

/// Main error type for Fleetwatch setup and configuration.
#[derive(Error, Debug)]
pub enum FleetwatchError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Fleetwatch operations.
pub type Result<T> = std::result::Result<T, FleetwatchError>;

/// Errors returned by the gateway operations exposed to the HTTP layer.
///
/// Every variant maps to an HTTP status code and a message that can be shown
/// to a user as-is.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed or out-of-range input (client fault)
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Caller is over quota or temporarily blocked
    #[error("Rate limit exceeded")]
    RateLimited {
        /// When the caller may try again
        retry_at: Option<DateTime<Utc>>,
        /// Whether the caller is serving a block rather than a soft rejection
        blocked: bool,
    },

    /// The remote service failed (after retries, for throttling)
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The caller-supplied deadline elapsed before the operation completed
    #[error("Request did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Serializable error payload handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

impl GatewayError {
    /// HTTP status code the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::Remote(RemoteError::NotFound(_)) => 404,
            GatewayError::Remote(RemoteError::PermissionDenied(_)) => 403,
            GatewayError::Remote(RemoteError::Throttled(_)) => 503,
            GatewayError::Remote(RemoteError::Unknown(_)) => 500,
            GatewayError::DeadlineExceeded(_) => 504,
        }
    }

    /// Value for the `Retry-After` header, in whole seconds (at least 1).
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        match self {
            GatewayError::RateLimited {
                retry_at: Some(at), ..
            } => {
                let millis = (*at - now).num_milliseconds().max(0) as u64;
                Some(millis.div_ceil(1000).max(1))
            }
            GatewayError::RateLimited { retry_at: None, .. } => Some(1),
            _ => None,
        }
    }

    /// Human-readable message for the UI.
    pub fn message(&self) -> String {
        match self {
            GatewayError::Validation(e) => e.to_string(),
            GatewayError::RateLimited {
                retry_at: Some(at),
                blocked: true,
            } => format!(
                "Too many requests. You have been temporarily blocked until {}",
                at.to_rfc3339()
            ),
            GatewayError::RateLimited {
                retry_at: Some(at),
                blocked: false,
            } => format!("Rate limit exceeded. Try again after {}", at.to_rfc3339()),
            GatewayError::RateLimited { retry_at: None, .. } => {
                "Rate limit exceeded. Try again shortly".to_string()
            }
            GatewayError::Remote(e) => e.user_message(),
            GatewayError::DeadlineExceeded(d) => format!(
                "The request took longer than {} seconds and was cancelled",
                d.as_secs()
            ),
        }
    }

    /// Build the payload for the UI.
    pub fn to_body(&self) -> ErrorBody {
        let retry_at = match self {
            GatewayError::RateLimited { retry_at, .. } => *retry_at,
            _ => None,
        };
        ErrorBody {
            message: self.message(),
            retry_at,
        }
    }
}
