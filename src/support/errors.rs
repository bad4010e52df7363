//! Error taxonomy for the OCPP core.
//!
//! `DomainError` variants map onto the protocol outcomes the handlers must
//! produce: validation failures become rejected payloads, authorization
//! failures become `Invalid` idTagInfo, state conflicts become OCPP error
//! envelopes. Integration failures are soft: logged and carried as a result,
//! never propagated to the transport.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation: {0}")]
    Validation(String),

    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("Charging station not found: {0}")]
    StationNotFound(String),

    #[error("Registration token rejected: {0}")]
    InvalidRegistrationToken(String),

    #[error("Boot attribute mismatch on {station}: {field}")]
    AttributeMismatch { station: String, field: &'static str },

    #[error("Authorization failed for tag {tag}: {reason}")]
    Unauthorized { tag: String, reason: String },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(i32),

    #[error("Transaction {0} is already stopped")]
    TransactionAlreadyStopped(i32),

    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("{service} integration failed: {message}")]
    Integration { service: &'static str, message: String },

    #[error("Lock {0} unavailable")]
    LockUnavailable(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Soft errors are logged by the handler and do not fail the OCPP
    /// response (categories 5 and 6 of the error taxonomy).
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            DomainError::Integration { .. }
                | DomainError::LockUnavailable(_)
                | DomainError::Timeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
