//! # Error Types
//!
//! Errors shared across subsystems: ledger call failures with their
//! retry classification, and key-value store failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry classification of a ledger failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network or consensus hiccup. Retry with backoff.
    Transient,
    /// Needs an operator (balance, credentials, payload). Dead-letter at once.
    Fatal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Status codes reported by the ledger network or its client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerErrorCode {
    Busy,
    PlatformTransactionNotCreated,
    Timeout,
    Unavailable,
    NetworkError,
    ConnectionError,
    InsufficientPayerBalance,
    InvalidSignature,
    InvalidCredentials,
    MalformedPayload,
    InvalidTopic,
    /// Any status not listed above, kept verbatim.
    Other(String),
}

impl LedgerErrorCode {
    /// Parse a status string as reported by the network (`"BUSY"`, ...).
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "BUSY" => Self::Busy,
            "PLATFORM_TRANSACTION_NOT_CREATED" => Self::PlatformTransactionNotCreated,
            "TIMEOUT" => Self::Timeout,
            "UNAVAILABLE" => Self::Unavailable,
            "NETWORK_ERROR" => Self::NetworkError,
            "CONNECTION_ERROR" => Self::ConnectionError,
            "INSUFFICIENT_PAYER_BALANCE" => Self::InsufficientPayerBalance,
            "INVALID_SIGNATURE" => Self::InvalidSignature,
            "INVALID_CREDENTIALS" => Self::InvalidCredentials,
            "MALFORMED_PAYLOAD" | "INVALID_TRANSACTION_BODY" => Self::MalformedPayload,
            "INVALID_TOPIC_ID" => Self::InvalidTopic,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Busy => "BUSY",
            Self::PlatformTransactionNotCreated => "PLATFORM_TRANSACTION_NOT_CREATED",
            Self::Timeout => "TIMEOUT",
            Self::Unavailable => "UNAVAILABLE",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::InsufficientPayerBalance => "INSUFFICIENT_PAYER_BALANCE",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::InvalidTopic => "INVALID_TOPIC_ID",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Unknown codes are fatal: retrying what we cannot classify burns budget.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Busy
            | Self::PlatformTransactionNotCreated
            | Self::Timeout
            | Self::Unavailable
            | Self::NetworkError
            | Self::ConnectionError => ErrorClass::Transient,
            Self::InsufficientPayerBalance
            | Self::InvalidSignature
            | Self::InvalidCredentials
            | Self::MalformedPayload
            | Self::InvalidTopic
            | Self::Other(_) => ErrorClass::Fatal,
        }
    }
}

/// Failure of a ledger client call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("ledger error {}: {message}", .code.as_str())]
pub struct LedgerError {
    pub code: LedgerErrorCode,
    pub message: String,
}

impl LedgerError {
    pub fn new(code: LedgerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorCode::Unavailable, message)
    }

    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }
}

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// Underlying storage failed.
    #[error("I/O error: {message}")]
    IOError { message: String },

    /// Stored bytes could not be decoded.
    #[error("Corrupted value at key {key}: {message}")]
    Corrupted { key: String, message: String },
}
