//! Error types for Subsystem 18.
//!
//! Errors raised by the observed unit of work are never wrapped here: the
//! engine hands them back to the caller untouched. These enums only cover
//! failures of the collaborators the engine decorates (gas, store), of the
//! tracing setup itself, and of the traced block lifecycle.

use thiserror::Error;

use crate::domain::gas::Gas;

/// Gas accounting failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GasError {
    #[error("out of gas in location: {descriptor}; gas used: {consumed}, limit: {limit}")]
    OutOfGas {
        descriptor: String,
        consumed: Gas,
        limit: Gas,
    },

    #[error("gas overflow in location: {descriptor}")]
    Overflow { descriptor: String },

    #[error("negative gas consumed in location: {descriptor}; consumed {consumed}, refund {refund}")]
    NegativeGas {
        descriptor: String,
        consumed: Gas,
        refund: Gas,
    },
}

/// Key-value store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Unknown store namespace: {0}")]
    UnknownNamespace(String),

    #[error(transparent)]
    Gas(#[from] GasError),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Tracing setup errors.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Failures of the traced block lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A module hook failed; the module's own error is the source.
    #[error("module {module} failed: {source}")]
    Module {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// Two modules both returned validator set updates in one pass.
    #[error("validator EndBlock updates already set by a previous module (conflicting module: {module})")]
    ValidatorSetConflict { module: String },
}
