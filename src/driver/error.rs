//! Error types for driver operations.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::keys::KeyStoreError;
use crate::provider::ProviderError;

/// Errors raised by [`super::Driver`] operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Raised when configuration is rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a name that must resolve does not.
    #[error("{kind} not found by name `{name}`")]
    NotFound {
        /// Resource kind, for example `flavor`.
        kind: String,
        /// Requested name.
        name: String,
    },
    /// Raised when a provider call fails.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Raised when local key material cannot be produced.
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    /// Raised when the bootstrap payload file cannot be read.
    #[error("failed to read user data from {path}: {message}")]
    UserData {
        /// Payload path.
        path: String,
        /// Operating system error text.
        message: String,
    },
    /// Raised when an operation needs an instance but none is recorded.
    #[error("machine {machine} has no instance")]
    MissingInstance {
        /// Machine name.
        machine: String,
    },
    /// Raised when the machine has no address yet.
    #[error("IP address is not set")]
    MissingAddress,
    /// Raised when one or more teardown steps fail.
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl DriverError {
    pub(crate) fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Teardown steps in execution order.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TeardownStep {
    /// Delete the instance.
    Instance,
    /// Delete the key pair.
    KeyPair,
    /// Release the floating IP.
    FloatingIp,
    /// Delete the subnet.
    Subnet,
    /// Delete the default security group.
    DefaultSecurityGroup,
    /// Delete the fixed-port security group.
    FixedPortSecurityGroup,
    /// Delete the VPC.
    Vpc,
}

impl TeardownStep {
    /// Reverse of the creation order.
    pub const ORDER: [Self; 7] = [
        Self::Instance,
        Self::KeyPair,
        Self::FloatingIp,
        Self::Subnet,
        Self::DefaultSecurityGroup,
        Self::FixedPortSecurityGroup,
        Self::Vpc,
    ];

    /// Human readable resource label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::KeyPair => "key pair",
            Self::FloatingIp => "floating IP",
            Self::Subnet => "subnet",
            Self::DefaultSecurityGroup => "default security group",
            Self::FixedPortSecurityGroup => "fixed-port security group",
            Self::Vpc => "VPC",
        }
    }
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One failed teardown step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownFailure {
    /// Step that failed.
    pub step: TeardownStep,
    /// Underlying provider error.
    pub error: ProviderError,
}

/// Every step that failed during `remove`, in execution order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownError {
    failures: Vec<TeardownFailure>,
}

impl TeardownError {
    pub(crate) const fn new(failures: Vec<TeardownFailure>) -> Self {
        Self { failures }
    }

    /// Returns the failures in execution order.
    #[must_use]
    pub fn failures(&self) -> &[TeardownFailure] {
        &self.failures
    }

    /// Returns the number of failed steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns `true` when no step failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} teardown step(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.step, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownError {}
