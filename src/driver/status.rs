//! Host state reported to callers.

use std::fmt;

use tracing::debug;

use super::{Driver, DriverError};
use crate::keys::KeyStore;
use crate::provider::{CloudConnector, CloudSession};

/// Coarse machine state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostState {
    /// Instance is running.
    Running,
    /// Instance is paused.
    Paused,
    /// Instance is powered off.
    Stopped,
    /// Instance is still being built.
    Starting,
    /// Provider reports a failure.
    Error,
    /// Any status not in the table.
    Unknown,
}

const STATUS_TABLE: &[(&str, HostState)] = &[
    ("ACTIVE", HostState::Running),
    ("PAUSED", HostState::Paused),
    ("SHUTOFF", HostState::Stopped),
    ("BUILD", HostState::Starting),
    ("BUILDING", HostState::Starting),
    ("ERROR", HostState::Error),
];

impl HostState {
    /// Maps a provider status string.
    #[must_use]
    pub fn from_provider_status(status: &str) -> Self {
        STATUS_TABLE
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(status.trim()))
            .map_or(Self::Unknown, |(_, state)| *state)
    }

    /// Label printed by the `status` command.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    /// Queries the instance status.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingInstance`] when no instance is recorded,
    /// or the provider error.
    pub async fn state(&mut self) -> Result<HostState, DriverError> {
        let session = self.session().await?;
        let instance = self.require_instance()?;
        let details = session.get_instance(&instance).await?;
        let state = HostState::from_provider_status(&details.status);
        debug!(instance_id = %instance, status = %details.status, %state, "queried instance state");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ACTIVE", HostState::Running)]
    #[case("PAUSED", HostState::Paused)]
    #[case("SHUTOFF", HostState::Stopped)]
    #[case("BUILD", HostState::Starting)]
    #[case("BUILDING", HostState::Starting)]
    #[case("ERROR", HostState::Error)]
    #[case("active", HostState::Running)]
    #[case("MIGRATING", HostState::Unknown)]
    #[case("", HostState::Unknown)]
    fn maps_provider_status(#[case] status: &str, #[case] expected: HostState) {
        assert_eq!(HostState::from_provider_status(status), expected);
    }
}
