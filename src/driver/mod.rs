//! Machine lifecycle driver for Open Telekom Cloud.
//!
//! [`Driver`] owns the machine record and drives every provisioning step in
//! dependency order: resolve names, then network, subnet, security groups,
//! key pair, instance and address. Each step is skipped when its identifier is
//! already recorded, so re-running `create` after a partial failure only does
//! the remaining work. `remove` walks the steps in reverse and deletes only
//! what this driver created.

mod address;
mod error;
mod instance;
mod keypair;
mod network;
mod record;
mod resolve;
mod security;
mod status;
mod teardown;

use camino::Utf8PathBuf;
use tracing::info;

use crate::config::DriverConfig;
use crate::flags::{DEFAULT_SSH_PORT, DEFAULT_SSH_USER};
use crate::keys::KeyStore;
use crate::managed::{InstanceId, IpAddress, ResourceValue};
use crate::options::DriverOptions;
use crate::provider::{CloudConnector, CloudSession, status as provider_status};

pub use error::{DriverError, TeardownError, TeardownFailure, TeardownStep};
pub use keypair::generated_key_pair_name;
pub use record::{MachineRecord, ResolvedIds};
pub use security::FIXED_PORT_RANGES;
pub use status::HostState;

/// Driver identifier reported to hosts.
pub const DRIVER_NAME: &str = "otc-v2";
/// Docker daemon TLS port.
pub const DOCKER_PORT: u16 = 2376;

const SSH_KEY_FILE_NAME: &str = "id_rsa";

/// Lifecycle driver for one machine.
pub struct Driver<C: CloudConnector, K: KeyStore> {
    connector: C,
    keys: K,
    session: Option<C::Session>,
    config: DriverConfig,
    record: MachineRecord,
    resolved: ResolvedIds,
    machine_dir: Utf8PathBuf,
}

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    /// Creates a driver for `machine_name` whose files live in `machine_dir`.
    ///
    /// The driver holds an empty configuration until
    /// [`Driver::set_config_from_flags`] or [`Driver::restore`] is called.
    #[must_use]
    pub fn new(
        machine_name: &str,
        machine_dir: impl Into<Utf8PathBuf>,
        connector: C,
        keys: K,
    ) -> Self {
        Self {
            connector,
            keys,
            session: None,
            config: DriverConfig::default(),
            record: MachineRecord {
                machine_name: machine_name.to_owned(),
                ssh_user: DEFAULT_SSH_USER.to_owned(),
                ssh_port: DEFAULT_SSH_PORT,
                ..MachineRecord::default()
            },
            resolved: ResolvedIds::default(),
            machine_dir: machine_dir.into(),
        }
    }

    /// Binds and validates options, then seeds a fresh record from them.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when the options are rejected; the
    /// driver is left unchanged.
    pub fn set_config_from_flags(&mut self, options: &impl DriverOptions) -> Result<(), DriverError> {
        let config = DriverConfig::from_options(options)?;
        self.record = MachineRecord::seeded(&self.record.machine_name, &config);
        self.resolved = ResolvedIds::from_config(&config);
        self.config = config;
        self.session = None;
        Ok(())
    }

    /// Restores a persisted record alongside freshly bound configuration.
    ///
    /// `config` is taken as bound, not validated: authentication comes from
    /// the record. [`Driver::create`] still rejects conflicting bootstrap
    /// sources before any provider call; other cross-field rules are only
    /// enforced by [`Driver::set_config_from_flags`].
    pub fn restore(&mut self, config: DriverConfig, record: MachineRecord) {
        self.resolved = ResolvedIds::from_config(&config);
        self.config = config;
        self.record = record;
        self.session = None;
    }

    /// Returns the driver identifier.
    #[must_use]
    pub const fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    /// Returns the machine record.
    #[must_use]
    pub const fn record(&self) -> &MachineRecord {
        &self.record
    }

    /// Returns the bound configuration.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Returns the machine name.
    #[must_use]
    pub fn machine_name(&self) -> &str {
        &self.record.machine_name
    }

    /// Path of the SSH private key used to reach the machine.
    #[must_use]
    pub fn ssh_key_path(&self) -> Utf8PathBuf {
        self.machine_dir.join(SSH_KEY_FILE_NAME)
    }

    /// SSH login, `ubuntu` when unset.
    #[must_use]
    pub fn ssh_username(&self) -> &str {
        self.record.ssh_user_or_default()
    }

    /// SSH port, 22 when unset.
    #[must_use]
    pub const fn ssh_port(&self) -> u16 {
        self.record.ssh_port_or_default()
    }

    /// Returns the machine address.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingAddress`] when no address is recorded.
    pub fn ip(&self) -> Result<IpAddress, DriverError> {
        if self.record.floating_ip.is_present() {
            Ok(self.record.floating_ip.value().clone())
        } else {
            Err(DriverError::MissingAddress)
        }
    }

    /// Returns the host name used for SSH, which is the machine address.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingAddress`] when no address is recorded.
    pub fn ssh_hostname(&self) -> Result<IpAddress, DriverError> {
        self.ip()
    }

    /// Returns the Docker endpoint, or `None` while no address is recorded.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        let host = self.ip().ok()?;
        if host.contains(':') {
            Some(format!("tcp://[{host}]:{DOCKER_PORT}"))
        } else {
            Some(format!("tcp://{host}:{DOCKER_PORT}"))
        }
    }

    async fn session(&mut self) -> Result<C::Session, DriverError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }
        let session = self.connector.authenticate(&self.record.auth).await?;
        self.session = Some(session.clone());
        Ok(session)
    }

    fn require_instance(&self) -> Result<InstanceId, DriverError> {
        if self.record.instance_id.is_blank() {
            return Err(DriverError::MissingInstance {
                machine: self.record.machine_name.clone(),
            });
        }
        Ok(self.record.instance_id.clone())
    }

    /// Provisions every resource the machine needs.
    ///
    /// The record is updated as each resource appears, so the caller should
    /// persist it even when this returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when both bootstrap sources are set,
    /// before any provider call. Otherwise returns the first failing step's
    /// error; no rollback is attempted.
    pub async fn create(&mut self) -> Result<(), DriverError> {
        info!(machine = %self.record.machine_name, "creating machine");
        self.config.check_user_data_sources()?;
        let session = self.session().await?;
        self.resolve_ids(&session).await?;
        self.ensure_vpc(&session).await?;
        self.ensure_subnet(&session).await?;
        self.ensure_security_groups(&session).await?;
        self.acquire_key_pair(&session).await?;
        self.ensure_instance(&session).await?;
        self.ensure_address(&session).await?;
        info!(
            machine = %self.record.machine_name,
            instance_id = %self.record.instance_id,
            address = %self.record.floating_ip.value(),
            "machine created"
        );
        Ok(())
    }

    /// Powers the instance on and waits until it is running.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingInstance`] or the provider error.
    pub async fn start(&mut self) -> Result<(), DriverError> {
        let session = self.session().await?;
        let instance = self.require_instance()?;
        session.start_instance(&instance).await?;
        session
            .wait_for_instance_status(&instance, provider_status::INSTANCE_RUNNING)
            .await?;
        info!(instance_id = %instance, "instance started");
        Ok(())
    }

    /// Powers the instance off and waits until it is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingInstance`] or the provider error.
    pub async fn stop(&mut self) -> Result<(), DriverError> {
        let session = self.session().await?;
        let instance = self.require_instance()?;
        session.stop_instance(&instance).await?;
        session
            .wait_for_instance_status(&instance, provider_status::INSTANCE_STOPPED)
            .await?;
        info!(instance_id = %instance, "instance stopped");
        Ok(())
    }

    /// Stops then starts the instance.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn restart(&mut self) -> Result<(), DriverError> {
        self.stop().await?;
        self.start().await
    }

    /// Same as [`Driver::stop`]; the provider offers no harder power-off.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingInstance`] or the provider error.
    pub async fn kill(&mut self) -> Result<(), DriverError> {
        self.stop().await
    }
}

#[cfg(test)]
mod tests;
