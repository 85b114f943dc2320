//! Driver configuration bound from flags, plus runtime settings loaded via
//! `ortho-config`.
//!
//! [`DriverConfig::bind`] reads every option from a [`DriverOptions`] source
//! and applies legacy-flag precedence; [`DriverConfig::validate`] enforces the
//! cross-field rules before any provider call is made.

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flags;
use crate::options::DriverOptions;
use crate::provider::{DiskOpts, ElasticIpOpts, WaitPolicy};

/// Errors raised while binding or validating configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Raised when only one half of a paired option is supplied.
    #[error("both {first} and {second} must be specified")]
    IncompletePair {
        /// Flag that was set or missing.
        first: String,
        /// Its partner flag.
        second: String,
    },
    /// Raised when two mutually exclusive options are both supplied.
    #[error("only one of {first} and {second} can be specified")]
    ConflictingOptions {
        /// First flag.
        first: String,
        /// Second flag.
        second: String,
    },
    /// Raised when no authentication method is configured.
    #[error(
        "at least one authorization method must be provided: cloud, username and password, token or access key and secret key"
    )]
    MissingAuth,
    /// Raised when a value does not have the kind the flag expects.
    #[error("{name} expects {expected}, got `{value}`")]
    InvalidValue {
        /// Flag name.
        name: String,
        /// Human readable kind.
        expected: String,
        /// Offending value.
        value: String,
    },
    /// Raised when a lookup names a flag outside the table.
    #[error("unknown option {0}")]
    UnknownOption(String),
    /// Raised when the runtime configuration loader fails to merge sources.
    #[error("failed to load runtime configuration: {0}")]
    Parse(String),
}

/// Authentication method selected by the supplied credentials.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthMethod {
    /// Named entry in `clouds.yaml`.
    Cloud,
    /// Username and password.
    Password,
    /// Pre-issued token.
    Token,
    /// Access key and secret key.
    AccessKey,
}

/// Credentials and endpoint selection for the identity service. Persisted
/// with the machine record.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AuthOptions {
    /// `clouds.yaml` entry name.
    pub cloud: String,
    /// Identity endpoint.
    pub auth_url: String,
    /// CA bundle path.
    pub ca_cert: String,
    /// Domain identifier.
    pub domain_id: String,
    /// Domain name.
    pub domain_name: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Project name.
    pub project_name: String,
    /// Project identifier.
    pub project_id: String,
    /// Region.
    pub region: String,
    /// Access key for AK/SK auth.
    pub access_key: String,
    /// Secret key for AK/SK auth.
    pub secret_key: String,
    /// Pre-issued token.
    pub token: String,
    /// Endpoint interface, for example `public`.
    pub endpoint_type: String,
}

impl AuthOptions {
    /// Returns the first configured method in precedence order.
    #[must_use]
    pub fn method(&self) -> Option<AuthMethod> {
        if !self.cloud.is_empty() {
            Some(AuthMethod::Cloud)
        } else if !self.username.is_empty() && !self.password.is_empty() {
            Some(AuthMethod::Password)
        } else if !self.token.is_empty() {
            Some(AuthMethod::Token)
        } else if !self.access_key.is_empty() && !self.secret_key.is_empty() {
            Some(AuthMethod::AccessKey)
        } else {
            None
        }
    }
}

/// Everything bound from driver options on one invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DriverConfig {
    /// Identity service credentials.
    pub auth: AuthOptions,
    /// Availability zone for the instance.
    pub availability_zone: String,
    /// Explicit flavor identifier.
    pub flavor_id: String,
    /// Flavor name resolved when no identifier is given.
    pub flavor_name: String,
    /// Image name resolved when no image identifier is given.
    pub image_name: String,
    /// Root disk; `source_id` carries the explicit image identifier.
    pub root_volume: DiskOpts,
    /// Explicit VPC identifier.
    pub vpc_id: String,
    /// VPC name to resolve or create.
    pub vpc_name: String,
    /// Explicit subnet identifier.
    pub subnet_id: String,
    /// Subnet name to resolve or create.
    pub subnet_name: String,
    /// Pre-allocated floating IP.
    pub floating_ip: String,
    /// Elastic IP allocation parameters.
    pub elastic_ip: ElasticIpOpts,
    /// Skip floating IP allocation and use the instance's own address.
    pub skip_floating_ip: bool,
    /// IP version assigned to the machine.
    pub ip_version: u8,
    /// SSH login.
    pub ssh_user: String,
    /// SSH port.
    pub ssh_port: u16,
    /// Pre-existing key pair name.
    pub key_pair_name: String,
    /// Private key matching `key_pair_name`.
    pub private_key_file: String,
    /// Bootstrap payload file.
    pub user_data_file: String,
    /// Raw bootstrap payload.
    pub user_data: Vec<u8>,
    /// Placement group name.
    pub server_group: String,
    /// Placement group identifier.
    pub server_group_id: String,
    /// Instance tags.
    pub tags: Vec<String>,
    /// Caller-supplied security group names.
    pub security_groups: Vec<String>,
    /// Name of the default group; empty when creation is disabled.
    pub default_security_group: String,
    /// Name of the fixed-port group; empty when creation is disabled.
    pub fixed_port_security_group: String,
}

/// Name of the security group opening SSH and the Docker port.
pub const DEFAULT_SECURITY_GROUP: &str = "docker-machine-grp";
/// Name of the security group opening the Kubernetes port table.
pub const FIXED_PORT_SECURITY_GROUP: &str = "sg-k8s";

/// Returns `legacy` when it is non-empty, otherwise `current`.
#[must_use]
pub fn prefer_legacy(legacy: String, current: String) -> String {
    if legacy.is_empty() { current } else { legacy }
}

/// Splits a comma-separated list, trimming entries and dropping blanks.
#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

fn narrow<T: TryFrom<i64>>(name: &str, value: i64, expected: &str) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| ConfigError::InvalidValue {
        name: name.to_owned(),
        expected: expected.to_owned(),
        value: value.to_string(),
    })
}

impl DriverConfig {
    /// Binds and validates configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an option has the wrong kind or the
    /// combination of options is invalid.
    pub fn from_options(options: &impl DriverOptions) -> Result<Self, ConfigError> {
        let config = Self::bind(options)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads every option without cross-field validation. Used when
    /// restoring a machine whose credentials live in its persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an option has the wrong kind.
    pub fn bind(options: &impl DriverOptions) -> Result<Self, ConfigError> {
        let auth = AuthOptions {
            cloud: options.string(flags::CLOUD)?,
            auth_url: options.string(flags::AUTH_URL)?,
            ca_cert: options.string(flags::CA_CERT)?,
            domain_id: options.string(flags::DOMAIN_ID)?,
            domain_name: options.string(flags::DOMAIN_NAME)?,
            username: options.string(flags::USERNAME)?,
            password: options.string(flags::PASSWORD)?,
            project_name: options.string(flags::PROJECT_NAME)?,
            project_id: prefer_legacy(
                options.string(flags::TENANT_ID)?,
                options.string(flags::PROJECT_ID)?,
            ),
            region: options.string(flags::REGION)?,
            access_key: options.string(flags::ACCESS_KEY_ID)?,
            secret_key: options.string(flags::ACCESS_KEY_SECRET)?,
            token: options.string(flags::TOKEN)?,
            endpoint_type: options.string(flags::ENDPOINT_TYPE)?,
        };

        let elastic_ip = ElasticIpOpts {
            ip_type: prefer_legacy(
                options.string(flags::ELASTIC_IP_TYPE)?,
                options.string(flags::FLOATING_IP_TYPE)?,
            ),
            bandwidth_size: narrow(
                flags::BANDWIDTH_SIZE,
                options.int(flags::BANDWIDTH_SIZE)?,
                "a positive bandwidth",
            )?,
            bandwidth_type: options.string(flags::BANDWIDTH_TYPE)?,
        };

        let root_volume = DiskOpts {
            source_id: options.string(flags::IMAGE_ID)?,
            size: narrow(
                flags::ROOT_VOLUME_SIZE,
                options.int(flags::ROOT_VOLUME_SIZE)?,
                "a volume size in GB",
            )?,
            volume_type: options.string(flags::ROOT_VOLUME_TYPE)?,
        };

        let default_security_group = if options.boolean(flags::SKIP_DEFAULT_SG)? {
            String::new()
        } else {
            DEFAULT_SECURITY_GROUP.to_owned()
        };
        let fixed_port_security_group = if options.boolean(flags::K8S_GROUP)? {
            FIXED_PORT_SECURITY_GROUP.to_owned()
        } else {
            String::new()
        };

        Ok(Self {
            auth,
            availability_zone: prefer_legacy(
                options.string(flags::AVAILABLE_ZONE)?,
                options.string(flags::AVAILABILITY_ZONE)?,
            ),
            flavor_id: options.string(flags::FLAVOR_ID)?,
            flavor_name: options.string(flags::FLAVOR_NAME)?,
            image_name: options.string(flags::IMAGE_NAME)?,
            root_volume,
            vpc_id: options.string(flags::VPC_ID)?,
            vpc_name: options.string(flags::VPC_NAME)?,
            subnet_id: options.string(flags::SUBNET_ID)?,
            subnet_name: options.string(flags::SUBNET_NAME)?,
            floating_ip: options.string(flags::FLOATING_IP)?,
            skip_floating_ip: options.int(flags::ELASTIC_IP)? == 0
                || options.boolean(flags::SKIP_IP)?,
            elastic_ip,
            ip_version: narrow(flags::IP_VERSION, options.int(flags::IP_VERSION)?, "4 or 6")?,
            ssh_user: options.string(flags::SSH_USER)?,
            ssh_port: narrow(flags::SSH_PORT, options.int(flags::SSH_PORT)?, "a TCP port")?,
            key_pair_name: options.string(flags::KEYPAIR_NAME)?,
            private_key_file: options.string(flags::PRIVATE_KEY_FILE)?,
            user_data_file: options.string(flags::USER_DATA_FILE)?,
            user_data: options.string(flags::USER_DATA_RAW)?.into_bytes(),
            server_group: options.string(flags::SERVER_GROUP)?,
            server_group_id: options.string(flags::SERVER_GROUP_ID)?,
            tags: split_list(&options.string(flags::TAGS)?),
            security_groups: split_list(&options.string(flags::SECURITY_GROUPS)?),
            default_security_group,
            fixed_port_security_group,
        })
    }

    /// Rejects configuration naming both an inline and a file bootstrap
    /// source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingOptions`] when both are set.
    pub fn check_user_data_sources(&self) -> Result<(), ConfigError> {
        if !self.user_data.is_empty() && !self.user_data_file.is_empty() {
            return Err(ConfigError::ConflictingOptions {
                first: flags::USER_DATA_RAW.to_owned(),
                second: flags::USER_DATA_FILE.to_owned(),
            });
        }
        Ok(())
    }

    /// Enforces cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IncompletePair`] when only one of key pair name
    /// and private key file is set, [`ConfigError::MissingAuth`] when no
    /// authentication method is configured and
    /// [`ConfigError::ConflictingOptions`] when both bootstrap sources are
    /// set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_pair_name.is_empty() != self.private_key_file.is_empty() {
            return Err(ConfigError::IncompletePair {
                first: flags::KEYPAIR_NAME.to_owned(),
                second: flags::PRIVATE_KEY_FILE.to_owned(),
            });
        }
        if self.auth.method().is_none() {
            return Err(ConfigError::MissingAuth);
        }
        self.check_user_data_sources()?;
        if !matches!(self.ip_version, 4 | 6) {
            return Err(ConfigError::InvalidValue {
                name: flags::IP_VERSION.to_owned(),
                expected: "4 or 6".to_owned(),
                value: self.ip_version.to_string(),
            });
        }
        Ok(())
    }
}

/// Process-wide settings that are not driver flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "OTC_MACHINE")]
pub struct RuntimeConfig {
    /// Root directory holding `machines/<name>/`.
    #[ortho_config(default = ".otc-machine".to_owned())]
    pub storage_path: String,
    /// Seconds between status polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Upper bound in seconds for a single wait.
    #[ortho_config(default = 600)]
    pub wait_timeout_secs: u64,
}

impl RuntimeConfig {
    /// Loads settings from defaults, configuration files and environment
    /// variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("otc-machine")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the wait cadence for provider polling.
    #[must_use]
    pub const fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: std::time::Duration::from_secs(self.poll_interval_secs),
            timeout: std::time::Duration::from_secs(self.wait_timeout_secs),
        }
    }
}
