//! Persisted machine state and per-invocation resolved identifiers.

use serde::{Deserialize, Serialize};

use crate::config::{AuthOptions, DriverConfig};
use crate::flags::{DEFAULT_SSH_PORT, DEFAULT_SSH_USER};
use crate::managed::{
    InstanceId, IpAddress, KeyPairName, ManagedResource, SecurityGroupId, SubnetId, VpcId,
};

/// Everything that must survive between invocations for one machine.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct MachineRecord {
    /// Machine name; also the instance name.
    pub machine_name: String,
    /// Credentials reused by later commands.
    pub auth: AuthOptions,
    /// Instance identifier, blank until creation succeeds.
    pub instance_id: InstanceId,
    /// Key pair used for SSH.
    pub key_pair: ManagedResource<KeyPairName>,
    /// VPC the instance joins.
    pub vpc: ManagedResource<VpcId>,
    /// Subnet the instance joins.
    pub subnet: ManagedResource<SubnetId>,
    /// Group opening SSH and the Docker port.
    pub default_security_group: ManagedResource<SecurityGroupId>,
    /// Group opening the Kubernetes port table.
    pub fixed_port_security_group: ManagedResource<SecurityGroupId>,
    /// Public or local address of the machine.
    pub floating_ip: ManagedResource<IpAddress>,
    /// Private key used for SSH.
    pub private_key_file: String,
    /// SSH login.
    pub ssh_user: String,
    /// SSH port; zero means unset.
    pub ssh_port: u16,
}

impl MachineRecord {
    /// Seeds a fresh record from configuration. Caller-supplied identifiers
    /// are recorded as not driver-managed.
    #[must_use]
    pub fn seeded(machine_name: &str, config: &DriverConfig) -> Self {
        Self {
            machine_name: machine_name.to_owned(),
            auth: config.auth.clone(),
            instance_id: InstanceId::default(),
            key_pair: ManagedResource::existing(KeyPairName::new(config.key_pair_name.as_str())),
            vpc: ManagedResource::existing(VpcId::new(config.vpc_id.as_str())),
            subnet: ManagedResource::existing(SubnetId::new(config.subnet_id.as_str())),
            default_security_group: ManagedResource::absent(),
            fixed_port_security_group: ManagedResource::absent(),
            floating_ip: ManagedResource::existing(IpAddress::new(config.floating_ip.as_str())),
            private_key_file: config.private_key_file.clone(),
            ssh_user: config.ssh_user.clone(),
            ssh_port: config.ssh_port,
        }
    }

    /// SSH login, falling back to `ubuntu`.
    #[must_use]
    pub fn ssh_user_or_default(&self) -> &str {
        if self.ssh_user.is_empty() {
            DEFAULT_SSH_USER
        } else {
            &self.ssh_user
        }
    }

    /// SSH port, falling back to 22.
    #[must_use]
    pub const fn ssh_port_or_default(&self) -> u16 {
        if self.ssh_port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.ssh_port
        }
    }
}

/// Identifiers derived from names on each invocation; never persisted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvedIds {
    /// Flavor identifier.
    pub flavor_id: String,
    /// Image identifier.
    pub image_id: String,
    /// Caller-supplied security group identifiers.
    pub security_groups: Vec<SecurityGroupId>,
    /// Placement group identifier.
    pub server_group_id: String,
}

impl ResolvedIds {
    /// Starts from the identifiers given explicitly in configuration.
    #[must_use]
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            flavor_id: config.flavor_id.clone(),
            image_id: config.root_volume.source_id.clone(),
            security_groups: Vec::new(),
            server_group_id: config.server_group_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_record_marks_supplied_ids_unmanaged() {
        let config = DriverConfig {
            vpc_id: "vpc-7".to_owned(),
            subnet_id: "subnet-7".to_owned(),
            ..DriverConfig::default()
        };
        let record = MachineRecord::seeded("demo", &config);
        assert!(record.vpc.is_present());
        assert!(!record.vpc.needs_teardown());
        assert!(record.subnet.is_present());
        assert!(!record.key_pair.is_present());
    }

    #[test]
    fn persisted_shape_uses_value_and_managed_pairs() {
        let record = MachineRecord {
            machine_name: "demo".to_owned(),
            vpc: ManagedResource::created(VpcId::new("vpc-1")),
            ..MachineRecord::default()
        };
        let json = serde_json::to_value(&record).unwrap_or_else(|err| panic!("encode: {err}"));
        assert_eq!(
            json.get("vpc"),
            Some(&serde_json::json!({ "value": "vpc-1", "managed": true }))
        );
        assert_eq!(json.get("instance_id"), Some(&serde_json::json!("")));
    }

    #[test]
    fn ssh_defaults_apply_when_unset() {
        let record = MachineRecord::default();
        assert_eq!(record.ssh_user_or_default(), "ubuntu");
        assert_eq!(record.ssh_port_or_default(), 22);
    }
}
