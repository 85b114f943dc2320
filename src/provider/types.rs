//! Request and response shapes exchanged with a cloud session.

use serde::{Deserialize, Serialize};

use crate::managed::{InstanceId, IpAddress, KeyPairName, SecurityGroupId, SubnetId, VpcId};

/// Inclusive TCP port range for an ingress rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PortRange {
    from: u16,
    to: Option<u16>,
}

impl PortRange {
    /// Opens exactly one port.
    #[must_use]
    pub const fn single(port: u16) -> Self {
        Self {
            from: port,
            to: None,
        }
    }

    /// Opens `from..=to`.
    #[must_use]
    pub const fn span(from: u16, to: u16) -> Self {
        Self { from, to: Some(to) }
    }

    /// Returns the inclusive `(min, max)` bounds.
    #[must_use]
    pub const fn bounds(self) -> (u16, u16) {
        match self.to {
            Some(to) => (self.from, to),
            None => (self.from, self.from),
        }
    }
}

/// Root disk definition.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DiskOpts {
    /// Image the disk is created from.
    pub source_id: String,
    /// Size in GB.
    pub size: u32,
    /// Volume type, for example `SSD`.
    pub volume_type: String,
}

/// Allocation parameters for an elastic IP.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ElasticIpOpts {
    /// Address type, for example `5_bgp`.
    pub ip_type: String,
    /// Bandwidth in Mbit/s.
    pub bandwidth_size: u32,
    /// Bandwidth share type, for example `PER`.
    pub bandwidth_type: String,
}

/// Everything needed to create one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Instance name, equal to the machine name.
    pub name: String,
    /// Resolved flavor identifier.
    pub flavor_id: String,
    /// Availability zone.
    pub availability_zone: String,
    /// Security groups, caller-supplied first.
    pub security_groups: Vec<SecurityGroupId>,
    /// Network the instance joins.
    pub vpc_id: VpcId,
    /// Subnet the instance joins.
    pub subnet_id: SubnetId,
    /// Key pair injected for SSH.
    pub key_pair: KeyPairName,
    /// Boot disk.
    pub root_volume: DiskOpts,
    /// Optional placement group.
    pub server_group_id: Option<String>,
    /// Optional bootstrap payload, raw bytes.
    pub user_data: Option<Vec<u8>>,
}

/// An allocated floating IP.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FloatingIp {
    /// Provider identifier of the allocation.
    pub id: String,
    /// Public address.
    pub address: IpAddress,
}

/// Snapshot of an instance as reported by the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceDetails {
    /// Identifier of the instance.
    pub id: InstanceId,
    /// Raw provider status, for example `ACTIVE`.
    pub status: String,
    /// Raw address payload keyed by pool name; decode with
    /// [`super::address::decode_pools`].
    pub addresses: serde_json::Value,
    /// Names of attached security groups.
    pub security_groups: Vec<String>,
}
