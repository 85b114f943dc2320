//! Security groups created on behalf of the machine.

use tracing::info;

use super::{DOCKER_PORT, Driver, DriverError};
use crate::keys::KeyStore;
use crate::managed::{ManagedResource, SecurityGroupId};
use crate::provider::{CloudConnector, CloudSession, PortRange};

/// Ports opened by the fixed-port (Kubernetes) group.
pub const FIXED_PORT_RANGES: [PortRange; 4] = [
    PortRange::single(6443),
    PortRange::span(2379, 2380),
    PortRange::span(10250, 10252),
    PortRange::span(30000, 32767),
];

const fn default_group_ports(ssh_port: u16) -> [PortRange; 2] {
    [PortRange::single(ssh_port), PortRange::single(DOCKER_PORT)]
}

async fn ensure_group<S: CloudSession>(
    session: &S,
    slot: &mut ManagedResource<SecurityGroupId>,
    name: &str,
    ports: &[PortRange],
) -> Result<(), DriverError> {
    if slot.is_present() || name.is_empty() {
        return Ok(());
    }
    let id = session.create_security_group(name, ports).await?;
    info!(security_group_id = %id, %name, rules = ports.len(), "created security group");
    *slot = ManagedResource::created(id);
    Ok(())
}

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    pub(super) async fn ensure_security_groups(
        &mut self,
        session: &C::Session,
    ) -> Result<(), DriverError> {
        let default_ports = default_group_ports(self.record.ssh_port_or_default());
        ensure_group(
            session,
            &mut self.record.default_security_group,
            &self.config.default_security_group,
            &default_ports,
        )
        .await?;
        ensure_group(
            session,
            &mut self.record.fixed_port_security_group,
            &self.config.fixed_port_security_group,
            &FIXED_PORT_RANGES,
        )
        .await
    }

    /// Caller-supplied groups first, then the default and fixed-port groups.
    pub(super) fn instance_security_groups(&self) -> Vec<SecurityGroupId> {
        self.resolved
            .security_groups
            .iter()
            .chain(
                [
                    &self.record.default_security_group,
                    &self.record.fixed_port_security_group,
                ]
                .into_iter()
                .filter(|group| group.is_present())
                .map(ManagedResource::value),
            )
            .cloned()
            .collect()
    }
}
