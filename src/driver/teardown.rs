//! Reverse-order deletion of driver-managed resources.
//!
//! Every step runs even when an earlier one failed; failures are collected
//! into a [`TeardownError`]. A successfully removed resource is cleared from
//! the record so a retried `remove` skips it. A resource the provider no
//! longer knows counts as removed, so a retry after a failed deletion wait
//! converges.

use tracing::{debug, info, warn};

use super::{Driver, DriverError, TeardownError, TeardownFailure, TeardownStep};
use crate::keys::KeyStore;
use crate::managed::{InstanceId, ManagedResource, ResourceValue, SecurityGroupId};
use crate::provider::{CloudConnector, CloudSession, ProviderError, status};

/// Treats "already gone" as success.
fn tolerate_gone(result: Result<(), ProviderError>) -> Result<(), ProviderError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

async fn delete_group<S: CloudSession>(
    session: &S,
    slot: &mut ManagedResource<SecurityGroupId>,
) -> Result<(), ProviderError> {
    if !slot.needs_teardown() {
        return Ok(());
    }
    tolerate_gone(session.delete_security_group(slot.value()).await)?;
    tolerate_gone(session.wait_for_security_group_deleted(slot.value()).await)?;
    info!(security_group_id = %slot.value(), "deleted security group");
    slot.clear();
    Ok(())
}

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    /// Deletes every resource this driver created, in reverse creation
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the authentication error before any step runs, or
    /// [`DriverError::Teardown`] listing every failed step.
    pub async fn remove(&mut self) -> Result<(), DriverError> {
        info!(machine = %self.record.machine_name, "removing machine");
        let session = self.session().await?;
        let mut failures = Vec::new();
        for step in TeardownStep::ORDER {
            if let Err(error) = self.teardown_step(&session, step).await {
                warn!(%step, %error, "teardown step failed");
                failures.push(TeardownFailure { step, error });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError::new(failures).into())
        }
    }

    async fn teardown_step(
        &mut self,
        session: &C::Session,
        step: TeardownStep,
    ) -> Result<(), ProviderError> {
        match step {
            TeardownStep::Instance => self.delete_instance(session).await,
            TeardownStep::KeyPair => self.delete_key_pair(session).await,
            TeardownStep::FloatingIp => self.release_floating_ip(session).await,
            TeardownStep::Subnet => self.delete_subnet(session).await,
            TeardownStep::DefaultSecurityGroup => {
                delete_group(session, &mut self.record.default_security_group).await
            }
            TeardownStep::FixedPortSecurityGroup => {
                delete_group(session, &mut self.record.fixed_port_security_group).await
            }
            TeardownStep::Vpc => self.delete_vpc(session).await,
        }
    }

    async fn delete_instance(&mut self, session: &C::Session) -> Result<(), ProviderError> {
        let id = self.record.instance_id.clone();
        if id.is_blank() {
            debug!("no instance recorded");
            return Ok(());
        }
        tolerate_gone(session.delete_instance(&id).await)?;
        tolerate_gone(session.wait_for_instance_status(&id, status::DELETED).await)?;
        info!(instance_id = %id, "deleted instance");
        self.record.instance_id = InstanceId::default();
        Ok(())
    }

    async fn delete_key_pair(&mut self, session: &C::Session) -> Result<(), ProviderError> {
        if !self.record.key_pair.needs_teardown() {
            return Ok(());
        }
        tolerate_gone(session.delete_key_pair(self.record.key_pair.value()).await)?;
        info!(key_pair = %self.record.key_pair.value(), "deleted key pair");
        self.record.key_pair.clear();
        Ok(())
    }

    async fn release_floating_ip(&mut self, session: &C::Session) -> Result<(), ProviderError> {
        if !self.record.floating_ip.needs_teardown() {
            return Ok(());
        }
        tolerate_gone(
            session
                .release_floating_ip(self.record.floating_ip.value())
                .await,
        )?;
        info!(floating_ip = %self.record.floating_ip.value(), "released floating IP");
        self.record.floating_ip.clear();
        Ok(())
    }

    async fn delete_subnet(&mut self, session: &C::Session) -> Result<(), ProviderError> {
        if !self.record.subnet.needs_teardown() {
            return Ok(());
        }
        let subnet = self.record.subnet.value();
        tolerate_gone(session.delete_subnet(self.record.vpc.value(), subnet).await)?;
        tolerate_gone(
            session
                .wait_for_subnet_status(subnet, status::DELETED)
                .await,
        )?;
        info!(subnet_id = %subnet, "deleted subnet");
        self.record.subnet.clear();
        Ok(())
    }

    async fn delete_vpc(&mut self, session: &C::Session) -> Result<(), ProviderError> {
        if !self.record.vpc.needs_teardown() {
            return Ok(());
        }
        let vpc = self.record.vpc.value();
        tolerate_gone(session.delete_vpc(vpc).await)?;
        tolerate_gone(session.wait_for_vpc_status(vpc, status::DELETED).await)?;
        info!(vpc_id = %vpc, "deleted VPC");
        self.record.vpc.clear();
        Ok(())
    }
}
