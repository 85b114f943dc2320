//! VPC and subnet provisioning.

use tracing::{debug, info};

use super::{Driver, DriverError};
use crate::keys::KeyStore;
use crate::managed::ManagedResource;
use crate::provider::{CloudConnector, CloudSession, status};

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    pub(super) async fn ensure_vpc(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if self.record.vpc.is_present() {
            debug!(vpc_id = %self.record.vpc.value(), managed = self.record.vpc.is_driver_managed(), "VPC already recorded");
            return Ok(());
        }
        let id = session.create_vpc(&self.config.vpc_name).await?;
        info!(vpc_id = %id, name = %self.config.vpc_name, "created VPC");
        self.record.vpc = ManagedResource::created(id);
        session
            .wait_for_vpc_status(self.record.vpc.value(), status::VPC_READY)
            .await?;
        Ok(())
    }

    pub(super) async fn ensure_subnet(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if self.record.subnet.is_present() {
            debug!(subnet_id = %self.record.subnet.value(), managed = self.record.subnet.is_driver_managed(), "subnet already recorded");
            return Ok(());
        }
        let id = session
            .create_subnet(self.record.vpc.value(), &self.config.subnet_name)
            .await?;
        info!(subnet_id = %id, vpc_id = %self.record.vpc.value(), name = %self.config.subnet_name, "created subnet");
        self.record.subnet = ManagedResource::created(id);
        session
            .wait_for_subnet_status(self.record.subnet.value(), status::SUBNET_READY)
            .await?;
        Ok(())
    }
}
