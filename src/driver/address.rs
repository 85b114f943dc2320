//! Public address selection: floating IP or the instance's own address.

use tracing::{info, warn};

use super::{Driver, DriverError};
use crate::keys::KeyStore;
use crate::managed::ManagedResource;
use crate::provider::{CloudConnector, CloudSession, address};

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    pub(super) async fn ensure_address(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if self.config.skip_floating_ip {
            self.use_local_address(session).await
        } else {
            self.ensure_floating_ip(session).await
        }
    }

    async fn ensure_floating_ip(&mut self, session: &C::Session) -> Result<(), DriverError> {
        let instance = self.require_instance()?;
        if !self.record.floating_ip.is_present() {
            let allocation = session.create_floating_ip(&self.config.elastic_ip).await?;
            info!(
                floating_ip = %allocation.address,
                allocation_id = %allocation.id,
                bandwidth = self.config.elastic_ip.bandwidth_size,
                "allocated floating IP"
            );
            self.record.floating_ip = ManagedResource::created(allocation.address);
            session.wait_for_floating_ip_active(&allocation.id).await?;
        }
        session
            .bind_floating_ip(self.record.floating_ip.value(), &instance)
            .await?;
        info!(floating_ip = %self.record.floating_ip.value(), instance_id = %instance, "bound floating IP");
        Ok(())
    }

    async fn use_local_address(&mut self, session: &C::Session) -> Result<(), DriverError> {
        let instance = self.require_instance()?;
        let details = session.get_instance(&instance).await?;
        match address::first_address(&details.addresses)? {
            Some(local) => {
                info!(address = %local, instance_id = %instance, "using instance address");
                self.record.floating_ip = ManagedResource::existing(local);
            }
            None => warn!(instance_id = %instance, "instance reports no addresses"),
        }
        Ok(())
    }
}
