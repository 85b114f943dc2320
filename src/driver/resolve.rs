//! Name to identifier resolution.
//!
//! Explicit identifiers always win. Network, subnet and placement group may
//! stay unresolved; flavor and image must resolve.

use tracing::debug;

use super::{Driver, DriverError};
use crate::keys::KeyStore;
use crate::managed::{ManagedResource, ResourceValue};
use crate::provider::{CloudConnector, CloudSession};

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    pub(super) async fn resolve_ids(&mut self, session: &C::Session) -> Result<(), DriverError> {
        self.resolve_vpc(session).await?;
        self.resolve_subnet(session).await?;
        self.resolve_flavor(session).await?;
        self.resolve_image(session).await?;
        self.resolve_security_groups(session).await?;
        self.resolve_server_group(session).await
    }

    async fn resolve_vpc(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if self.record.vpc.is_present() || self.config.vpc_name.is_empty() {
            return Ok(());
        }
        if let Some(id) = session
            .find_vpc(&self.config.vpc_name)
            .await?
            .filter(|id| !id.is_blank())
        {
            debug!(vpc_id = %id, name = %self.config.vpc_name, "resolved VPC");
            self.record.vpc = ManagedResource::existing(id);
        }
        Ok(())
    }

    async fn resolve_subnet(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if self.record.subnet.is_present()
            || self.config.subnet_name.is_empty()
            || !self.record.vpc.is_present()
        {
            return Ok(());
        }
        if let Some(id) = session
            .find_subnet(self.record.vpc.value(), &self.config.subnet_name)
            .await?
            .filter(|id| !id.is_blank())
        {
            debug!(subnet_id = %id, name = %self.config.subnet_name, "resolved subnet");
            self.record.subnet = ManagedResource::existing(id);
        }
        Ok(())
    }

    async fn resolve_flavor(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if !self.resolved.flavor_id.is_empty() || self.config.flavor_name.is_empty() {
            return Ok(());
        }
        let name = &self.config.flavor_name;
        let id = session
            .find_flavor(name)
            .await?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DriverError::not_found("flavor", name))?;
        debug!(flavor_id = %id, %name, "resolved flavor");
        self.resolved.flavor_id = id;
        Ok(())
    }

    async fn resolve_image(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if !self.resolved.image_id.is_empty() || self.config.image_name.is_empty() {
            return Ok(());
        }
        let name = &self.config.image_name;
        let id = session
            .find_image(name)
            .await?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DriverError::not_found("image", name))?;
        debug!(image_id = %id, %name, "resolved image");
        self.resolved.image_id = id;
        Ok(())
    }

    async fn resolve_security_groups(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if self.config.security_groups.is_empty() {
            return Ok(());
        }
        let ids = session
            .find_security_groups(&self.config.security_groups)
            .await?;
        debug!(
            requested = self.config.security_groups.len(),
            resolved = ids.len(),
            "resolved security groups"
        );
        self.resolved.security_groups = ids;
        Ok(())
    }

    async fn resolve_server_group(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if !self.resolved.server_group_id.is_empty() || self.config.server_group.is_empty() {
            return Ok(());
        }
        if let Some(id) = session
            .find_server_group(&self.config.server_group)
            .await?
            .filter(|id| !id.is_empty())
        {
            debug!(server_group_id = %id, name = %self.config.server_group, "resolved server group");
            self.resolved.server_group_id = id;
        }
        Ok(())
    }
}
