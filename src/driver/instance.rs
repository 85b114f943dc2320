//! Instance creation.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::{debug, info};

use super::{Driver, DriverError};
use crate::keys::KeyStore;
use crate::managed::ResourceValue;
use crate::provider::{CloudConnector, CloudSession, DiskOpts, InstanceSpec, status};

fn read_user_data_file(path: &str) -> Result<Vec<u8>, DriverError> {
    let failure = |message: String| DriverError::UserData {
        path: path.to_owned(),
        message,
    };
    let file = Utf8Path::new(path);
    let file_name = file
        .file_name()
        .ok_or_else(|| failure("path has no file name".to_owned()))?;
    let parent = file
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| failure(err.to_string()))?;
    dir.read(file_name).map_err(|err| failure(err.to_string()))
}

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    pub(super) async fn ensure_instance(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if !self.record.instance_id.is_blank() {
            debug!(instance_id = %self.record.instance_id, "instance already recorded");
            return Ok(());
        }
        let spec = self.instance_spec()?;
        let id = session.create_instance(&spec).await?;
        info!(
            instance_id = %id,
            name = %spec.name,
            flavor_id = %spec.flavor_id,
            security_groups = spec.security_groups.len(),
            "created instance"
        );
        self.record.instance_id = id.clone();
        if !self.config.tags.is_empty() {
            session.add_tags(&id, &self.config.tags).await?;
        }
        session
            .wait_for_instance_status(&id, status::INSTANCE_RUNNING)
            .await?;
        Ok(())
    }

    fn user_data(&self) -> Result<Option<Vec<u8>>, DriverError> {
        self.config.check_user_data_sources()?;
        if !self.config.user_data.is_empty() {
            return Ok(Some(self.config.user_data.clone()));
        }
        if self.config.user_data_file.is_empty() {
            return Ok(None);
        }
        read_user_data_file(&self.config.user_data_file).map(Some)
    }

    fn instance_spec(&self) -> Result<InstanceSpec, DriverError> {
        Ok(InstanceSpec {
            name: self.record.machine_name.clone(),
            flavor_id: self.resolved.flavor_id.clone(),
            availability_zone: self.config.availability_zone.clone(),
            security_groups: self.instance_security_groups(),
            vpc_id: self.record.vpc.value().clone(),
            subnet_id: self.record.subnet.value().clone(),
            key_pair: self.record.key_pair.value().clone(),
            root_volume: DiskOpts {
                source_id: self.resolved.image_id.clone(),
                size: self.config.root_volume.size,
                volume_type: self.config.root_volume.volume_type.clone(),
            },
            server_group_id: Some(self.resolved.server_group_id.clone())
                .filter(|id| !id.is_empty()),
            user_data: self.user_data()?,
        })
    }
}
