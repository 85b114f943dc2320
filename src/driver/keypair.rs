//! SSH key pair acquisition: import a named key pair or generate one.

use camino::Utf8Path;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Driver, DriverError};
use crate::keys::KeyStore;
use crate::managed::{KeyPairName, ManagedResource};
use crate::provider::{CloudConnector, CloudSession};

const RANDOM_SUFFIX_LEN: usize = 8;

/// Builds the provider key pair name for a generated key. Dots are not
/// accepted in key pair names, so they become underscores.
#[must_use]
pub fn generated_key_pair_name(machine_name: &str, suffix: &str) -> KeyPairName {
    KeyPairName::new(format!("{machine_name}-{suffix}").replace('.', "_"))
}

impl<C: CloudConnector, K: KeyStore> Driver<C, K> {
    pub(super) async fn acquire_key_pair(&mut self, session: &C::Session) -> Result<(), DriverError> {
        if self.record.key_pair.needs_teardown() {
            debug!(key_pair = %self.record.key_pair.value(), "key pair already generated");
            return Ok(());
        }
        if self.record.key_pair.is_present() {
            self.import_key_pair(session).await
        } else {
            self.generate_key_pair(session).await
        }
    }

    async fn import_key_pair(&self, session: &C::Session) -> Result<(), DriverError> {
        let name = self.record.key_pair.value();
        let private_key = self
            .keys
            .read_private_key(Utf8Path::new(&self.record.private_key_file))?;
        let public_key = session.get_public_key(name).await?;
        let key_path = self.ssh_key_path();
        self.keys
            .write_key_pair(&key_path, &private_key, public_key.as_bytes())?;
        info!(key_pair = %name, path = %key_path, "imported key pair");
        Ok(())
    }

    async fn generate_key_pair(&mut self, session: &C::Session) -> Result<(), DriverError> {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(RANDOM_SUFFIX_LEN)
            .collect();
        let name = generated_key_pair_name(&self.record.machine_name, &suffix);
        let key_path = self.ssh_key_path();
        let public_key = self.keys.generate(&key_path)?;
        session.create_key_pair(&name, &public_key).await?;
        info!(key_pair = %name, path = %key_path, "registered generated key pair");
        self.record.key_pair = ManagedResource::created(name);
        self.record.private_key_file = key_path.into_string();
        Ok(())
    }
}
