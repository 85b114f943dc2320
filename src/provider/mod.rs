//! Cloud provider abstraction used by the driver.
//!
//! A [`CloudConnector`] turns authentication options into a
//! [`CloudSession`]; the session exposes the narrow set of network, compute
//! and key-pair calls the provisioning steps need. The production
//! implementation lives in [`crate::otc`], the scripted double in
//! [`crate::test_support`].

pub mod address;
mod error;
mod types;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::config::AuthOptions;
use crate::managed::{InstanceId, IpAddress, KeyPairName, SecurityGroupId, SubnetId, VpcId};

pub use error::ProviderError;
pub use types::{DiskOpts, ElasticIpOpts, FloatingIp, InstanceDetails, InstanceSpec, PortRange};

/// Provider status strings the driver waits for.
pub mod status {
    /// VPC ready.
    pub const VPC_READY: &str = "OK";
    /// Subnet ready.
    pub const SUBNET_READY: &str = "ACTIVE";
    /// Instance running.
    pub const INSTANCE_RUNNING: &str = "ACTIVE";
    /// Instance stopped.
    pub const INSTANCE_STOPPED: &str = "SHUTOFF";
    /// Target used when waiting for a resource to disappear.
    pub const DELETED: &str = "DELETED";
    /// Terminal failure status.
    pub const ERROR: &str = "ERROR";
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Polling cadence and deadline for provider waits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Upper bound on a single wait.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Produces authenticated sessions.
pub trait CloudConnector {
    /// Session handle returned after authentication.
    type Session: CloudSession + Clone + Send + Sync;

    /// Authenticates against the identity service.
    fn authenticate<'a>(&'a self, auth: &'a AuthOptions) -> ProviderFuture<'a, Self::Session>;
}

/// Authenticated provider handle.
///
/// Lookups return `Ok(None)` or an empty list when nothing matches. Waits
/// for deletion return [`ProviderError::NotFound`] once the resource is gone,
/// which callers treat as success.
pub trait CloudSession {
    /// Finds a VPC by name.
    fn find_vpc<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<VpcId>>;
    /// Creates a VPC.
    fn create_vpc<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, VpcId>;
    /// Polls a VPC until it reports `status`.
    fn wait_for_vpc_status<'a>(&'a self, id: &'a VpcId, status: &'a str)
    -> ProviderFuture<'a, ()>;
    /// Deletes a VPC.
    fn delete_vpc<'a>(&'a self, id: &'a VpcId) -> ProviderFuture<'a, ()>;

    /// Finds a subnet by name inside `vpc`.
    fn find_subnet<'a>(&'a self, vpc: &'a VpcId, name: &'a str)
    -> ProviderFuture<'a, Option<SubnetId>>;
    /// Creates a subnet inside `vpc`.
    fn create_subnet<'a>(&'a self, vpc: &'a VpcId, name: &'a str) -> ProviderFuture<'a, SubnetId>;
    /// Polls a subnet until it reports `status`.
    fn wait_for_subnet_status<'a>(
        &'a self,
        id: &'a SubnetId,
        status: &'a str,
    ) -> ProviderFuture<'a, ()>;
    /// Deletes a subnet.
    fn delete_subnet<'a>(&'a self, vpc: &'a VpcId, id: &'a SubnetId) -> ProviderFuture<'a, ()>;

    /// Resolves security group names to identifiers, skipping unknown names.
    fn find_security_groups<'a>(
        &'a self,
        names: &'a [String],
    ) -> ProviderFuture<'a, Vec<SecurityGroupId>>;
    /// Creates a security group with TCP ingress rules for `ports`.
    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        ports: &'a [PortRange],
    ) -> ProviderFuture<'a, SecurityGroupId>;
    /// Deletes a security group.
    fn delete_security_group<'a>(&'a self, id: &'a SecurityGroupId) -> ProviderFuture<'a, ()>;
    /// Polls until the security group no longer exists.
    fn wait_for_security_group_deleted<'a>(
        &'a self,
        id: &'a SecurityGroupId,
    ) -> ProviderFuture<'a, ()>;

    /// Finds a flavor by name.
    fn find_flavor<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>>;
    /// Finds an image by name.
    fn find_image<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>>;
    /// Finds a server group by name.
    fn find_server_group<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>>;

    /// Registers a public key under `name`.
    fn create_key_pair<'a>(
        &'a self,
        name: &'a KeyPairName,
        public_key: &'a str,
    ) -> ProviderFuture<'a, ()>;
    /// Returns the public half of a registered key pair.
    fn get_public_key<'a>(&'a self, name: &'a KeyPairName) -> ProviderFuture<'a, String>;
    /// Deletes a key pair.
    fn delete_key_pair<'a>(&'a self, name: &'a KeyPairName) -> ProviderFuture<'a, ()>;

    /// Creates an instance and returns its identifier.
    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, InstanceId>;
    /// Attaches string tags to an instance.
    fn add_tags<'a>(&'a self, id: &'a InstanceId, tags: &'a [String]) -> ProviderFuture<'a, ()>;
    /// Reads the current instance snapshot.
    fn get_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, InstanceDetails>;
    /// Polls an instance until it reports `status`.
    fn wait_for_instance_status<'a>(
        &'a self,
        id: &'a InstanceId,
        status: &'a str,
    ) -> ProviderFuture<'a, ()>;
    /// Powers an instance on.
    fn start_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()>;
    /// Powers an instance off.
    fn stop_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()>;
    /// Deletes an instance.
    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()>;

    /// Allocates a floating IP.
    fn create_floating_ip<'a>(&'a self, opts: &'a ElasticIpOpts)
    -> ProviderFuture<'a, FloatingIp>;
    /// Polls an allocation until it is usable.
    fn wait_for_floating_ip_active<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;
    /// Binds `address` to an instance; binding twice to the same instance
    /// succeeds.
    fn bind_floating_ip<'a>(
        &'a self,
        address: &'a IpAddress,
        instance: &'a InstanceId,
    ) -> ProviderFuture<'a, ()>;
    /// Releases the allocation holding `address`.
    fn release_floating_ip<'a>(&'a self, address: &'a IpAddress) -> ProviderFuture<'a, ()>;
}
