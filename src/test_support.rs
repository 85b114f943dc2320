//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCloud`] is an in-memory provider that records every call and can be
//! told to fail specific operations. [`MemoryKeyStore`] keeps key files in a
//! map instead of on disk. [`ScriptedRunner`] replays queued command outputs.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;

use crate::command::{CommandOutput, CommandRunner, SpawnError};
use crate::config::AuthOptions;
use crate::flags::{DEFAULT_FLAVOR_NAME, DEFAULT_IMAGE_NAME};
use crate::keys::{KeyStore, KeyStoreError, public_key_path};
use crate::managed::{InstanceId, IpAddress, KeyPairName, SecurityGroupId, SubnetId, VpcId};
use crate::provider::{
    CloudConnector, CloudSession, ElasticIpOpts, FloatingIp, InstanceDetails, InstanceSpec,
    PortRange, ProviderError, ProviderFuture, status,
};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| SpawnError {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Flavor identifier [`FakeCloud::new`] registers under the default flavor
/// name.
pub const FAKE_FLAVOR_ID: &str = "flavor-default";
/// Image identifier [`FakeCloud::new`] registers under the default image
/// name.
pub const FAKE_IMAGE_ID: &str = "image-default";

/// Operations recorded by [`FakeCloud`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[expect(missing_docs, reason = "variants mirror CloudSession method names")]
pub enum FakeOperation {
    Authenticate,
    FindVpc,
    CreateVpc,
    WaitVpc,
    DeleteVpc,
    FindSubnet,
    CreateSubnet,
    WaitSubnet,
    DeleteSubnet,
    FindSecurityGroups,
    CreateSecurityGroup,
    DeleteSecurityGroup,
    WaitSecurityGroupDeleted,
    FindFlavor,
    FindImage,
    FindServerGroup,
    CreateKeyPair,
    GetPublicKey,
    DeleteKeyPair,
    CreateInstance,
    AddTags,
    GetInstance,
    WaitInstance,
    StartInstance,
    StopInstance,
    DeleteInstance,
    CreateFloatingIp,
    WaitFloatingIp,
    BindFloatingIp,
    ReleaseFloatingIp,
}

impl FakeOperation {
    /// Returns `true` for calls that change provider state.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::CreateVpc
                | Self::DeleteVpc
                | Self::CreateSubnet
                | Self::DeleteSubnet
                | Self::CreateSecurityGroup
                | Self::DeleteSecurityGroup
                | Self::CreateKeyPair
                | Self::DeleteKeyPair
                | Self::CreateInstance
                | Self::AddTags
                | Self::StartInstance
                | Self::StopInstance
                | Self::DeleteInstance
                | Self::CreateFloatingIp
                | Self::BindFloatingIp
                | Self::ReleaseFloatingIp
        )
    }
}

/// One recorded call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FakeCall {
    /// Operation invoked.
    pub operation: FakeOperation,
    /// Name or identifier the call addressed.
    pub target: String,
}

/// Identifiers currently held by a [`FakeCloud`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Inventory {
    /// VPC identifiers.
    pub vpcs: Vec<String>,
    /// Subnet identifiers.
    pub subnets: Vec<String>,
    /// Security group identifiers.
    pub security_groups: Vec<String>,
    /// Key pair names.
    pub key_pairs: Vec<String>,
    /// Instance identifiers.
    pub instances: Vec<String>,
    /// Allocated floating addresses.
    pub floating_ips: Vec<String>,
}

#[derive(Debug)]
struct FakeInstance {
    spec: InstanceSpec,
    status: String,
    tags: Vec<String>,
    addresses: serde_json::Value,
}

#[derive(Debug)]
struct FakeAllocation {
    id: String,
    bound_to: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u32,
    next_host: u8,
    vpcs: BTreeMap<String, String>,
    subnets: BTreeMap<String, (String, String)>,
    security_groups: BTreeMap<String, (String, Vec<PortRange>)>,
    flavors: BTreeMap<String, String>,
    images: BTreeMap<String, String>,
    server_groups: BTreeMap<String, String>,
    key_pairs: BTreeMap<String, String>,
    instances: BTreeMap<String, FakeInstance>,
    floating_ips: BTreeMap<String, FakeAllocation>,
    instance_addresses: Option<serde_json::Value>,
    failures: BTreeSet<FakeOperation>,
    calls: Vec<FakeCall>,
}

impl FakeState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn instance_mut(&mut self, id: &str) -> Result<&mut FakeInstance, ProviderError> {
        self.instances
            .get_mut(id)
            .ok_or_else(|| ProviderError::not_found("instance", id))
    }
}

fn wait_outcome(kind: &str, id: &str, current: Option<&str>, target: &str) -> Result<(), ProviderError> {
    match current {
        None => Err(ProviderError::not_found(kind, id)),
        Some(_) if target == status::DELETED => Err(ProviderError::Timeout {
            kind: kind.to_owned(),
            id: id.to_owned(),
            status: target.to_owned(),
        }),
        Some(current) if current == target => Ok(()),
        Some(current) if current == status::ERROR => Err(ProviderError::FailedStatus {
            kind: kind.to_owned(),
            id: id.to_owned(),
            status: current.to_owned(),
        }),
        Some(_) => Err(ProviderError::Timeout {
            kind: kind.to_owned(),
            id: id.to_owned(),
            status: target.to_owned(),
        }),
    }
}

fn respond<'a, T: Send + 'a>(result: Result<T, ProviderError>) -> ProviderFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

/// In-memory cloud implementing both [`CloudConnector`] and
/// [`CloudSession`]. Clones share state.
///
/// Created resources reach their target status immediately. Deleted
/// resources disappear, so deletion waits report
/// [`ProviderError::NotFound`].
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCloud {
    /// Creates a cloud that knows the default flavor and image names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
            .with_flavor(DEFAULT_FLAVOR_NAME, FAKE_FLAVOR_ID)
            .with_image(DEFAULT_IMAGE_NAME, FAKE_IMAGE_ID)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply<T>(
        &self,
        operation: FakeOperation,
        target: &str,
        action: impl FnOnce(&mut FakeState) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut state = self.lock();
        state.calls.push(FakeCall {
            operation,
            target: target.to_owned(),
        });
        if state.failures.contains(&operation) {
            return Err(ProviderError::Api {
                operation: format!("{operation:?}"),
                status: 500,
                message: String::from("injected failure"),
            });
        }
        action(&mut state)
    }

    /// Registers an existing VPC.
    #[must_use]
    pub fn with_vpc(self, id: &str, name: &str) -> Self {
        self.lock().vpcs.insert(id.to_owned(), name.to_owned());
        self
    }

    /// Registers an existing subnet inside `vpc`.
    #[must_use]
    pub fn with_subnet(self, vpc: &str, id: &str, name: &str) -> Self {
        self.lock()
            .subnets
            .insert(id.to_owned(), (vpc.to_owned(), name.to_owned()));
        self
    }

    /// Registers an existing security group.
    #[must_use]
    pub fn with_security_group(self, id: &str, name: &str) -> Self {
        self.lock()
            .security_groups
            .insert(id.to_owned(), (name.to_owned(), Vec::new()));
        self
    }

    /// Registers a flavor name.
    #[must_use]
    pub fn with_flavor(self, name: &str, id: &str) -> Self {
        self.lock().flavors.insert(name.to_owned(), id.to_owned());
        self
    }

    /// Registers an image name.
    #[must_use]
    pub fn with_image(self, name: &str, id: &str) -> Self {
        self.lock().images.insert(name.to_owned(), id.to_owned());
        self
    }

    /// Registers a server group name.
    #[must_use]
    pub fn with_server_group(self, name: &str, id: &str) -> Self {
        self.lock()
            .server_groups
            .insert(name.to_owned(), id.to_owned());
        self
    }

    /// Registers an existing key pair.
    #[must_use]
    pub fn with_key_pair(self, name: &str, public_key: &str) -> Self {
        self.lock()
            .key_pairs
            .insert(name.to_owned(), public_key.to_owned());
        self
    }

    /// Registers an allocated, unbound floating IP.
    #[must_use]
    pub fn with_floating_ip(self, address: &str) -> Self {
        self.lock().floating_ips.insert(
            address.to_owned(),
            FakeAllocation {
                id: format!("fip-{address}"),
                bound_to: None,
            },
        );
        self
    }

    /// Makes every later call to `operation` fail with an API error.
    pub fn fail_on(&self, operation: FakeOperation) {
        self.lock().failures.insert(operation);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Address payload reported by instances created after this call.
    pub fn set_instance_addresses(&self, addresses: serde_json::Value) {
        self.lock().instance_addresses = Some(addresses);
    }

    /// Overrides the status of an existing instance.
    pub fn set_instance_status(&self, id: &str, status: &str) {
        if let Some(instance) = self.lock().instances.get_mut(id) {
            instance.status = status.to_owned();
        }
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// Calls that changed provider state.
    #[must_use]
    pub fn write_calls(&self) -> Vec<FakeCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation.is_write())
            .collect()
    }

    /// Number of calls made to `operation`.
    #[must_use]
    pub fn count(&self, operation: FakeOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Snapshot of live resources.
    #[must_use]
    pub fn inventory(&self) -> Inventory {
        let state = self.lock();
        Inventory {
            vpcs: state.vpcs.keys().cloned().collect(),
            subnets: state.subnets.keys().cloned().collect(),
            security_groups: state.security_groups.keys().cloned().collect(),
            key_pairs: state.key_pairs.keys().cloned().collect(),
            instances: state.instances.keys().cloned().collect(),
            floating_ips: state.floating_ips.keys().cloned().collect(),
        }
    }

    /// Ingress rules of a security group.
    #[must_use]
    pub fn security_group_rules(&self, id: &str) -> Option<Vec<PortRange>> {
        self.lock()
            .security_groups
            .get(id)
            .map(|(_, rules)| rules.clone())
    }

    /// Name of a security group.
    #[must_use]
    pub fn security_group_name(&self, id: &str) -> Option<String> {
        self.lock()
            .security_groups
            .get(id)
            .map(|(name, _)| name.clone())
    }

    /// Request an instance was created from.
    #[must_use]
    pub fn instance_spec(&self, id: &str) -> Option<InstanceSpec> {
        self.lock()
            .instances
            .get(id)
            .map(|instance| instance.spec.clone())
    }

    /// Current status of an instance.
    #[must_use]
    pub fn instance_status(&self, id: &str) -> Option<String> {
        self.lock()
            .instances
            .get(id)
            .map(|instance| instance.status.clone())
    }

    /// Tags attached to an instance.
    #[must_use]
    pub fn instance_tags(&self, id: &str) -> Vec<String> {
        self.lock()
            .instances
            .get(id)
            .map(|instance| instance.tags.clone())
            .unwrap_or_default()
    }

    /// Instance a floating address is bound to.
    #[must_use]
    pub fn floating_ip_binding(&self, address: &str) -> Option<String> {
        self.lock()
            .floating_ips
            .get(address)
            .and_then(|allocation| allocation.bound_to.clone())
    }
}

impl CloudConnector for FakeCloud {
    type Session = Self;

    fn authenticate<'a>(&'a self, auth: &'a AuthOptions) -> ProviderFuture<'a, Self::Session> {
        respond(
            self.apply(FakeOperation::Authenticate, &auth.auth_url, |_| Ok(()))
                .map_err(|err| ProviderError::Authentication {
                    message: err.to_string(),
                })
                .map(|()| self.clone()),
        )
    }
}

impl CloudSession for FakeCloud {
    fn find_vpc<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<VpcId>> {
        respond(self.apply(FakeOperation::FindVpc, name, |state| {
            Ok(state
                .vpcs
                .iter()
                .find(|(_, vpc_name)| vpc_name.as_str() == name)
                .map(|(id, _)| VpcId::new(id.as_str())))
        }))
    }

    fn create_vpc<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, VpcId> {
        respond(self.apply(FakeOperation::CreateVpc, name, |state| {
            let id = state.allocate_id("vpc");
            state.vpcs.insert(id.clone(), name.to_owned());
            Ok(VpcId::new(id))
        }))
    }

    fn wait_for_vpc_status<'a>(&'a self, id: &'a VpcId, status: &'a str) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::WaitVpc, id, |state| {
            let current = state.vpcs.contains_key(id.as_str()).then_some(status::VPC_READY);
            wait_outcome("vpc", id, current, status)
        }))
    }

    fn delete_vpc<'a>(&'a self, id: &'a VpcId) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::DeleteVpc, id, |state| {
            state
                .vpcs
                .remove(id.as_str())
                .map(drop)
                .ok_or_else(|| ProviderError::not_found("vpc", id))
        }))
    }

    fn find_subnet<'a>(&'a self, vpc: &'a VpcId, name: &'a str) -> ProviderFuture<'a, Option<SubnetId>> {
        respond(self.apply(FakeOperation::FindSubnet, name, |state| {
            Ok(state
                .subnets
                .iter()
                .find(|(_, (owner, subnet_name))| {
                    owner.as_str() == vpc.as_str() && subnet_name.as_str() == name
                })
                .map(|(id, _)| SubnetId::new(id.as_str())))
        }))
    }

    fn create_subnet<'a>(&'a self, vpc: &'a VpcId, name: &'a str) -> ProviderFuture<'a, SubnetId> {
        respond(self.apply(FakeOperation::CreateSubnet, name, |state| {
            if !state.vpcs.contains_key(vpc.as_str()) {
                return Err(ProviderError::not_found("vpc", vpc));
            }
            let id = state.allocate_id("subnet");
            state
                .subnets
                .insert(id.clone(), (vpc.to_string(), name.to_owned()));
            Ok(SubnetId::new(id))
        }))
    }

    fn wait_for_subnet_status<'a>(
        &'a self,
        id: &'a SubnetId,
        status: &'a str,
    ) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::WaitSubnet, id, |state| {
            let current = state
                .subnets
                .contains_key(id.as_str())
                .then_some(status::SUBNET_READY);
            wait_outcome("subnet", id, current, status)
        }))
    }

    fn delete_subnet<'a>(&'a self, _vpc: &'a VpcId, id: &'a SubnetId) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::DeleteSubnet, id, |state| {
            state
                .subnets
                .remove(id.as_str())
                .map(drop)
                .ok_or_else(|| ProviderError::not_found("subnet", id))
        }))
    }

    fn find_security_groups<'a>(
        &'a self,
        names: &'a [String],
    ) -> ProviderFuture<'a, Vec<SecurityGroupId>> {
        respond(
            self.apply(FakeOperation::FindSecurityGroups, &names.join(","), |state| {
                Ok(names
                    .iter()
                    .filter_map(|wanted| {
                        state
                            .security_groups
                            .iter()
                            .find(|(_, (name, _))| name == wanted)
                            .map(|(id, _)| SecurityGroupId::new(id.as_str()))
                    })
                    .collect())
            }),
        )
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        ports: &'a [PortRange],
    ) -> ProviderFuture<'a, SecurityGroupId> {
        respond(self.apply(FakeOperation::CreateSecurityGroup, name, |state| {
            let id = state.allocate_id("sg");
            state
                .security_groups
                .insert(id.clone(), (name.to_owned(), ports.to_vec()));
            Ok(SecurityGroupId::new(id))
        }))
    }

    fn delete_security_group<'a>(&'a self, id: &'a SecurityGroupId) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::DeleteSecurityGroup, id, |state| {
            state
                .security_groups
                .remove(id.as_str())
                .map(drop)
                .ok_or_else(|| ProviderError::not_found("security group", id))
        }))
    }

    fn wait_for_security_group_deleted<'a>(
        &'a self,
        id: &'a SecurityGroupId,
    ) -> ProviderFuture<'a, ()> {
        respond(
            self.apply(FakeOperation::WaitSecurityGroupDeleted, id, |state| {
                let current = state
                    .security_groups
                    .contains_key(id.as_str())
                    .then_some("ACTIVE");
                wait_outcome("security group", id, current, status::DELETED)
            }),
        )
    }

    fn find_flavor<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>> {
        respond(self.apply(FakeOperation::FindFlavor, name, |state| {
            Ok(state.flavors.get(name).cloned())
        }))
    }

    fn find_image<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>> {
        respond(self.apply(FakeOperation::FindImage, name, |state| {
            Ok(state.images.get(name).cloned())
        }))
    }

    fn find_server_group<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>> {
        respond(self.apply(FakeOperation::FindServerGroup, name, |state| {
            Ok(state.server_groups.get(name).cloned())
        }))
    }

    fn create_key_pair<'a>(
        &'a self,
        name: &'a KeyPairName,
        public_key: &'a str,
    ) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::CreateKeyPair, name, |state| {
            if state.key_pairs.contains_key(name.as_str()) {
                return Err(ProviderError::Api {
                    operation: String::from("create key pair"),
                    status: 409,
                    message: format!("key pair {name} already exists"),
                });
            }
            state
                .key_pairs
                .insert(name.to_string(), public_key.to_owned());
            Ok(())
        }))
    }

    fn get_public_key<'a>(&'a self, name: &'a KeyPairName) -> ProviderFuture<'a, String> {
        respond(self.apply(FakeOperation::GetPublicKey, name, |state| {
            state
                .key_pairs
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| ProviderError::not_found("key pair", name))
        }))
    }

    fn delete_key_pair<'a>(&'a self, name: &'a KeyPairName) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::DeleteKeyPair, name, |state| {
            state
                .key_pairs
                .remove(name.as_str())
                .map(drop)
                .ok_or_else(|| ProviderError::not_found("key pair", name))
        }))
    }

    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, InstanceId> {
        respond(self.apply(FakeOperation::CreateInstance, &spec.name, |state| {
            let id = state.allocate_id("instance");
            state.next_host += 1;
            let host = format!("192.168.0.{}", 10 + u16::from(state.next_host));
            let addresses = state.instance_addresses.clone().unwrap_or_else(|| {
                let mut pools = serde_json::Map::new();
                pools.insert(
                    spec.subnet_id.to_string(),
                    json!([{ "addr": host, "version": 4 }]),
                );
                serde_json::Value::Object(pools)
            });
            state.instances.insert(
                id.clone(),
                FakeInstance {
                    spec: spec.clone(),
                    status: status::INSTANCE_RUNNING.to_owned(),
                    tags: Vec::new(),
                    addresses,
                },
            );
            Ok(InstanceId::new(id))
        }))
    }

    fn add_tags<'a>(&'a self, id: &'a InstanceId, tags: &'a [String]) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::AddTags, id, |state| {
            state.instance_mut(id)?.tags.extend_from_slice(tags);
            Ok(())
        }))
    }

    fn get_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, InstanceDetails> {
        respond(self.apply(FakeOperation::GetInstance, id, |state| {
            let instance = state.instance_mut(id)?;
            Ok(InstanceDetails {
                id: id.clone(),
                status: instance.status.clone(),
                addresses: instance.addresses.clone(),
                security_groups: instance
                    .spec
                    .security_groups
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            })
        }))
    }

    fn wait_for_instance_status<'a>(
        &'a self,
        id: &'a InstanceId,
        status: &'a str,
    ) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::WaitInstance, id, |state| {
            let current = state
                .instances
                .get(id.as_str())
                .map(|instance| instance.status.as_str());
            wait_outcome("instance", id, current, status)
        }))
    }

    fn start_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::StartInstance, id, |state| {
            state.instance_mut(id)?.status = status::INSTANCE_RUNNING.to_owned();
            Ok(())
        }))
    }

    fn stop_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::StopInstance, id, |state| {
            state.instance_mut(id)?.status = status::INSTANCE_STOPPED.to_owned();
            Ok(())
        }))
    }

    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::DeleteInstance, id, |state| {
            state
                .instances
                .remove(id.as_str())
                .map(drop)
                .ok_or_else(|| ProviderError::not_found("instance", id))
        }))
    }

    fn create_floating_ip<'a>(&'a self, opts: &'a ElasticIpOpts) -> ProviderFuture<'a, FloatingIp> {
        respond(
            self.apply(FakeOperation::CreateFloatingIp, &opts.ip_type, |state| {
                let id = state.allocate_id("eip");
                let address = format!("203.0.113.{}", 5 + state.floating_ips.len());
                state.floating_ips.insert(
                    address.clone(),
                    FakeAllocation {
                        id: id.clone(),
                        bound_to: None,
                    },
                );
                Ok(FloatingIp {
                    id,
                    address: IpAddress::new(address),
                })
            }),
        )
    }

    fn wait_for_floating_ip_active<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::WaitFloatingIp, id, |state| {
            if state.floating_ips.values().any(|allocation| allocation.id == id) {
                Ok(())
            } else {
                Err(ProviderError::not_found("floating ip", id))
            }
        }))
    }

    fn bind_floating_ip<'a>(
        &'a self,
        address: &'a IpAddress,
        instance: &'a InstanceId,
    ) -> ProviderFuture<'a, ()> {
        respond(self.apply(FakeOperation::BindFloatingIp, address, |state| {
            if !state.instances.contains_key(instance.as_str()) {
                return Err(ProviderError::not_found("instance", instance));
            }
            let allocation = state
                .floating_ips
                .get_mut(address.as_str())
                .ok_or_else(|| ProviderError::not_found("floating ip", address))?;
            match &allocation.bound_to {
                Some(bound) if bound.as_str() != instance.as_str() => Err(ProviderError::Api {
                    operation: String::from("bind floating ip"),
                    status: 409,
                    message: format!("{address} is bound to {bound}"),
                }),
                _ => {
                    allocation.bound_to = Some(instance.to_string());
                    Ok(())
                }
            }
        }))
    }

    fn release_floating_ip<'a>(&'a self, address: &'a IpAddress) -> ProviderFuture<'a, ()> {
        respond(
            self.apply(FakeOperation::ReleaseFloatingIp, address, |state| {
                state
                    .floating_ips
                    .remove(address.as_str())
                    .map(drop)
                    .ok_or_else(|| ProviderError::not_found("floating ip", address))
            }),
        )
    }
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: BTreeMap<Utf8PathBuf, Vec<u8>>,
    generated: Vec<Utf8PathBuf>,
    fail_generation: bool,
}

/// [`KeyStore`] backed by a map of paths to contents. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyStore {
    inner: Arc<Mutex<MemoryFiles>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFiles> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a file.
    #[must_use]
    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.lock()
            .files
            .insert(Utf8PathBuf::from(path), contents.to_vec());
        self
    }

    /// Makes later [`KeyStore::generate`] calls fail.
    pub fn fail_generation(&self) {
        self.lock().fail_generation = true;
    }

    /// Returns the contents stored at `path`.
    #[must_use]
    pub fn file(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    /// Paths passed to [`KeyStore::generate`].
    #[must_use]
    pub fn generated(&self) -> Vec<Utf8PathBuf> {
        self.lock().generated.clone()
    }
}

impl KeyStore for MemoryKeyStore {
    fn generate(&self, private_key_path: &Utf8Path) -> Result<String, KeyStoreError> {
        let mut inner = self.lock();
        if inner.fail_generation {
            return Err(KeyStoreError::Generator {
                program: String::from("ssh-keygen"),
                status: String::from("1"),
                stderr: String::from("simulated failure"),
            });
        }
        let public_path = public_key_path(private_key_path);
        let existing = inner
            .files
            .get(&public_path)
            .filter(|_| inner.files.contains_key(private_key_path));
        if let Some(public) = existing {
            return Ok(String::from_utf8_lossy(public).trim().to_owned());
        }
        let public_key = format!("ssh-rsa FAKE {private_key_path}");
        inner.generated.push(private_key_path.to_owned());
        inner
            .files
            .insert(private_key_path.to_owned(), b"FAKE PRIVATE KEY".to_vec());
        inner
            .files
            .insert(public_path, public_key.clone().into_bytes());
        Ok(public_key)
    }

    fn read_private_key(&self, path: &Utf8Path) -> Result<Vec<u8>, KeyStoreError> {
        self.lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| KeyStoreError::Io {
                path: path.to_owned(),
                message: String::from("no such file"),
            })
    }

    fn write_key_pair(
        &self,
        private_key_path: &Utf8Path,
        private_key: &[u8],
        public_key: &[u8],
    ) -> Result<(), KeyStoreError> {
        let mut inner = self.lock();
        inner
            .files
            .insert(private_key_path.to_owned(), private_key.to_vec());
        inner
            .files
            .insert(public_key_path(private_key_path), public_key.to_vec());
        Ok(())
    }
}
