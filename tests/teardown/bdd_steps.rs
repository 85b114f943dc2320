//! BDD step definitions for machine teardown.

use otc_machine::flags::{SUBNET_ID, VPC_ID};
use otc_machine::test_support::{FakeOperation, Inventory};
use otc_machine::{DriverError, ResourceValue};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{RemovalOutcome, TeardownContext};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

fn create_machine(mut teardown_context: TeardownContext) -> TeardownContext {
    let mut driver = teardown_context.driver();
    driver
        .set_config_from_flags(&teardown_context.flags)
        .unwrap_or_else(|err| panic!("flags should bind: {err}"));
    let runtime = runtime().unwrap_or_else(|err| panic!("{err}"));
    runtime
        .block_on(driver.create())
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));
    teardown_context.record = Some(driver.record().clone());
    teardown_context
}

#[given("a cloud with no existing resources")]
fn empty_cloud(teardown_context: TeardownContext) -> TeardownContext {
    teardown_context
}

#[given("a cloud with network \"{vpc}\" and subnet \"{subnet}\"")]
fn cloud_with_network(
    mut teardown_context: TeardownContext,
    vpc: String,
    subnet: String,
) -> TeardownContext {
    teardown_context.cloud = teardown_context
        .cloud
        .clone()
        .with_vpc(&vpc, "user-network")
        .with_subnet(&vpc, &subnet, "user-subnet");
    teardown_context.flags.set(VPC_ID, vpc);
    teardown_context.flags.set(SUBNET_ID, subnet);
    teardown_context
}

#[given("a machine created with default settings")]
fn machine_created(teardown_context: TeardownContext) -> TeardownContext {
    create_machine(teardown_context)
}

#[given("a machine created on that network")]
fn machine_created_on_network(teardown_context: TeardownContext) -> TeardownContext {
    create_machine(teardown_context)
}

#[given("deleting instances, key pairs, floating IPs and subnets fails")]
fn deletions_fail(teardown_context: TeardownContext) -> TeardownContext {
    for operation in [
        FakeOperation::DeleteInstance,
        FakeOperation::DeleteKeyPair,
        FakeOperation::ReleaseFloatingIp,
        FakeOperation::DeleteSubnet,
    ] {
        teardown_context.cloud.fail_on(operation);
    }
    teardown_context
}

#[when("I remove the machine")]
fn remove_machine(mut teardown_context: TeardownContext) -> Result<TeardownContext, StepError> {
    let runtime = runtime()?;
    let mut driver = teardown_context.restored_driver();
    let outcome = match runtime.block_on(driver.remove()) {
        Ok(()) => RemovalOutcome::Success,
        Err(DriverError::Teardown(teardown)) => RemovalOutcome::Failure(
            teardown
                .failures()
                .iter()
                .map(|failure| failure.step)
                .collect(),
        ),
        Err(err) => RemovalOutcome::Other(err.to_string()),
    };
    teardown_context.record = Some(driver.record().clone());
    teardown_context.outcome = Some(outcome);
    Ok(teardown_context)
}

#[then("the removal succeeds")]
fn removal_succeeds(teardown_context: &TeardownContext) -> Result<(), StepError> {
    match teardown_context.outcome {
        Some(RemovalOutcome::Success) => Ok(()),
        Some(RemovalOutcome::Failure(ref steps)) => Err(StepError::Assertion(format!(
            "expected success, teardown failed at {steps:?}"
        ))),
        Some(RemovalOutcome::Other(ref message)) => Err(StepError::Assertion(format!(
            "expected success, got error: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the cloud holds no resources")]
fn cloud_is_empty(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let inventory = teardown_context.cloud.inventory();
    if inventory == Inventory::default() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "resources remain: {inventory:?}"
        )))
    }
}

#[then("the machine record lists no resources")]
fn record_is_cleared(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let Some(record) = teardown_context.record.as_ref() else {
        return Err(StepError::Assertion(String::from("missing record")));
    };
    let leftovers = [
        ("instance", !record.instance_id.is_blank()),
        ("network", record.vpc.is_present()),
        ("subnet", record.subnet.is_present()),
        ("key pair", record.key_pair.is_present()),
        ("floating IP", record.floating_ip.is_present()),
        ("security group", record.default_security_group.is_present()),
    ]
    .into_iter()
    .filter_map(|(label, present)| present.then_some(label))
    .collect::<Vec<_>>();
    if leftovers.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "record still lists: {}",
            leftovers.join(", ")
        )))
    }
}

#[then("network \"{vpc}\" and subnet \"{subnet}\" remain")]
fn network_remains(
    teardown_context: &TeardownContext,
    vpc: String,
    subnet: String,
) -> Result<(), StepError> {
    let inventory = teardown_context.cloud.inventory();
    if inventory.vpcs == vec![vpc.clone()] && inventory.subnets == vec![subnet.clone()] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only {vpc} and {subnet} to remain, got {inventory:?}"
        )))
    }
}

#[then("the removal fails with steps \"{steps}\"")]
fn removal_fails_with(teardown_context: &TeardownContext, steps: String) -> Result<(), StepError> {
    let Some(RemovalOutcome::Failure(failed)) = &teardown_context.outcome else {
        return Err(StepError::Assertion(format!(
            "expected teardown failure, got {:?}",
            teardown_context.outcome
        )));
    };
    let rendered = failed
        .iter()
        .map(|step| step.label())
        .collect::<Vec<_>>()
        .join(", ");
    if rendered == steps {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failed steps {steps}, got {rendered}"
        )))
    }
}

#[then("the network was still deleted")]
fn network_deleted(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let inventory = teardown_context.cloud.inventory();
    if teardown_context.cloud.count(FakeOperation::DeleteVpc) == 1 && inventory.vpcs.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected the VPC to be deleted, got {inventory:?}"
        )))
    }
}
