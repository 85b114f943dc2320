//! Lifecycle tests for the driver against the in-memory cloud.

use super::*;
use crate::flags::{
    ELASTIC_IP, FLOATING_IP, K8S_GROUP, KEYPAIR_NAME, PRIVATE_KEY_FILE, SECURITY_GROUPS,
    SERVER_GROUP, SUBNET_ID, TAGS, TOKEN, USER_DATA_FILE, USER_DATA_RAW, VPC_ID,
};
use crate::keys::public_key_path;
use crate::options::{FlagValue, FlagValues};
use crate::provider::{PortRange, ProviderError};
use crate::test_support::{
    FAKE_FLAVOR_ID, FAKE_IMAGE_ID, FakeCloud, FakeOperation, Inventory, MemoryKeyStore,
};
use tempfile::TempDir;

const MACHINE_DIR: &str = "/store/machines/demo";

type TestDriver = Driver<FakeCloud, MemoryKeyStore>;

fn token_flags() -> FlagValues {
    FlagValues::new().with(TOKEN, "token-123")
}

fn driver_with(cloud: &FakeCloud, keys: &MemoryKeyStore, flags: &FlagValues) -> TestDriver {
    let mut driver = Driver::new("demo", MACHINE_DIR, cloud.clone(), keys.clone());
    driver
        .set_config_from_flags(flags)
        .expect("flags should bind");
    driver
}

async fn created_driver(cloud: &FakeCloud, keys: &MemoryKeyStore) -> TestDriver {
    let mut driver = driver_with(cloud, keys, &token_flags());
    driver.create().await.expect("create should succeed");
    driver
}

fn write_operations(cloud: &FakeCloud) -> Vec<FakeOperation> {
    cloud
        .write_calls()
        .into_iter()
        .map(|call| call.operation)
        .collect()
}

#[tokio::test]
async fn create_provisions_resources_in_dependency_order() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let driver = created_driver(&cloud, &keys).await;

    assert_eq!(
        write_operations(&cloud),
        vec![
            FakeOperation::CreateVpc,
            FakeOperation::CreateSubnet,
            FakeOperation::CreateSecurityGroup,
            FakeOperation::CreateKeyPair,
            FakeOperation::CreateInstance,
            FakeOperation::CreateFloatingIp,
            FakeOperation::BindFloatingIp,
        ]
    );

    let record = driver.record();
    assert!(record.vpc.is_driver_managed());
    assert!(record.subnet.is_driver_managed());
    assert!(record.default_security_group.is_driver_managed());
    assert!(!record.fixed_port_security_group.is_present());
    assert!(record.key_pair.is_driver_managed());
    assert!(record.key_pair.value().starts_with("demo-"));
    assert!(record.floating_ip.is_driver_managed());
    assert_eq!(record.floating_ip.value().as_str(), "203.0.113.5");
    assert_eq!(
        cloud.floating_ip_binding("203.0.113.5").as_deref(),
        Some(record.instance_id.as_str())
    );
    assert_eq!(driver.url().as_deref(), Some("tcp://203.0.113.5:2376"));
    assert_eq!(keys.generated(), vec![driver.ssh_key_path()]);
    assert_eq!(record.private_key_file, driver.ssh_key_path().as_str());
}

#[tokio::test]
async fn create_sends_resolved_identifiers_to_instance() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let driver = created_driver(&cloud, &keys).await;

    let spec = cloud
        .instance_spec(driver.record().instance_id.as_str())
        .expect("instance should exist");
    assert_eq!(spec.name, "demo");
    assert_eq!(spec.flavor_id, FAKE_FLAVOR_ID);
    assert_eq!(spec.root_volume.source_id, FAKE_IMAGE_ID);
    assert_eq!(spec.root_volume.size, 200);
    assert_eq!(spec.availability_zone, "eu-de-01");
    assert_eq!(&spec.vpc_id, driver.record().vpc.value());
    assert_eq!(&spec.subnet_id, driver.record().subnet.value());
    assert_eq!(&spec.key_pair, driver.record().key_pair.value());
    assert_eq!(
        spec.security_groups,
        vec![driver.record().default_security_group.value().clone()]
    );
    assert_eq!(spec.server_group_id, None);
    assert_eq!(spec.user_data, None);
}

#[tokio::test]
async fn default_group_opens_ssh_and_docker_ports() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let driver = created_driver(&cloud, &keys).await;

    let group = driver.record().default_security_group.value().as_str();
    assert_eq!(
        cloud.security_group_name(group).as_deref(),
        Some(crate::config::DEFAULT_SECURITY_GROUP)
    );
    let rules = cloud.security_group_rules(group).expect("group should exist");
    assert_eq!(
        rules.into_iter().map(PortRange::bounds).collect::<Vec<_>>(),
        vec![(22, 22), (2376, 2376)]
    );
}

#[tokio::test]
async fn caller_supplied_network_is_reused_and_kept() {
    let cloud = FakeCloud::new()
        .with_vpc("vpc-shared", "shared")
        .with_subnet("vpc-shared", "subnet-shared", "shared");
    let keys = MemoryKeyStore::new();
    let flags = token_flags()
        .with(VPC_ID, "vpc-shared")
        .with(SUBNET_ID, "subnet-shared");
    let mut driver = driver_with(&cloud, &keys, &flags);

    driver.create().await.expect("create should succeed");
    assert_eq!(cloud.count(FakeOperation::CreateVpc), 0);
    assert_eq!(cloud.count(FakeOperation::CreateSubnet), 0);
    assert!(!driver.record().vpc.is_driver_managed());

    driver.remove().await.expect("remove should succeed");
    let inventory = cloud.inventory();
    assert_eq!(inventory.vpcs, vec!["vpc-shared".to_owned()]);
    assert_eq!(inventory.subnets, vec!["subnet-shared".to_owned()]);
    assert!(inventory.instances.is_empty());
    assert!(inventory.security_groups.is_empty());
}

#[tokio::test]
async fn network_names_resolve_to_existing_resources() {
    let cloud = FakeCloud::new()
        .with_vpc("vpc-named", "vpc-docker-machine")
        .with_subnet("vpc-named", "subnet-named", "subnet-docker-machine");
    let keys = MemoryKeyStore::new();
    let driver = created_driver(&cloud, &keys).await;

    assert_eq!(driver.record().vpc.value().as_str(), "vpc-named");
    assert_eq!(driver.record().subnet.value().as_str(), "subnet-named");
    assert!(!driver.record().vpc.is_driver_managed());
    assert!(!driver.record().subnet.is_driver_managed());
}

#[tokio::test]
async fn unknown_flavor_fails_before_any_write() {
    let cloud = FakeCloud::default().with_image("Standard_Ubuntu_18.04_latest", FAKE_IMAGE_ID);
    let keys = MemoryKeyStore::new();
    let mut driver = driver_with(&cloud, &keys, &token_flags());

    let err = driver.create().await.expect_err("flavor lookup should fail");

    assert!(
        matches!(&err, DriverError::NotFound { kind, name } if kind == "flavor" && name == "s2.large.4"),
        "unexpected error: {err}"
    );
    assert!(cloud.write_calls().is_empty());
}

#[tokio::test]
async fn optional_groups_tags_and_placement_reach_the_instance() {
    let cloud = FakeCloud::new()
        .with_security_group("sg-web", "web")
        .with_server_group("anti-affinity", "sg-placement");
    let keys = MemoryKeyStore::new();
    let flags = token_flags()
        .with(K8S_GROUP, true)
        .with(SECURITY_GROUPS, "web,missing")
        .with(SERVER_GROUP, "anti-affinity")
        .with(TAGS, "team=core,env=dev")
        .with(USER_DATA_RAW, "#cloud-config\n");
    let mut driver = driver_with(&cloud, &keys, &flags);

    driver.create().await.expect("create should succeed");

    let record = driver.record();
    let id = record.instance_id.as_str();
    let spec = cloud.instance_spec(id).expect("instance should exist");
    assert_eq!(
        spec.security_groups,
        vec![
            "sg-web".into(),
            record.default_security_group.value().clone(),
            record.fixed_port_security_group.value().clone(),
        ]
    );
    assert_eq!(spec.server_group_id.as_deref(), Some("sg-placement"));
    assert_eq!(spec.user_data.as_deref(), Some(b"#cloud-config\n".as_slice()));
    assert_eq!(
        cloud.instance_tags(id),
        vec!["team=core".to_owned(), "env=dev".to_owned()]
    );
    let fixed = cloud
        .security_group_rules(record.fixed_port_security_group.value())
        .expect("fixed-port group should exist");
    assert_eq!(fixed, FIXED_PORT_RANGES.to_vec());
}

#[tokio::test]
async fn user_data_file_contents_reach_the_instance() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("bootstrap.yaml");
    std::fs::write(&path, "#cloud-config\npackages: [docker]\n").expect("write user data");
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let flags = token_flags().with(
        USER_DATA_FILE,
        path.to_str().expect("tempdir path should be UTF-8"),
    );
    let mut driver = driver_with(&cloud, &keys, &flags);

    driver.create().await.expect("create should succeed");

    let spec = cloud
        .instance_spec(driver.record().instance_id.as_str())
        .expect("instance should exist");
    assert_eq!(
        spec.user_data.as_deref(),
        Some(b"#cloud-config\npackages: [docker]\n".as_slice())
    );
}

#[tokio::test]
async fn missing_user_data_file_aborts_before_instance_creation() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("absent.yaml");
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let flags = token_flags().with(
        USER_DATA_FILE,
        path.to_str().expect("tempdir path should be UTF-8"),
    );
    let mut driver = driver_with(&cloud, &keys, &flags);

    let err = driver.create().await.expect_err("missing file should fail");

    assert!(matches!(err, DriverError::UserData { .. }));
    assert_eq!(cloud.count(FakeOperation::CreateInstance), 0);
    assert!(driver.record().instance_id.is_blank());
}

#[tokio::test]
async fn conflicting_user_data_on_restored_driver_fails_before_any_write() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = driver_with(&cloud, &keys, &token_flags());
    let record = driver.record().clone();
    let flags = token_flags()
        .with(USER_DATA_RAW, "#cloud-config\n")
        .with(USER_DATA_FILE, "/etc/bootstrap.yaml");
    let config = DriverConfig::bind(&flags).expect("flags should bind");
    driver.restore(config, record);

    let err = driver.create().await.expect_err("conflicting sources should fail");

    assert!(matches!(err, DriverError::Config(_)));
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn preset_floating_ip_is_bound_and_kept() {
    let cloud = FakeCloud::new().with_floating_ip("203.0.113.50");
    let keys = MemoryKeyStore::new();
    let flags = token_flags().with(FLOATING_IP, "203.0.113.50");
    let mut driver = driver_with(&cloud, &keys, &flags);

    driver.create().await.expect("create should succeed");

    assert_eq!(cloud.count(FakeOperation::CreateFloatingIp), 0);
    let instance = driver.record().instance_id.to_string();
    assert_eq!(cloud.floating_ip_binding("203.0.113.50"), Some(instance));
    assert!(!driver.record().floating_ip.is_driver_managed());

    driver.remove().await.expect("remove should succeed");

    assert_eq!(cloud.count(FakeOperation::ReleaseFloatingIp), 0);
    assert_eq!(cloud.inventory().floating_ips, vec!["203.0.113.50".to_owned()]);
}

#[tokio::test]
async fn repeated_create_rebinds_recorded_floating_ip() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;
    let address = driver.record().floating_ip.value().clone();

    driver.create().await.expect("second create should succeed");

    assert_eq!(cloud.count(FakeOperation::CreateFloatingIp), 1);
    assert_eq!(cloud.count(FakeOperation::BindFloatingIp), 2);
    assert_eq!(driver.record().floating_ip.value(), &address);
    assert_eq!(cloud.inventory().floating_ips.len(), 1);
}

#[tokio::test]
async fn skipped_floating_ip_uses_instance_address() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let flags = token_flags().with(ELASTIC_IP, FlagValue::Int(0));
    let mut driver = driver_with(&cloud, &keys, &flags);

    driver.create().await.expect("create should succeed");

    assert_eq!(cloud.count(FakeOperation::CreateFloatingIp), 0);
    let address = &driver.record().floating_ip;
    assert!(address.is_present());
    assert!(!address.is_driver_managed());
    assert_eq!(
        driver.ip().map(|ip| ip.to_string()).ok().as_deref(),
        Some("192.168.0.11")
    );
}

#[tokio::test]
async fn skipped_floating_ip_without_pools_still_succeeds() {
    let cloud = FakeCloud::new();
    cloud.set_instance_addresses(serde_json::json!({}));
    let keys = MemoryKeyStore::new();
    let flags = token_flags().with(ELASTIC_IP, FlagValue::Int(0));
    let mut driver = driver_with(&cloud, &keys, &flags);

    driver.create().await.expect("create should succeed");

    assert!(matches!(driver.ip(), Err(DriverError::MissingAddress)));
    assert_eq!(driver.url(), None);
}

#[tokio::test]
async fn create_resumes_after_partial_failure() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = driver_with(&cloud, &keys, &token_flags());
    cloud.fail_on(FakeOperation::CreateInstance);

    let err = driver.create().await.expect_err("instance creation should fail");
    assert!(matches!(err, DriverError::Provider(ProviderError::Api { .. })));
    assert!(driver.record().vpc.is_present());
    assert!(driver.record().key_pair.is_present());
    assert!(driver.record().instance_id.is_blank());

    cloud.clear_failures();
    driver.create().await.expect("second create should succeed");

    assert_eq!(cloud.count(FakeOperation::CreateVpc), 1);
    assert_eq!(cloud.count(FakeOperation::CreateSubnet), 1);
    assert_eq!(cloud.count(FakeOperation::CreateSecurityGroup), 1);
    assert_eq!(cloud.count(FakeOperation::CreateKeyPair), 1);
    assert_eq!(cloud.count(FakeOperation::CreateInstance), 2);
    assert_eq!(cloud.inventory().instances.len(), 1);
}

#[tokio::test]
async fn create_resumes_with_key_generated_before_registration_failed() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = driver_with(&cloud, &keys, &token_flags());
    cloud.fail_on(FakeOperation::CreateKeyPair);

    driver.create().await.expect_err("key registration should fail");
    assert!(!driver.record().key_pair.is_present());

    cloud.clear_failures();
    driver.create().await.expect("second create should succeed");

    assert_eq!(keys.generated(), vec![driver.ssh_key_path()]);
    assert_eq!(cloud.count(FakeOperation::CreateKeyPair), 2);
    assert!(driver.record().key_pair.is_driver_managed());
}

#[tokio::test]
async fn imported_key_pair_is_copied_and_kept() {
    let cloud = FakeCloud::new().with_key_pair("shared-key", "ssh-rsa SHARED");
    let keys = MemoryKeyStore::new().with_file("/keys/shared", b"PRIVATE");
    let flags = token_flags()
        .with(KEYPAIR_NAME, "shared-key")
        .with(PRIVATE_KEY_FILE, "/keys/shared");
    let mut driver = driver_with(&cloud, &keys, &flags);

    driver.create().await.expect("create should succeed");

    assert_eq!(cloud.count(FakeOperation::CreateKeyPair), 0);
    assert!(keys.generated().is_empty());
    let key_path = driver.ssh_key_path();
    assert_eq!(keys.file(&key_path), Some(b"PRIVATE".to_vec()));
    assert_eq!(
        keys.file(&public_key_path(&key_path)),
        Some(b"ssh-rsa SHARED".to_vec())
    );

    driver.remove().await.expect("remove should succeed");
    assert_eq!(cloud.inventory().key_pairs, vec!["shared-key".to_owned()]);
}

#[tokio::test]
async fn missing_imported_key_file_aborts_create() {
    let cloud = FakeCloud::new().with_key_pair("shared-key", "ssh-rsa SHARED");
    let keys = MemoryKeyStore::new();
    let flags = token_flags()
        .with(KEYPAIR_NAME, "shared-key")
        .with(PRIVATE_KEY_FILE, "/keys/absent");
    let mut driver = driver_with(&cloud, &keys, &flags);

    let err = driver.create().await.expect_err("missing key should fail");

    assert!(matches!(err, DriverError::KeyStore(_)));
    assert_eq!(cloud.count(FakeOperation::CreateInstance), 0);
}

#[tokio::test]
async fn remove_deletes_everything_the_driver_created() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;

    driver.remove().await.expect("remove should succeed");

    assert_eq!(cloud.inventory(), Inventory::default());
    let record = driver.record();
    assert!(record.instance_id.is_blank());
    assert!(!record.vpc.is_present());
    assert!(!record.subnet.is_present());
    assert!(!record.key_pair.is_present());
    assert!(!record.floating_ip.is_present());
    assert!(!record.default_security_group.is_present());
}

#[tokio::test]
async fn remove_runs_every_step_and_reports_each_failure() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;
    for operation in [
        FakeOperation::DeleteInstance,
        FakeOperation::DeleteKeyPair,
        FakeOperation::ReleaseFloatingIp,
        FakeOperation::DeleteSubnet,
    ] {
        cloud.fail_on(operation);
    }

    let err = driver.remove().await.expect_err("teardown should fail");

    let DriverError::Teardown(teardown) = err else {
        panic!("expected teardown error, got {err}");
    };
    assert_eq!(
        teardown
            .failures()
            .iter()
            .map(|failure| failure.step)
            .collect::<Vec<_>>(),
        vec![
            TeardownStep::Instance,
            TeardownStep::KeyPair,
            TeardownStep::FloatingIp,
            TeardownStep::Subnet,
        ]
    );
    assert_eq!(cloud.count(FakeOperation::DeleteVpc), 1);
    assert_eq!(cloud.count(FakeOperation::DeleteSecurityGroup), 1);
    assert!(driver.record().subnet.is_present());
    assert!(!driver.record().vpc.is_present());
}

#[tokio::test]
async fn remove_retry_skips_cleared_resources() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;
    cloud.fail_on(FakeOperation::DeleteInstance);
    driver.remove().await.expect_err("first remove should fail");

    cloud.clear_failures();
    driver.remove().await.expect("retry should succeed");

    assert_eq!(cloud.count(FakeOperation::DeleteVpc), 1);
    assert_eq!(cloud.count(FakeOperation::DeleteInstance), 2);
    assert_eq!(cloud.inventory(), Inventory::default());
}

#[tokio::test]
async fn remove_converges_after_failed_deletion_wait() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;
    cloud.fail_on(FakeOperation::WaitInstance);
    driver.remove().await.expect_err("deletion wait should fail");
    assert!(!driver.record().instance_id.is_blank());

    cloud.clear_failures();
    driver.remove().await.expect("retry should succeed");

    assert_eq!(cloud.count(FakeOperation::DeleteInstance), 2);
    assert!(driver.record().instance_id.is_blank());
    assert_eq!(cloud.inventory(), Inventory::default());
}

#[tokio::test]
async fn authentication_failure_stops_remove_before_any_step() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;
    let mut restored = Driver::new("demo", MACHINE_DIR, cloud.clone(), keys.clone());
    restored.restore(driver.config().clone(), driver.record().clone());
    cloud.fail_on(FakeOperation::Authenticate);

    let err = restored.remove().await.expect_err("auth should fail");

    assert!(matches!(
        err,
        DriverError::Provider(ProviderError::Authentication { .. })
    ));
    assert_eq!(cloud.count(FakeOperation::DeleteInstance), 0);
    // The already-authenticated driver keeps its session.
    cloud.clear_failures();
    driver.remove().await.expect("remove should succeed");
}

#[tokio::test]
async fn power_operations_drive_instance_state() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;
    assert_eq!(driver.state().await.ok(), Some(HostState::Running));

    driver.stop().await.expect("stop should succeed");
    assert_eq!(driver.state().await.ok(), Some(HostState::Stopped));

    driver.start().await.expect("start should succeed");
    assert_eq!(driver.state().await.ok(), Some(HostState::Running));

    driver.restart().await.expect("restart should succeed");
    assert_eq!(cloud.count(FakeOperation::StopInstance), 2);
    assert_eq!(cloud.count(FakeOperation::StartInstance), 2);

    driver.kill().await.expect("kill should succeed");
    assert_eq!(driver.state().await.ok(), Some(HostState::Stopped));
}

#[tokio::test]
async fn error_status_maps_to_error_state() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = created_driver(&cloud, &keys).await;
    cloud.set_instance_status(driver.record().instance_id.as_str(), "ERROR");

    assert_eq!(driver.state().await.ok(), Some(HostState::Error));
}

#[tokio::test]
async fn power_operations_require_an_instance() {
    let cloud = FakeCloud::new();
    let keys = MemoryKeyStore::new();
    let mut driver = driver_with(&cloud, &keys, &token_flags());

    assert!(matches!(
        driver.start().await,
        Err(DriverError::MissingInstance { .. })
    ));
    assert!(matches!(
        driver.state().await,
        Err(DriverError::MissingInstance { .. })
    ));
}

#[test]
fn addresses_are_unavailable_before_create() {
    let driver = driver_with(&FakeCloud::new(), &MemoryKeyStore::new(), &token_flags());

    assert!(matches!(driver.ip(), Err(DriverError::MissingAddress)));
    assert!(matches!(
        driver.ssh_hostname(),
        Err(DriverError::MissingAddress)
    ));
    assert_eq!(driver.url(), None);
    assert_eq!(driver.driver_name(), "otc-v2");
    assert_eq!(driver.ssh_username(), "ubuntu");
    assert_eq!(driver.ssh_port(), 22);
    assert_eq!(driver.ssh_key_path().as_str(), "/store/machines/demo/id_rsa");
}

#[test]
fn ipv6_urls_are_bracketed() {
    let mut driver = driver_with(&FakeCloud::new(), &MemoryKeyStore::new(), &token_flags());
    let mut record = driver.record().clone();
    record.floating_ip = crate::managed::ManagedResource::existing("2001:db8::5".into());
    driver.restore(driver.config().clone(), record);

    assert_eq!(driver.url().as_deref(), Some("tcp://[2001:db8::5]:2376"));
}

#[test]
fn rejected_flags_leave_driver_unchanged() {
    let mut driver = driver_with(&FakeCloud::new(), &MemoryKeyStore::new(), &token_flags());
    let before = driver.record().clone();
    let flags = token_flags().with(KEYPAIR_NAME, "only-name");

    let err = driver
        .set_config_from_flags(&flags)
        .expect_err("incomplete key pair should be rejected");

    assert!(matches!(err, DriverError::Config(_)));
    assert_eq!(driver.record(), &before);
    assert!(!driver.record().key_pair.is_present());
}
