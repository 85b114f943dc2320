//! End-to-end lifecycle of a machine persisted through the file store.

use camino::Utf8PathBuf;
use otc_machine::flags::TOKEN;
use otc_machine::test_support::{FakeCloud, FakeOperation, Inventory, MemoryKeyStore};
use otc_machine::{
    Driver, DriverConfig, FileMachineStore, FlagValues, HostState, MachineStore, StoreError,
};
use tempfile::TempDir;

struct Harness {
    cloud: FakeCloud,
    keys: MemoryKeyStore,
    store: FileMachineStore,
    flags: FlagValues,
    _tmp: TempDir,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("create store temp dir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir should be UTF-8: {}", path.display()));
        Self {
            cloud: FakeCloud::new(),
            keys: MemoryKeyStore::new(),
            store: FileMachineStore::new(root),
            flags: FlagValues::new().with(TOKEN, "token-123"),
            _tmp: tmp,
        }
    }

    fn driver(&self, name: &str) -> Driver<FakeCloud, MemoryKeyStore> {
        let dir = self
            .store
            .machine_dir(name)
            .unwrap_or_else(|err| panic!("machine dir for {name}: {err}"));
        Driver::new(name, dir, self.cloud.clone(), self.keys.clone())
    }

    fn reload(&self, name: &str) -> Driver<FakeCloud, MemoryKeyStore> {
        let record = self
            .store
            .load(name)
            .unwrap_or_else(|err| panic!("load {name}: {err}"));
        let config = DriverConfig::bind(&self.flags)
            .unwrap_or_else(|err| panic!("bind flags: {err}"));
        let mut driver = self.driver(name);
        driver.restore(config, record);
        driver
    }
}

#[tokio::test]
async fn machine_survives_reload_between_commands() {
    let harness = Harness::new();
    let mut driver = harness.driver("web");
    driver
        .set_config_from_flags(&harness.flags)
        .expect("flags should bind");
    driver.create().await.expect("create should succeed");
    harness.store.save(driver.record()).expect("save record");

    let mut reloaded = harness.reload("web");
    assert_eq!(reloaded.record(), driver.record());
    assert_eq!(reloaded.url(), driver.url());

    reloaded.stop().await.expect("stop should succeed");
    assert_eq!(
        reloaded.state().await.expect("state after stop"),
        HostState::Stopped
    );
    reloaded.start().await.expect("start should succeed");
    assert_eq!(
        reloaded.state().await.expect("state after start"),
        HostState::Running
    );
    harness.store.save(reloaded.record()).expect("save record");

    let mut removing = harness.reload("web");
    removing.remove().await.expect("remove should succeed");
    harness.store.remove("web").expect("remove record");

    assert_eq!(harness.cloud.inventory(), Inventory::default());
    assert!(!harness.store.exists("web").expect("exists check"));
}

#[tokio::test]
async fn failed_create_can_resume_from_saved_record() {
    let harness = Harness::new();
    harness.cloud.fail_on(FakeOperation::CreateInstance);
    let mut driver = harness.driver("api");
    driver
        .set_config_from_flags(&harness.flags)
        .expect("flags should bind");
    driver
        .create()
        .await
        .expect_err("instance creation should fail");
    harness.store.save(driver.record()).expect("save partial record");

    harness.cloud.clear_failures();
    let mut resumed = harness.reload("api");
    resumed.create().await.expect("resumed create should succeed");

    assert_eq!(harness.cloud.count(FakeOperation::CreateVpc), 1);
    assert_eq!(harness.cloud.count(FakeOperation::CreateKeyPair), 1);
    assert_eq!(harness.cloud.inventory().instances.len(), 1);
}

#[test]
fn loading_an_unknown_machine_reports_not_found() {
    let harness = Harness::new();
    let err = harness.store.load("ghost").expect_err("record is absent");
    assert!(matches!(err, StoreError::NotFound { ref name, .. } if name == "ghost"));
}
