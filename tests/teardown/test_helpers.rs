//! Shared fixtures for teardown BDD scenarios.

use otc_machine::flags::TOKEN;
use otc_machine::test_support::{FakeCloud, MemoryKeyStore};
use otc_machine::{Driver, DriverConfig, FlagValues, MachineRecord, TeardownStep};
use rstest::fixture;

pub const MACHINE_NAME: &str = "demo";
pub const MACHINE_DIR: &str = "/store/machines/demo";

pub type FakeDriver = Driver<FakeCloud, MemoryKeyStore>;

#[derive(Clone, Debug)]
pub enum RemovalOutcome {
    Success,
    Failure(Vec<TeardownStep>),
    Other(String),
}

#[derive(Clone, Debug)]
pub struct TeardownContext {
    pub cloud: FakeCloud,
    pub keys: MemoryKeyStore,
    pub flags: FlagValues,
    pub record: Option<MachineRecord>,
    pub outcome: Option<RemovalOutcome>,
}

impl TeardownContext {
    /// Builds a driver that has not been configured yet.
    pub fn driver(&self) -> FakeDriver {
        Driver::new(
            MACHINE_NAME,
            MACHINE_DIR,
            self.cloud.clone(),
            self.keys.clone(),
        )
    }

    /// Builds a driver restored from the recorded machine state.
    pub fn restored_driver(&self) -> FakeDriver {
        let Some(record) = self.record.clone() else {
            panic!("scenario requires a created machine");
        };
        let config = DriverConfig::bind(&self.flags)
            .unwrap_or_else(|err| panic!("flags should bind: {err}"));
        let mut driver = self.driver();
        driver.restore(config, record);
        driver
    }
}

#[fixture]
pub fn teardown_context() -> TeardownContext {
    TeardownContext {
        cloud: FakeCloud::new(),
        keys: MemoryKeyStore::new(),
        flags: FlagValues::new().with(TOKEN, "token-123"),
        record: None,
        outcome: None,
    }
}
