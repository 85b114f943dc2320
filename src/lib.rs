//! Docker-machine style driver for Open Telekom Cloud.
//!
//! The crate provisions a single virtual machine together with the network,
//! subnet, security groups, SSH key pair and floating IP it needs, persists
//! what it created, and tears exactly those resources down again. Cloud
//! access sits behind the [`provider::CloudConnector`] and
//! [`provider::CloudSession`] traits; [`otc`] implements them over the OTC
//! REST APIs and [`test_support`] provides an in-memory double.

pub mod command;
pub mod config;
pub mod driver;
pub mod flags;
pub mod keys;
pub mod managed;
pub mod options;
pub mod otc;
pub mod provider;
pub mod store;
pub mod test_support;

pub use config::{AuthMethod, AuthOptions, ConfigError, DriverConfig, RuntimeConfig};
pub use driver::{Driver, DriverError, HostState, MachineRecord, TeardownError, TeardownStep};
pub use keys::{KeyStore, KeyStoreError, SshKeygenStore};
pub use managed::{ManagedResource, ResourceValue};
pub use options::{DriverOptions, FlagValue, FlagValues};
pub use otc::{OtcConnector, OtcSession};
pub use provider::{CloudConnector, CloudSession, ProviderError, WaitPolicy};
pub use store::{FileMachineStore, MachineStore, StoreError};
