//! Integration tests for option binding and runtime settings.

use std::time::Duration;

use otc_machine::flags::{KEYPAIR_NAME, PASSWORD, SSH_PORT, TOKEN, USERNAME};
use otc_machine::{AuthMethod, ConfigError, DriverConfig, FlagValues, RuntimeConfig};
use rstest::rstest;

#[rstest]
#[case(FlagValues::new().with(TOKEN, "tok"), AuthMethod::Token)]
#[case(
    FlagValues::new().with(USERNAME, "user").with(PASSWORD, "secret"),
    AuthMethod::Password
)]
fn supplied_credentials_select_auth_method(#[case] options: FlagValues, #[case] method: AuthMethod) {
    let config = DriverConfig::from_options(&options)
        .unwrap_or_else(|err| panic!("config should bind: {err}"));
    assert_eq!(config.auth.method(), Some(method));
}

#[test]
fn config_without_credentials_is_rejected() {
    let err = DriverConfig::from_options(&FlagValues::new()).expect_err("auth is required");
    assert_eq!(err, ConfigError::MissingAuth);
}

#[test]
fn key_pair_without_private_key_is_rejected() {
    let options = FlagValues::new()
        .with(TOKEN, "tok")
        .with(KEYPAIR_NAME, "shared");
    let err = DriverConfig::from_options(&options).expect_err("pair must be complete");
    assert!(
        matches!(err, ConfigError::IncompletePair { ref first, .. } if first == KEYPAIR_NAME),
        "unexpected error: {err}"
    );
}

#[test]
fn out_of_range_ssh_port_is_rejected() {
    let options = FlagValues::new().with(TOKEN, "tok").with(SSH_PORT, 70_000_i64);
    let err = DriverConfig::from_options(&options).expect_err("port must fit u16");
    assert!(err.to_string().contains(SSH_PORT), "unexpected error: {err}");
}

#[test]
fn bind_skips_validation_for_existing_machines() {
    let config = DriverConfig::bind(&FlagValues::new())
        .unwrap_or_else(|err| panic!("bind should not validate: {err}"));
    assert_eq!(config.auth.method(), None);
}

#[test]
fn runtime_wait_policy_uses_seconds() {
    let runtime = RuntimeConfig {
        storage_path: String::from("/tmp/otc-machine"),
        poll_interval_secs: 2,
        wait_timeout_secs: 30,
    };
    let policy = runtime.wait_policy();
    assert_eq!(policy.poll_interval, Duration::from_secs(2));
    assert_eq!(policy.timeout, Duration::from_secs(30));
}
