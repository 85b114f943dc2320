//! BDD scenarios for machine teardown.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TeardownContext, teardown_context};

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Remove every resource the driver created"
)]
fn scenario_remove_everything(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Keep a caller-supplied network"
)]
fn scenario_keep_supplied_network(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Report every failed teardown step"
)]
fn scenario_report_failed_steps(teardown_context: TeardownContext) {
    let _ = teardown_context;
}
