//! Behavioural scenarios for `otc-machine rm`.

mod teardown;
