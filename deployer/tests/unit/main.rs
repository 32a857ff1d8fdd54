//! Integration tests, run against the local transport in temp directories

mod common;
mod test_admin;
mod test_coordinator;
mod test_fsm;
mod test_keys;
