#![cfg(test)]

pub mod common;
pub mod fork_tests;
pub mod lifecycle_tests;
pub mod override_tests;
pub mod state_event_tests;
