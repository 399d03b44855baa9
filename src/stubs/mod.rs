/// In-process implementations of core traits, for wiring and tests.
pub mod runner;
pub mod store;
