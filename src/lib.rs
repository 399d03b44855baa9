pub mod config;
pub mod constants;
pub mod core;
pub mod sandbox;
pub mod service;
pub mod stubs;
