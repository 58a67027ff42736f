pub mod agent;
pub mod classify;
pub mod config;
pub mod error;
pub mod fs_util;
pub mod gateway;
pub mod memory;
pub mod secrets;
pub mod session;
pub mod types;
