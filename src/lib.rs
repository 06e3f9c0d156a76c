pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod server;
pub mod storage;
pub mod validation;
