//! Apache Guacamole REST API: token exchange and connection management.

mod client;
mod connections;
mod exchange;
pub mod model;

pub use client::{GatewayClient, TOKEN_HEADER};
pub use connections::ConnectionProxy;
pub use exchange::TokenExchanger;
pub use model::{ConnectionCreated, ConnectionRequest, ConnectionSummary, GatewayConnectionRecord};
