//! Infrastructure layer - ledger RPC and durable storage

pub mod rpc_client;
pub mod store;

pub use rpc_client::SolanaRpc;
pub use store::EventStore;
