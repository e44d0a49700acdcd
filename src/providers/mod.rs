//! Providers Module - External Data Sources
//!
//! RPC failover client, chain reads, simulation service and DexScreener.

pub mod chain;
pub mod market;
pub mod rpc;
pub mod simulation;

pub use chain::{ChainReader, RpcChainReader, WalletSigner};
pub use market::{DexScreenerClient, MarketDataSource};
pub use rpc::{JsonRpc, RpcFailoverClient};
pub use simulation::{AlchemySimulation, SimulationBackend, SimulationGateway};
