pub mod config;
pub mod repository;
pub mod service;

pub use config::Config;
pub use service::{
    BalanceResponse, EngineError, EngineSettings, GasSnapshot, SwapEngine, SwapQuote,
    TransactionRecord, TxStatus,
};
