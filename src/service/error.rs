use serde::Serialize;
use thiserror::Error;

use crate::repository::RepositoryError;

#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum EngineError {
    // Chain access errors
    /// Every RPC endpoint of the chain failed during one call.
    #[error("All {attempts} RPC endpoints failed for chain {chain}: {last_error}")]
    EndpointExhausted {
        chain: String,
        attempts: usize,
        last_error: String,
    },

    /// The chain is not configured.
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    /// An on-chain call reverted.
    #[error("Call reverted: {0}")]
    CallReverted(String),

    /// Any other failure talking to the chain (malformed responses, encoding errors).
    #[error("Blockchain error: {0}")]
    BlockchainError(String),

    // Quote errors
    /// No direct or two-hop path exists between the tokens.
    #[error("No route found on {chain} for {token_in} -> {token_out}")]
    NoRouteFound {
        chain: String,
        token_in: String,
        token_out: String,
    },

    /// A route exists but every router adapter failed to quote it.
    #[error("No quote available on {chain}: {reason}")]
    NoQuoteAvailable { chain: String, reason: String },

    /// A router returned zero output for the path.
    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    // Transaction lifecycle errors
    #[error("Transaction {hash} was not confirmed before the deadline")]
    TransactionTimeout { hash: String },

    /// The node refused the signed transaction (bad nonce, insufficient funds, fee too low).
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Transaction {hash} failed: {reason}")]
    TransactionFailed { hash: String, reason: String },

    // Input validation errors
    /// The token symbol is not registered for the chain and is not an address.
    #[error("Token not found or not supported: {0}")]
    TokenNotFound(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The amount is zero, negative or not representable in the token's smallest unit.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid slippage: {0} bps (must be at most 10000)")]
    InvalidSlippage(u32),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::EndpointExhausted {
                chain,
                attempts,
                last_error,
            } => EngineError::EndpointExhausted {
                chain,
                attempts,
                last_error,
            },
            RepositoryError::ExecutionReverted(msg) => EngineError::CallReverted(msg),
            RepositoryError::Rejected(msg) => EngineError::TransactionRejected(msg),
            RepositoryError::UnknownChain(chain) => EngineError::UnknownChain(chain),
            RepositoryError::ContractError(msg) | RepositoryError::ParseError(msg) => {
                EngineError::BlockchainError(msg)
            }
            RepositoryError::Other(msg) => EngineError::InternalError(msg),
        }
    }
}
