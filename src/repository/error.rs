use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// Every endpoint of the chain's pool failed once during a single call.
    #[error("All {attempts} RPC endpoints failed for chain {chain}: {last_error}")]
    EndpointExhausted {
        chain: String,
        attempts: usize,
        last_error: String,
    },

    /// The node executed the call and it reverted. Retrying elsewhere would give the same answer.
    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    /// The node refused a transaction as invalid (nonce, funds, fee). Not endpoint-specific.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("No RPC endpoints configured for chain: {0}")]
    UnknownChain(String),

    #[error("Contract call error: {0}")]
    ContractError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("{0}")]
    Other(String),
}
