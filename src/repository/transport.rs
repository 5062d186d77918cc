use std::time::Duration;

use alloy::providers::RootProvider;
use alloy::rpc::client::RpcClient;
use alloy::transports::TransportError;
use alloy::transports::http::Http;
use alloy::transports::http::reqwest::{Client, Url};

use super::error::RepositoryError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Node messages for a raw transaction that is already in the mempool.
const ALREADY_KNOWN: [&str; 4] = [
    "already known",
    "known transaction",
    "already imported",
    "already in mempool",
];

/// Node messages for a transaction that fails validation. Every endpoint
/// would give the same answer.
const TX_REJECTIONS: [&str; 9] = [
    "nonce too low",
    "nonce too high",
    "insufficient funds",
    "underpriced",
    "intrinsic gas too low",
    "exceeds block gas limit",
    "fee cap less than block base fee",
    "max fee per gas less than block base fee",
    "invalid sender",
];

/// One HTTP provider per endpoint URL, with its own request timeout.
pub fn http_provider(
    url: &str,
    request_timeout: Duration,
) -> Result<RootProvider, RepositoryError> {
    let url: Url = url
        .parse()
        .map_err(|e| RepositoryError::Other(format!("invalid rpc url {url}: {e}")))?;
    let client = Client::builder()
        .timeout(request_timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| RepositoryError::Other(format!("Failed to build HTTP client: {e}")))?;

    let http = Http::with_client(client, url);
    Ok(RootProvider::new(RpcClient::new(http, false)))
}

/// How the gateway reacts to a failed attempt against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RpcFailure {
    /// The call executed and reverted.
    Reverted(String),
    /// The node refused the transaction itself.
    Rejected(String),
    /// Anything the next endpoint might not repeat: transport, HTTP, rate limits, bad payloads.
    Endpoint(String),
}

impl RpcFailure {
    pub(crate) fn classify(err: &TransportError) -> Self {
        let Some(payload) = err.as_error_resp() else {
            return Self::Endpoint(err.to_string());
        };

        let message = payload.message.to_lowercase();
        // EIP-1474 code 3 carries revert data; geth reports reverts as -32000.
        if payload.code == 3 || message.contains("execution reverted") {
            return Self::Reverted(payload.message.to_string());
        }
        if TX_REJECTIONS.iter().any(|m| message.contains(m)) {
            return Self::Rejected(payload.message.to_string());
        }

        Self::Endpoint(format!("JSON-RPC error {}: {}", payload.code, payload.message))
    }
}

pub(crate) fn is_already_known(err: &TransportError) -> bool {
    err.as_error_resp().is_some_and(|payload| {
        let message = payload.message.to_lowercase();
        ALREADY_KNOWN.iter().any(|m| message.contains(m))
    })
}
