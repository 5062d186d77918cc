use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::RepositoryError;

#[derive(Debug)]
struct PoolState {
    healthy: Vec<bool>,
    cursor: usize,
}

/// Ordered RPC endpoints of one chain with per-endpoint health and a rotation cursor.
///
/// The state mutex is only held while choosing or flagging an endpoint, never
/// across a network round-trip, so concurrent calls on the same chain serialize
/// their health updates without blocking each other's I/O.
#[derive(Debug)]
pub struct EndpointPool {
    chain: String,
    urls: Vec<String>,
    state: Mutex<PoolState>,
}

impl EndpointPool {
    /// Builds a pool from the configured URLs, dropping blanks and duplicates
    /// while keeping the configured order.
    pub fn new(chain: impl Into<String>, urls: Vec<String>) -> Result<Self, RepositoryError> {
        let chain = chain.into();

        let mut unique: Vec<String> = Vec::with_capacity(urls.len());
        for url in urls {
            let url = url.trim();
            if url.is_empty() || unique.iter().any(|u| u == url) {
                continue;
            }
            unique.push(url.to_string());
        }

        if unique.is_empty() {
            return Err(RepositoryError::UnknownChain(chain));
        }

        let state = PoolState {
            healthy: vec![true; unique.len()],
            cursor: 0,
        };

        Ok(Self {
            chain,
            urls: unique,
            state: Mutex::new(state),
        })
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Picks the next endpoint to attempt, in rotation order from the cursor.
    ///
    /// `tried` marks endpoints already attempted by the current call; they are
    /// never returned twice. If no endpoint is healthy, all flags are cleared
    /// first so the pool can never lock itself out permanently.
    pub fn next_endpoint(&self, tried: &[bool]) -> Option<(usize, &str)> {
        let mut state = self.state();

        if !state.healthy.iter().any(|healthy| *healthy) {
            tracing::warn!(
                "All {} RPC endpoints for {} are unhealthy, resetting health flags",
                self.urls.len(),
                self.chain
            );
            state.healthy.fill(true);
        }

        let count = self.urls.len();
        let cursor = state.cursor;

        (0..count)
            .map(|offset| (cursor + offset) % count)
            .find(|idx| {
                let healthy = state.healthy.get(*idx).copied().unwrap_or(false);
                let already_tried = tried.get(*idx).copied().unwrap_or(false);
                healthy && !already_tried
            })
            .and_then(|idx| self.urls.get(idx).map(|url| (idx, url.as_str())))
    }

    /// Flags the endpoint unhealthy and moves the cursor past it.
    pub fn mark_failed(&self, idx: usize) {
        let mut state = self.state();
        if let Some(flag) = state.healthy.get_mut(idx) {
            *flag = false;
        }
        state.cursor = (idx + 1) % self.urls.len();
    }

    /// Keeps the cursor on an endpoint that just answered. Other flags are left alone.
    pub fn mark_succeeded(&self, idx: usize) {
        let mut state = self.state();
        if idx < self.urls.len() {
            state.cursor = idx;
        }
    }

    pub fn is_healthy(&self, idx: usize) -> bool {
        self.state().healthy.get(idx).copied().unwrap_or(false)
    }

    pub fn healthy_count(&self) -> usize {
        self.state().healthy.iter().filter(|healthy| **healthy).count()
    }

    pub fn cursor(&self) -> usize {
        self.state().cursor
    }
}
