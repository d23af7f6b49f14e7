// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the client facade.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::FetchError;

/// Lifecycle state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed, background loops not yet running
    Created,
    /// Background sweep and warming loops active
    Running,
    /// Shutdown requested, loops draining
    ShuttingDown,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

/// Per-call options for a fetch.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Query text for lexical TTL categorization and popularity tracking;
    /// defaults to the cache key when absent
    pub query: Option<String>,
    /// Deadline for each loader attempt
    pub timeout: Duration,
    /// Suspend until a rate limit slot frees instead of failing fast
    pub wait_for_slot: bool,
}

impl Default for FetchContext {
    fn default() -> Self {
        Self {
            query: None,
            timeout: Duration::from_secs(30),
            wait_for_slot: false,
        }
    }
}

impl FetchContext {
    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn waiting_for_slot(mut self) -> Self {
        self.wait_for_slot = true;
        self
    }
}

/// A registered data source, required for background warming where no
/// caller closure is available.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> Result<Value, FetchError>;
}
