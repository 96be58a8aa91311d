use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Parameters for a list fetch. Filtering itself is the server's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn filtered(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            limit: None,
        }
    }
}

/// The remote authority for list data and the saved set.
///
/// `save` and `remove` must be idempotent: repeating an already-applied
/// call succeeds without further effect. The drain relies on this after a
/// crash or a lost acknowledgement.
#[async_trait]
pub trait RemoteService: Send + Sync {
    type Item: Send;

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Self::Item>, NetworkError>;

    async fn save(&self, id: &str) -> Result<(), NetworkError>;

    async fn remove(&self, id: &str) -> Result<(), NetworkError>;
}
