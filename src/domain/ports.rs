use crate::domain::model::{ChatMessage, CrmRecord, PageviewEvent};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Where `path` ends up, for reporting back to the user.
    fn locate(&self, path: &str) -> String;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Extracted: Send;
    type Transformed: Send;

    async fn extract(&self) -> Result<Self::Extracted>;
    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed>;
    async fn load(&self, result: Self::Transformed) -> Result<String>;
}

/// Which pageview events to pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageviewQuery {
    pub limit: u32,
    pub after: Option<DateTime<Utc>>,
    /// Keep following the `next` link until the API stops returning one.
    pub follow_pages: bool,
}

impl PageviewQuery {
    /// A single page of the most recent events.
    pub fn latest(limit: u32) -> Self {
        Self {
            limit,
            after: None,
            follow_pages: false,
        }
    }

    /// Every event since `after`, `limit` per page.
    pub fn since(after: DateTime<Utc>, limit: u32) -> Self {
        Self {
            limit,
            after: Some(after),
            follow_pages: true,
        }
    }
}

#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn pageviews(&self, query: &PageviewQuery) -> Result<Vec<PageviewEvent>>;
}

#[async_trait]
pub trait CrmSource: Send + Sync {
    async fn records(&self) -> Result<Vec<CrmRecord>>;
}

/// A chat model that answers with a full (non-streamed) reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `Ok(None)` when the model answered with nothing.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Option<String>>;
}

/// Forwards a question to an external agent and returns its answer text.
#[async_trait]
pub trait RelayBackend: Send + Sync {
    async fn ask(&self, message: &str) -> Result<String>;
}
