use crate::config::toml_config::AirtableConfig;
use crate::domain::model::CrmRecord;
use crate::domain::ports::CrmSource;
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RecordsPage {
    #[serde(default)]
    records: Vec<CrmRecord>,
    #[serde(default)]
    offset: Option<String>,
}

/// Reads every record of one Airtable table, page by page.
pub struct AirtableClient {
    client: Client,
    table_url: String,
    token: String,
    page_size: u32,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            table_url: format!(
                "{}/v0/{}/{}",
                config.base_url.trim_end_matches('/'),
                config.base,
                config.table
            ),
            token: config.token.clone(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl CrmSource for AirtableClient {
    async fn records(&self) -> Result<Vec<CrmRecord>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&self.table_url)
                .bearer_auth(&self.token)
                .query(&[("pageSize", self.page_size.to_string())]);
            if let Some(offset) = &offset {
                request = request.query(&[("offset", offset)]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                // Keep whatever pages already arrived.
                tracing::warn!("⚠️  Airtable error {}", response.status());
                break;
            }

            let page: RecordsPage = response.json().await?;
            records.extend(page.records);

            match page.offset {
                Some(next) if !next.is_empty() && offset.as_deref() != Some(next.as_str()) => {
                    offset = Some(next)
                }
                _ => break,
            }
        }

        tracing::debug!("Fetched {} CRM records", records.len());
        Ok(records)
    }
}
