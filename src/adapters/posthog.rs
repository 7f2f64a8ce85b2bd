use crate::config::toml_config::PosthogConfig;
use crate::domain::model::PageviewEvent;
use crate::domain::ports::{AnalyticsSource, PageviewQuery};
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    results: Vec<PageviewEvent>,
    #[serde(default)]
    next: Option<String>,
}

/// PostHog events API, scoped to one project.
pub struct PosthogClient {
    client: Client,
    host: String,
    project: String,
    api_key: String,
}

impl PosthogClient {
    pub fn new(config: &PosthogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn events_url(&self) -> String {
        format!("{}/api/projects/{}/events/", self.host, self.project)
    }
}

#[async_trait]
impl AnalyticsSource for PosthogClient {
    async fn pageviews(&self, query: &PageviewQuery) -> Result<Vec<PageviewEvent>> {
        let mut events = Vec::new();
        // The `next` link already carries every query parameter.
        let mut next_url: Option<String> = None;

        loop {
            let request = match &next_url {
                Some(url) => self.client.get(url),
                None => {
                    let mut params = vec![
                        ("event", "$pageview".to_string()),
                        ("limit", query.limit.to_string()),
                    ];
                    if let Some(after) = query.after {
                        params.push(("after", after.format("%Y-%m-%dT%H:%M:%S").to_string()));
                    }
                    self.client.get(self.events_url()).query(&params)
                }
            };

            tracing::debug!("Requesting pageviews page {}", next_url.as_deref().unwrap_or("1"));
            let response = request.bearer_auth(&self.api_key).send().await?;
            if !response.status().is_success() {
                tracing::warn!("⚠️  PostHog returned {}", response.status());
                break;
            }

            let page: EventsPage = response.json().await?;
            events.extend(page.results);

            match page.next {
                Some(next) if query.follow_pages && next_url.as_deref() != Some(next.as_str()) => {
                    next_url = Some(next);
                }
                _ => break,
            }
        }

        tracing::debug!("Fetched {} pageview events", events.len());
        Ok(events)
    }
}
