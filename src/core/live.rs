use crate::core::metrics::top_counts;
use crate::domain::model::{CrmRecord, LiveData, PageCount, PageviewEvent, PipelineCounts};
use crate::domain::ports::{AnalyticsSource, CrmSource, PageviewQuery};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DASHBOARD_TOP_PAGES: usize = 5;
const MAIN_CONTACT: &str = "Party Main Contact";

struct Cached {
    fetched_at: Instant,
    data: LiveData,
}

/// Dashboard numbers, fetched on demand and reused for `ttl`.
pub struct LiveDataService {
    analytics: Arc<dyn AnalyticsSource>,
    crm: Option<Arc<dyn CrmSource>>,
    ttl: Duration,
    pageview_limit: u32,
    cache: Mutex<Option<Cached>>,
}

impl LiveDataService {
    pub fn new(
        analytics: Arc<dyn AnalyticsSource>,
        crm: Option<Arc<dyn CrmSource>>,
        ttl: Duration,
        pageview_limit: u32,
    ) -> Self {
        Self {
            analytics,
            crm,
            ttl,
            pageview_limit,
            cache: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> LiveData {
        // Held across the fetch so concurrent requests share one refresh.
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.data.clone();
            }
        }

        let data = self.fetch().await;
        *cache = Some(Cached {
            fetched_at: Instant::now(),
            data: data.clone(),
        });
        data
    }

    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    /// Drops the cached copy and fetches a new one.
    pub async fn refresh(&self) -> LiveData {
        self.invalidate().await;
        self.get().await
    }

    async fn fetch(&self) -> LiveData {
        tracing::debug!("Refreshing live dashboard data");
        let mut data = LiveData::default();

        match self
            .analytics
            .pageviews(&PageviewQuery::latest(self.pageview_limit))
            .await
        {
            Ok(events) => {
                data.pageviews_7d = Some(events.len() as u64);
                data.top_pages = Some(dashboard_top_pages(&events));
            }
            Err(e) => {
                tracing::warn!("PostHog fetch failed: {}", e);
                data.posthog_error = Some(e.to_string());
            }
        }

        if let Some(crm) = &self.crm {
            match crm.records().await {
                Ok(records) => {
                    let (pipeline, total_leads) = main_contact_pipeline(&records);
                    data.pipeline = Some(pipeline);
                    data.total_leads = Some(total_leads);
                }
                Err(e) => {
                    tracing::warn!("Airtable fetch failed: {}", e);
                    data.airtable_error = Some(e.to_string());
                }
            }
        }

        data
    }
}

fn dashboard_top_pages(events: &[PageviewEvent]) -> Vec<PageCount> {
    top_counts(events.iter().map(PageviewEvent::pathname), DASHBOARD_TOP_PAGES)
        .into_iter()
        .map(|(url, views)| PageCount { url, views })
        .collect()
}

/// Only the party's main contact counts as a lead; other rows are guests.
fn main_contact_pipeline(records: &[CrmRecord]) -> (PipelineCounts, u64) {
    let main_contacts: Vec<&CrmRecord> = records
        .iter()
        .filter(|r| r.contact_type() == Some(MAIN_CONTACT))
        .collect();
    let pipeline = PipelineCounts::from_statuses(main_contacts.iter().map(|r| r.status()));
    (pipeline, main_contacts.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::{PulseError, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAnalytics {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AnalyticsSource for CountingAnalytics {
        async fn pageviews(&self, query: &PageviewQuery) -> Result<Vec<PageviewEvent>> {
            assert!(!query.follow_pages);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PulseError::processing("posthog down"));
            }
            Ok(["/", "/", "/packages/"]
                .iter()
                .map(|p| serde_json::from_value(json!({"properties": {"$pathname": p}})).unwrap())
                .collect())
        }
    }

    struct StaticCrm(Vec<CrmRecord>);

    #[async_trait]
    impl CrmSource for StaticCrm {
        async fn records(&self) -> Result<Vec<CrmRecord>> {
            Ok(self.0.clone())
        }
    }

    fn contact(kind: &str, status: &str) -> CrmRecord {
        serde_json::from_value(json!({"fields": {"Contact Type": kind, "Status": status}})).unwrap()
    }

    fn analytics(fail: bool) -> Arc<CountingAnalytics> {
        Arc::new(CountingAnalytics {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_cache_reuses_data_within_ttl() {
        let source = analytics(false);
        let service = LiveDataService::new(source.clone(), None, Duration::from_secs(300), 500);

        let first = service.get().await;
        let second = service.get().await;

        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.pageviews_7d, Some(3));
        assert_eq!(first.top_pages.unwrap()[0], PageCount { url: "/".into(), views: 2 });
        assert!(first.pipeline.is_none());
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let source = analytics(false);
        let service = LiveDataService::new(source.clone(), None, Duration::from_secs(300), 500);

        service.get().await;
        service.refresh().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let source = analytics(false);
        let service = LiveDataService::new(source.clone(), None, Duration::ZERO, 500);

        service.get().await;
        service.get().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_analytics_failure_is_reported_in_payload() {
        let service = LiveDataService::new(analytics(true), None, Duration::from_secs(300), 500);

        let data = service.get().await;

        assert!(data.pageviews_7d.is_none());
        assert!(data.posthog_error.unwrap().contains("posthog down"));
    }

    struct SlowAnalytics {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalyticsSource for SlowAnalytics {
        async fn pageviews(&self, _query: &PageviewQuery) -> Result<Vec<PageviewEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_share_one_fetch() {
        let source = Arc::new(SlowAnalytics {
            calls: AtomicUsize::new(0),
        });
        let service = Arc::new(LiveDataService::new(
            source.clone(),
            None,
            Duration::from_secs(300),
            500,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.get().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().pageviews_7d, Some(0));
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pipeline_counts_main_contacts_only() {
        let crm = StaticCrm(vec![
            contact("Party Main Contact", "New Request"),
            contact("Party Main Contact", "Booked - Deposit"),
            contact("Guest", "Booked"),
            contact("Party Main Contact", "No Go - Not Coming to Town"),
        ]);
        let service = LiveDataService::new(
            analytics(false),
            Some(Arc::new(crm)),
            Duration::from_secs(300),
            500,
        );

        let data = service.get().await;

        assert_eq!(data.total_leads, Some(3));
        assert_eq!(
            data.pipeline,
            Some(PipelineCounts {
                new: 1,
                quoted: 0,
                booked: 1,
                no_go: 1
            })
        );
    }
}
