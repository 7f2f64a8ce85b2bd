use crate::core::metrics::{format_thousands, round_to, top_counts};
use crate::domain::model::{
    display_value, AnalyticsSummary, CrmRecord, CrmSummary, DailyReport, FollowupLead, Insights,
    PageCount, PageviewEvent, PipelineCounts, SourceCount,
};
use crate::domain::ports::{AnalyticsSource, CrmSource, PageviewQuery, Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

const TOP_PAGES: usize = 10;
const TOP_SOURCES: usize = 8;
const TOP_AD_PAGES: usize = 5;
const MAX_FOLLOWUPS: usize = 10;
const LOW_TRAFFIC_THRESHOLD: u64 = 100;
const FOLLOWUP_STATUSES: [&str; 2] = ["New Request", "talked to/ quoted"];

/// Raw data for one reporting window.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub events: Vec<PageviewEvent>,
    pub records: Vec<CrmRecord>,
}

pub struct CollectorPipeline<S: Storage> {
    storage: S,
    analytics: Arc<dyn AnalyticsSource>,
    crm: Option<Arc<dyn CrmSource>>,
    period_days: u32,
    page_limit: u32,
    report_file: String,
    window_end: Option<DateTime<Utc>>,
}

impl<S: Storage> CollectorPipeline<S> {
    pub fn new(
        storage: S,
        analytics: Arc<dyn AnalyticsSource>,
        crm: Option<Arc<dyn CrmSource>>,
    ) -> Self {
        Self {
            storage,
            analytics,
            crm,
            period_days: 7,
            page_limit: 1000,
            report_file: "daily-report.json".to_string(),
            window_end: None,
        }
    }

    pub fn with_period_days(mut self, days: u32) -> Self {
        self.period_days = days.max(1);
        self
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn with_report_file(mut self, file: impl Into<String>) -> Self {
        self.report_file = file.into();
        self
    }

    /// Pins the end of the window instead of using the current time.
    pub fn with_window_end(mut self, end: DateTime<Utc>) -> Self {
        self.window_end = Some(end);
        self
    }
}

#[async_trait]
impl<S: Storage> Pipeline for CollectorPipeline<S> {
    type Extracted = Snapshot;
    type Transformed = DailyReport;

    async fn extract(&self) -> Result<Snapshot> {
        let window_end = self.window_end.unwrap_or_else(Utc::now);
        let window_start = window_end - Duration::days(i64::from(self.period_days));
        tracing::info!(
            "Period: {} → {}",
            window_start.date_naive(),
            window_end.date_naive()
        );

        // A failing source contributes nothing; the report is still written.
        let query = PageviewQuery::since(window_start, self.page_limit);
        let events = match self.analytics.pageviews(&query).await {
            Ok(events) => {
                tracing::info!("✅ {} pageviews fetched", events.len());
                events
            }
            Err(e) => {
                tracing::error!("❌ PostHog error: {}", e);
                Vec::new()
            }
        };

        let records = match &self.crm {
            Some(crm) => match crm.records().await {
                Ok(records) => {
                    tracing::info!("✅ {} CRM records fetched", records.len());
                    records
                }
                Err(e) => {
                    tracing::error!("❌ Airtable error: {}", e);
                    Vec::new()
                }
            },
            None => {
                tracing::warn!("No Airtable token configured, skipping CRM data");
                Vec::new()
            }
        };

        Ok(Snapshot {
            window_start,
            window_end,
            events,
            records,
        })
    }

    async fn transform(&self, data: Snapshot) -> Result<DailyReport> {
        let posthog = summarize_analytics(&data.events, self.period_days);
        let airtable = summarize_crm(&data.records, data.window_start);
        let insights = generate_insights(&posthog, &airtable, self.period_days);

        Ok(DailyReport {
            generated_at: data.window_end.to_rfc3339(),
            period_days: self.period_days,
            posthog,
            airtable,
            insights,
        })
    }

    async fn load(&self, report: DailyReport) -> Result<String> {
        let json = serde_json::to_vec_pretty(&report)?;
        self.storage.write_file(&self.report_file, &json).await?;
        Ok(self.storage.locate(&self.report_file))
    }
}

pub fn summarize_analytics(events: &[PageviewEvent], period_days: u32) -> AnalyticsSummary {
    let total = events.len() as u64;

    let top_pages = top_counts(events.iter().map(PageviewEvent::pathname), TOP_PAGES)
        .into_iter()
        .map(|(url, views)| PageCount { url, views })
        .collect();

    let traffic_sources = top_counts(events.iter().map(PageviewEvent::traffic_source), TOP_SOURCES)
        .into_iter()
        .map(|(source, sessions)| SourceCount { source, sessions })
        .collect();

    let ad_landing_pages = top_counts(
        events
            .iter()
            .filter(|e| e.is_ad_click())
            .map(PageviewEvent::pathname),
        TOP_AD_PAGES,
    )
    .into_iter()
    .map(|(url, views)| PageCount { url, views })
    .collect();

    AnalyticsSummary {
        top_pages,
        traffic_sources,
        total_pageviews_7d: total,
        avg_daily_pageviews: round_to(total as f64 / f64::from(period_days.max(1)), 1),
        ad_landing_pages,
    }
}

pub fn summarize_crm(records: &[CrmRecord], window_start: DateTime<Utc>) -> CrmSummary {
    let new_leads_7d = records
        .iter()
        .filter_map(CrmRecord::created_at)
        .filter(|created| *created >= window_start)
        .count() as u64;

    let pipeline = PipelineCounts::from_statuses(records.iter().map(CrmRecord::status));

    let total_pipeline_value: f64 = records
        .iter()
        .filter(|r| !matches!(r.status(), "" | "No Go"))
        .filter_map(deal_value)
        .sum();

    let leads_needing_followup = records
        .iter()
        .filter(|r| FOLLOWUP_STATUSES.contains(&r.status()))
        .take(MAX_FOLLOWUPS)
        .map(|r| FollowupLead {
            name: r.field_str("Name").unwrap_or("Unknown").to_string(),
            status: r.status().to_string(),
            last_contact: last_contact(r),
        })
        .collect();

    CrmSummary {
        new_leads_7d,
        pipeline,
        leads_needing_followup,
        total_pipeline_value: round_to(total_pipeline_value, 2),
    }
}

fn is_set(value: &&Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

/// `Grand Total`, falling back to `Service Total`; `$` and `,` are ignored.
fn deal_value(record: &CrmRecord) -> Option<f64> {
    let raw = record
        .field("Grand Total")
        .filter(is_set)
        .or_else(|| record.field("Service Total").filter(is_set))?;
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace([',', '$'], "").trim().parse().ok(),
        _ => None,
    }
}

fn last_contact(record: &CrmRecord) -> String {
    ["Status Update Date", "First Contact Date"]
        .iter()
        .filter_map(|name| record.field(name))
        .find(|value| !value.is_null())
        .map(display_value)
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn generate_insights(
    posthog: &AnalyticsSummary,
    airtable: &CrmSummary,
    period_days: u32,
) -> Insights {
    let mut issues = Vec::new();
    let mut opportunities = Vec::new();

    if posthog.total_pageviews_7d < LOW_TRAFFIC_THRESHOLD {
        issues.push(format!(
            "Low traffic: only {} pageviews in {} days",
            posthog.total_pageviews_7d, period_days
        ));
    }
    if airtable.new_leads_7d == 0 {
        issues.push(format!("No new leads in the past {} days", period_days));
    } else if airtable.pipeline.quoted == 0 {
        issues.push(format!(
            "{} new leads but none have been quoted yet",
            airtable.new_leads_7d
        ));
    }

    if let Some(top_ad) = posthog.ad_landing_pages.first() {
        opportunities.push(format!(
            "Top ad landing page: {} ({} ad clicks)",
            top_ad.url, top_ad.views
        ));
    }
    if airtable.pipeline.quoted > 0 {
        opportunities.push(format!(
            "{} leads currently in quoted stage — close them",
            airtable.pipeline.quoted
        ));
    }
    if airtable.total_pipeline_value > 0.0 {
        opportunities.push(format!(
            "${} in active pipeline value",
            format_thousands(airtable.total_pipeline_value)
        ));
    }

    if issues.is_empty() {
        issues.push("No critical issues detected".to_string());
    }
    if opportunities.is_empty() {
        opportunities.push("Keep monitoring — more data needed".to_string());
    }

    Insights {
        issues,
        opportunities,
    }
}

/// Console summary printed after `leadpulse collect`.
pub fn render_summary(report: &DailyReport) -> String {
    let ph = &report.posthog;
    let at = &report.airtable;
    let rule = "=".repeat(50);
    let mut out = format!("{rule}\nSUMMARY\n{rule}\n");

    out.push_str(&format!(
        "🌐 Traffic ({}d): {} pageviews, ~{}/day\n",
        report.period_days, ph.total_pageviews_7d, ph.avg_daily_pageviews
    ));
    if !ph.top_pages.is_empty() {
        out.push_str("   Top pages:\n");
        for page in ph.top_pages.iter().take(5) {
            out.push_str(&format!("   • {} ({} views)\n", page.url, page.views));
        }
    }

    out.push_str(&format!(
        "\n👥 Pipeline: {} new | {} quoted | {} booked | ${} value\n",
        at.new_leads_7d,
        at.pipeline.quoted,
        at.pipeline.booked,
        format_thousands(at.total_pipeline_value)
    ));

    out.push_str("\n⚠️  Issues:\n");
    for issue in &report.insights.issues {
        out.push_str(&format!("   • {}\n", issue));
    }
    out.push_str("\n💡 Opportunities:\n");
    for opportunity in &report.insights.opportunities {
        out.push_str(&format!("   • {}\n", opportunity));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn events(props: &[Value]) -> Vec<PageviewEvent> {
        props
            .iter()
            .map(|p| serde_json::from_value(json!({ "properties": p })).unwrap())
            .collect()
    }

    fn record(created: &str, fields: Value) -> CrmRecord {
        serde_json::from_value(json!({"id": "rec", "createdTime": created, "fields": fields}))
            .unwrap()
    }

    #[test]
    fn test_summarize_analytics() {
        let evs = events(&[
            json!({"$pathname": "/", "$referring_domain": "www.google.com"}),
            json!({"$pathname": "/packages/", "gclid": "x"}),
            json!({"$pathname": "/packages/", "$utm_source": "google"}),
            json!({"$pathname": "/"}),
            json!({"$pathname": "/itineraries/", "$utm_source": "facebook"}),
        ]);

        let summary = summarize_analytics(&evs, 7);

        assert_eq!(summary.total_pageviews_7d, 5);
        assert_eq!(summary.avg_daily_pageviews, 0.7);
        assert_eq!(summary.top_pages[0], PageCount { url: "/".into(), views: 2 });
        assert_eq!(summary.top_pages[1], PageCount { url: "/packages/".into(), views: 2 });
        assert_eq!(
            summary.ad_landing_pages,
            vec![PageCount { url: "/packages/".into(), views: 2 }]
        );
        let sources: Vec<(&str, u64)> = summary
            .traffic_sources
            .iter()
            .map(|s| (s.source.as_str(), s.sessions))
            .collect();
        assert_eq!(
            sources,
            vec![("direct", 2), ("www.google.com", 1), ("google", 1), ("facebook", 1)]
        );
    }

    #[test]
    fn test_summarize_crm() {
        let start = Utc.with_ymd_and_hms(2026, 10, 11, 0, 0, 0).unwrap();
        let records = vec![
            record(
                "2026-10-15T12:00:00.000Z",
                json!({"Name": "Sam", "Status": "New Request", "Grand Total": "$1,200.50",
                       "First Contact Date": "2026-10-15"}),
            ),
            record(
                "2026-09-01T12:00:00.000Z",
                json!({"Status": "talked to/ quoted", "Grand Total": "", "Service Total": 800,
                       "Status Update Date": "2026-09-20"}),
            ),
            record(
                "2026-10-12T12:00:00.000Z",
                json!({"Status": "No Go", "Grand Total": "5000"}),
            ),
            record("not a date", json!({"Grand Total": "999"})),
            record(
                "2026-10-01T00:00:00.000Z",
                json!({"Status": "Booked", "Grand Total": "TBD"}),
            ),
        ];

        let summary = summarize_crm(&records, start);

        assert_eq!(summary.new_leads_7d, 2);
        assert_eq!(
            summary.pipeline,
            PipelineCounts {
                new: 1,
                quoted: 1,
                booked: 1,
                no_go: 1
            }
        );
        assert_eq!(summary.total_pipeline_value, 2000.5);
        assert_eq!(
            summary.leads_needing_followup,
            vec![
                FollowupLead {
                    name: "Sam".into(),
                    status: "New Request".into(),
                    last_contact: "2026-10-15".into()
                },
                FollowupLead {
                    name: "Unknown".into(),
                    status: "talked to/ quoted".into(),
                    last_contact: "2026-09-20".into()
                },
            ]
        );
    }

    #[test]
    fn test_followups_are_capped() {
        let start = Utc.with_ymd_and_hms(2026, 10, 11, 0, 0, 0).unwrap();
        let records: Vec<CrmRecord> = (0..15)
            .map(|_| record("2026-10-12T00:00:00Z", json!({"Status": "New Request"})))
            .collect();
        let summary = summarize_crm(&records, start);
        assert_eq!(summary.leads_needing_followup.len(), 10);
        assert_eq!(summary.leads_needing_followup[0].last_contact, "Unknown");
    }

    #[test]
    fn test_insights_for_quiet_week() {
        let insights = generate_insights(&AnalyticsSummary::default(), &CrmSummary::default(), 7);
        assert_eq!(
            insights.issues,
            vec![
                "Low traffic: only 0 pageviews in 7 days".to_string(),
                "No new leads in the past 7 days".to_string()
            ]
        );
        assert_eq!(insights.opportunities, vec!["Keep monitoring — more data needed"]);
    }

    #[test]
    fn test_insights_for_busy_week() {
        let posthog = AnalyticsSummary {
            total_pageviews_7d: 450,
            ad_landing_pages: vec![PageCount { url: "/bachelor-party-a-v2/".into(), views: 61 }],
            ..Default::default()
        };
        let airtable = CrmSummary {
            new_leads_7d: 4,
            pipeline: PipelineCounts { quoted: 3, ..Default::default() },
            total_pipeline_value: 12_500.0,
            ..Default::default()
        };

        let insights = generate_insights(&posthog, &airtable, 7);

        assert_eq!(insights.issues, vec!["No critical issues detected"]);
        assert_eq!(
            insights.opportunities,
            vec![
                "Top ad landing page: /bachelor-party-a-v2/ (61 ad clicks)".to_string(),
                "3 leads currently in quoted stage — close them".to_string(),
                "$12,500 in active pipeline value".to_string(),
            ]
        );
    }

    #[test]
    fn test_new_leads_without_quotes_is_an_issue() {
        let airtable = CrmSummary {
            new_leads_7d: 2,
            ..Default::default()
        };
        let posthog = AnalyticsSummary {
            total_pageviews_7d: 200,
            ..Default::default()
        };
        let insights = generate_insights(&posthog, &airtable, 7);
        assert_eq!(insights.issues, vec!["2 new leads but none have been quoted yet"]);
    }

    #[test]
    fn test_render_summary_mentions_pipeline() {
        let report = DailyReport {
            period_days: 7,
            airtable: CrmSummary {
                new_leads_7d: 3,
                total_pipeline_value: 1234.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let text = render_summary(&report);
        assert!(text.contains("👥 Pipeline: 3 new | 0 quoted | 0 booked | $1,234 value"));
    }
}
