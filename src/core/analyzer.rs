use crate::core::metrics::{format_thousands, percent};
use crate::domain::model::{DailyReport, Priority, Proposal, ProposalSet};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{PulseError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const AD_VIEWS_THRESHOLD: u64 = 50;
const AD_LEADS_CEILING: u64 = 20;
const STALLED_QUOTES_THRESHOLD: u64 = 15;
const FOLLOWUP_BACKLOG_THRESHOLD: usize = 3;
const OVERDUE_DAYS: i64 = 14;
const SEO_MIN_SESSIONS: u64 = 100;
const SEO_ORGANIC_SHARE: u64 = 60;

/// Applies the marketing rules to one report.
pub struct MarketingAnalyzer<'a> {
    report: &'a DailyReport,
    now: DateTime<Utc>,
    proposals: Vec<Proposal>,
    counter: usize,
}

impl<'a> MarketingAnalyzer<'a> {
    pub fn new(report: &'a DailyReport, now: DateTime<Utc>) -> Self {
        Self {
            report,
            now,
            proposals: Vec::new(),
            counter: 0,
        }
    }

    /// Runs every rule and returns proposals sorted high priority first.
    /// Equal priorities keep rule order.
    pub fn analyze(mut self) -> Vec<Proposal> {
        self.ad_conversion();
        self.pipeline_closure();
        self.followup_cadence();
        self.content_depth();
        self.traffic_sources();

        let mut proposals = self.proposals;
        proposals.sort_by_key(|p| p.priority);
        proposals
    }

    #[allow(clippy::too_many_arguments)]
    fn add(
        &mut self,
        id_base: &str,
        priority: Priority,
        category: &str,
        issue: String,
        solution: String,
        effort: &str,
        impact: &str,
    ) {
        self.counter += 1;
        self.proposals.push(Proposal {
            id: format!("{}-{}", id_base, self.counter),
            priority,
            category: category.to_string(),
            issue,
            solution,
            effort: effort.to_string(),
            expected_impact: impact.to_string(),
        });
    }

    fn ad_conversion(&mut self) {
        let ad_pages = &self.report.posthog.ad_landing_pages;
        let new_leads = self.report.airtable.new_leads_7d;
        let total_ad_views: u64 = ad_pages.iter().map(|p| p.views).sum();

        if total_ad_views <= AD_VIEWS_THRESHOLD || new_leads >= AD_LEADS_CEILING {
            return;
        }

        let (url, views) = ad_pages
            .first()
            .map(|p| (p.url.clone(), p.views))
            .unwrap_or_else(|| ("unknown".to_string(), 0));

        self.add(
            "low-conversion-ad-landing",
            Priority::High,
            "ads",
            format!(
                "Ad landing page {url} gets {views} clicks/week but only {new_leads} new leads in {days} days across all channels (conversion rate ~{rate}%)",
                days = self.report.period_days,
                rate = percent(new_leads, total_ad_views),
            ),
            format!(
                "A/B test {url}: (1) Add a social proof section with 3 testimonials and a parties-planned counter; (2) Test a stronger headline against the current one; (3) Simplify the CTA button to 'Get Your Quote in 2 Minutes'; (4) Add an FAQ above the fold addressing the top objections (price, flexibility, rain plan)"
            ),
            "1hr",
            "Estimated +20-30% conversion rate = 8-12 additional leads/week",
        );
    }

    fn pipeline_closure(&mut self) {
        let pipeline = self.report.airtable.pipeline;
        if pipeline.quoted <= STALLED_QUOTES_THRESHOLD || pipeline.booked != 0 {
            return;
        }

        let month = self.now.format("%B");
        self.add(
            "zero-closes-quoted",
            Priority::High,
            "conversion",
            format!(
                "Pipeline stuck: {} leads quoted, but 0 booked. Quote-to-close rate is 0% despite ${} in pipeline value",
                pipeline.quoted,
                format_thousands(self.report.airtable.total_pipeline_value)
            ),
            format!(
                "Launch a 'Close-the-Loop' sprint: (1) Create a quote follow-up template: 'Hi {{name}}, checking in on your {month} party quote. Any questions? Happy to adjust details.'; (2) Follow up on Day 3 and Day 7 after every quote; (3) Review winning vs losing quotes for missing details; (4) Add a bonus activity or package upgrade for quick decisions"
            ),
            "half-day",
            "Expected +15-20% close rate = 5-6 bookings/month",
        );
    }

    fn followup_cadence(&mut self) {
        let leads = &self.report.airtable.leads_needing_followup;
        if leads.len() <= FOLLOWUP_BACKLOG_THRESHOLD {
            return;
        }

        let contact_times: Vec<DateTime<Utc>> = leads
            .iter()
            .filter_map(|lead| parse_contact_time(&lead.last_contact))
            .collect();
        let overdue = contact_times
            .iter()
            .filter(|contacted| (self.now - **contacted).num_days() > OVERDUE_DAYS)
            .count();
        let contact_dates: Vec<NaiveDate> = contact_times.iter().map(|t| t.date_naive()).collect();

        let mut issue = format!(
            "{} leads waiting for followup ({} overdue by 2+ weeks).",
            leads.len(),
            overdue
        );
        if let (Some(first), Some(last)) = (contact_dates.iter().min(), contact_dates.iter().max()) {
            issue.push_str(&format!(
                " Last contact dates range from {} to {}, blocking pipeline movement",
                first.format("%-m/%-d"),
                last.format("%-m/%-d")
            ));
        }

        self.add(
            "followup-backlog",
            Priority::High,
            "leads",
            issue,
            "Clear the backlog: (1) Tier leads: A = contacted <7 days, B = 7-14 days, C = >14 days; (2) This week, call every C-tier lead with a personal apology and a fresh quote; (3) Add a CRM rule so every quoted lead gets an automatic follow-up on Day 7 and Day 14; (4) Hold a weekly pipeline review covering each quoted lead's blocker".to_string(),
            "1hr",
            "Expected to convert 3-5 of stalled leads = $15-30K in revenue",
        );
    }

    fn content_depth(&mut self) {
        let posthog = &self.report.posthog;
        let Some(top) = posthog.top_pages.first() else {
            return;
        };

        let homepage_views = if top.url == "/" { top.views } else { 0 };
        let other_views: u64 = posthog.top_pages.iter().skip(1).map(|p| p.views).sum();
        if homepage_views == 0 || (homepage_views as f64) <= other_views as f64 / 2.0 {
            return;
        }

        let total_views = posthog.total_pageviews_7d;
        let new_leads = self.report.airtable.new_leads_7d;
        self.add(
            "homepage-bounce",
            Priority::Medium,
            "content",
            format!(
                "Homepage dominates traffic ({}% of views, {} in {} days) but {}% overall conversion rate suggests high bounce. Visitors land and leave without exploring",
                percent(homepage_views, total_views),
                homepage_views,
                self.report.period_days,
                percent(new_leads, total_views)
            ),
            "Redesign the homepage for depth: (1) Above the fold, one hero section with a single 'See Packages' CTA; (2) Add a social proof section with video testimonials; (3) Add a 'Popular Itineraries' carousel linking to /itineraries; (4) Feature the top blog posts; (5) A/B test against the current page and measure downstream traffic to package and itinerary pages".to_string(),
            "1hr",
            "Expected to drive +30-40% deeper navigation = 25-40 more leads/month",
        );
    }

    fn traffic_sources(&mut self) {
        let mut organic = 0u64;
        let mut direct = 0u64;
        for source in &self.report.posthog.traffic_sources {
            if source.source.to_lowercase().contains("google") {
                organic += source.sessions;
            } else if source.source == "$direct" || source.source == "direct" {
                direct += source.sessions;
            }
        }

        let total = organic + direct;
        if total <= SEO_MIN_SESSIONS || percent(organic, total) >= SEO_ORGANIC_SHARE {
            return;
        }

        let comparison = if organic == 0 {
            format!("Direct traffic ({} sessions) with no Google traffic at all", direct)
        } else {
            format!(
                "Direct traffic ({} sessions) is {}% of Google traffic ({} sessions)",
                direct,
                percent(direct, organic),
                organic
            )
        };

        self.add(
            "seo-gap",
            Priority::Medium,
            "seo",
            format!("SEO needs work: {}. Indicates weak organic ranking", comparison),
            "SEO quick wins: (1) Audit the top 5 pages for keyword targets and add schema markup (LocalBusiness, FAQ); (2) Publish 3 search-focused blog posts on venues, 3-day plans and destination comparisons; (3) Link from the homepage to the top 3 pages; (4) Check Core Web Vitals in Google Search Console".to_string(),
            "half-day",
            "Expected +30% organic traffic in 60 days (100+ new sessions)",
        );
    }
}

/// Accepts RFC 3339 timestamps, plain dates (midnight UTC), and naive
/// `YYYY-MM-DDTHH:MM:SS` read as UTC.
pub fn parse_contact_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

pub struct AnalyzerPipeline<S: Storage> {
    storage: S,
    report_file: String,
    proposals_file: String,
    write_csv: bool,
    now: Option<DateTime<Utc>>,
}

impl<S: Storage> AnalyzerPipeline<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            report_file: "daily-report.json".to_string(),
            proposals_file: "proposals.json".to_string(),
            write_csv: false,
            now: None,
        }
    }

    pub fn with_files(mut self, report_file: impl Into<String>, proposals_file: impl Into<String>) -> Self {
        self.report_file = report_file.into();
        self.proposals_file = proposals_file.into();
        self
    }

    /// Also write the proposals as CSV next to the JSON file.
    pub fn with_csv(mut self, enabled: bool) -> Self {
        self.write_csv = enabled;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn csv_file(&self) -> String {
        match self.proposals_file.strip_suffix(".json") {
            Some(stem) => format!("{}.csv", stem),
            None => format!("{}.csv", self.proposals_file),
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for AnalyzerPipeline<S> {
    type Extracted = DailyReport;
    type Transformed = ProposalSet;

    async fn extract(&self) -> Result<DailyReport> {
        let bytes = self.storage.read_file(&self.report_file).await?;
        let report: DailyReport = serde_json::from_slice(&bytes)?;
        tracing::debug!("Loaded report generated at {}", report.generated_at);
        Ok(report)
    }

    async fn transform(&self, report: DailyReport) -> Result<ProposalSet> {
        let now = self.now.unwrap_or_else(Utc::now);
        let proposals = MarketingAnalyzer::new(&report, now).analyze();
        tracing::info!("Generated {} proposals", proposals.len());
        Ok(ProposalSet {
            generated_at: now.to_rfc3339(),
            proposals,
        })
    }

    async fn load(&self, set: ProposalSet) -> Result<String> {
        let json = serde_json::to_vec_pretty(&set)?;
        self.storage.write_file(&self.proposals_file, &json).await?;

        if self.write_csv {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for proposal in &set.proposals {
                writer.serialize(proposal)?;
            }
            let data = writer
                .into_inner()
                .map_err(|e| PulseError::processing(format!("CSV buffer: {}", e)))?;
            let csv_file = self.csv_file();
            self.storage.write_file(&csv_file, &data).await?;
            tracing::debug!("Wrote {}", self.storage.locate(&csv_file));
        }

        Ok(self.storage.locate(&self.proposals_file))
    }
}

/// Console listing printed after `leadpulse analyze`.
pub fn render_proposals(set: &ProposalSet, business_name: &str) -> String {
    let heavy = "=".repeat(80);
    let light = "-".repeat(80);
    let count = |priority: Priority| set.proposals.iter().filter(|p| p.priority == priority).count();

    let mut out = format!(
        "{heavy}\n{} AI Marketing Analysis\nGenerated: {}\n{heavy}\n\n📊 SUMMARY\n  Total Proposals: {}\n  High Priority: {}\n  Medium Priority: {}\n\n{light}\n\n",
        business_name,
        set.generated_at,
        set.proposals.len(),
        count(Priority::High),
        count(Priority::Medium),
    );

    for (i, proposal) in set.proposals.iter().enumerate() {
        out.push_str(&format!(
            "🎯 PROPOSAL {}: {}\n   Priority: {} | Category: {}\n   Issue: {}\n   Solution: {}\n   Effort: {} | Impact: {}\n\n{light}\n\n",
            i + 1,
            proposal.id.to_uppercase(),
            proposal.priority.as_str().to_uppercase(),
            proposal.category.to_uppercase(),
            proposal.issue,
            proposal.solution,
            proposal.effort,
            proposal.expected_impact,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        AnalyticsSummary, CrmSummary, FollowupLead, PageCount, PipelineCounts, SourceCount,
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn lead(last_contact: &str) -> FollowupLead {
        FollowupLead {
            name: "Lead".to_string(),
            status: "talked to/ quoted".to_string(),
            last_contact: last_contact.to_string(),
        }
    }

    fn ids(proposals: &[Proposal]) -> Vec<&str> {
        proposals.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_quiet_report_yields_nothing() {
        let report = DailyReport::default();
        assert!(MarketingAnalyzer::new(&report, now()).analyze().is_empty());
    }

    #[test]
    fn test_ad_conversion_rule() {
        let report = DailyReport {
            posthog: AnalyticsSummary {
                ad_landing_pages: vec![
                    PageCount { url: "/bachelor-party-a-v2/".into(), views: 48 },
                    PageCount { url: "/packages/".into(), views: 12 },
                ],
                ..Default::default()
            },
            airtable: CrmSummary {
                new_leads_7d: 6,
                ..Default::default()
            },
            ..Default::default()
        };

        let proposals = MarketingAnalyzer::new(&report, now()).analyze();

        assert_eq!(ids(&proposals), vec!["low-conversion-ad-landing-1"]);
        assert!(proposals[0].issue.contains("/bachelor-party-a-v2/ gets 48 clicks/week"));
        assert!(proposals[0].issue.contains("conversion rate ~10%"));
    }

    #[test]
    fn test_zero_closes_rule_mentions_month_and_value() {
        let report = DailyReport {
            airtable: CrmSummary {
                pipeline: PipelineCounts { quoted: 16, ..Default::default() },
                total_pipeline_value: 7_500_000.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let proposals = MarketingAnalyzer::new(&report, now()).analyze();

        assert_eq!(ids(&proposals), vec!["zero-closes-quoted-1"]);
        assert!(proposals[0].issue.contains("$7,500,000"));
        assert!(proposals[0].solution.contains("March party quote"));
        assert!(proposals[0].solution.contains("Hi {name}"));
    }

    #[test]
    fn test_followup_rule_counts_overdue_and_skips_unparseable() {
        let report = DailyReport {
            airtable: CrmSummary {
                leads_needing_followup: vec![
                    lead("2026-01-06"),
                    lead("2026-02-24"),
                    lead("2026-02-10T15:30:00.000Z"),
                    lead("Unknown"),
                ],
                ..Default::default()
            },
            ..Default::default()
        };

        let proposals = MarketingAnalyzer::new(&report, now()).analyze();

        assert_eq!(ids(&proposals), vec!["followup-backlog-1"]);
        assert!(proposals[0].issue.starts_with("4 leads waiting for followup (2 overdue"));
        assert!(proposals[0].issue.contains("range from 1/6 to 2/24"));
    }

    #[test]
    fn test_homepage_rule() {
        let report = DailyReport {
            posthog: AnalyticsSummary {
                total_pageviews_7d: 400,
                top_pages: vec![
                    PageCount { url: "/".into(), views: 200 },
                    PageCount { url: "/packages/".into(), views: 100 },
                    PageCount { url: "/blog/".into(), views: 50 },
                ],
                ..Default::default()
            },
            airtable: CrmSummary {
                new_leads_7d: 8,
                ..Default::default()
            },
            ..Default::default()
        };

        let proposals = MarketingAnalyzer::new(&report, now()).analyze();

        assert_eq!(ids(&proposals), vec!["homepage-bounce-1"]);
        assert!(proposals[0].issue.contains("(50% of views, 200 in 7 days) but 2%"));
    }

    #[test]
    fn test_homepage_rule_needs_root_on_top() {
        let report = DailyReport {
            posthog: AnalyticsSummary {
                total_pageviews_7d: 400,
                top_pages: vec![
                    PageCount { url: "/packages/".into(), views: 200 },
                    PageCount { url: "/".into(), views: 150 },
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(MarketingAnalyzer::new(&report, now()).analyze().is_empty());
    }

    #[test]
    fn test_seo_rule_without_google_traffic() {
        let report = DailyReport {
            posthog: AnalyticsSummary {
                traffic_sources: vec![SourceCount { source: "$direct".into(), sessions: 150 }],
                ..Default::default()
            },
            ..Default::default()
        };

        let proposals = MarketingAnalyzer::new(&report, now()).analyze();

        assert_eq!(ids(&proposals), vec!["seo-gap-1"]);
        assert!(proposals[0].issue.contains("no Google traffic at all"));
    }

    #[test]
    fn test_seo_rule_quiet_when_organic_dominates() {
        let report = DailyReport {
            posthog: AnalyticsSummary {
                traffic_sources: vec![
                    SourceCount { source: "www.google.com".into(), sessions: 90 },
                    SourceCount { source: "direct".into(), sessions: 40 },
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(MarketingAnalyzer::new(&report, now()).analyze().is_empty());
    }

    #[test]
    fn test_proposals_sorted_by_priority_with_sequential_ids() {
        let report = DailyReport {
            posthog: AnalyticsSummary {
                total_pageviews_7d: 100,
                top_pages: vec![PageCount { url: "/".into(), views: 100 }],
                traffic_sources: vec![
                    SourceCount { source: "Google".into(), sessions: 20 },
                    SourceCount { source: "$direct".into(), sessions: 100 },
                ],
                ..Default::default()
            },
            airtable: CrmSummary {
                pipeline: PipelineCounts { quoted: 20, ..Default::default() },
                ..Default::default()
            },
            ..Default::default()
        };

        let proposals = MarketingAnalyzer::new(&report, now()).analyze();

        assert_eq!(
            ids(&proposals),
            vec!["zero-closes-quoted-1", "homepage-bounce-2", "seo-gap-3"]
        );
        assert_eq!(proposals[0].priority, Priority::High);
        assert!(proposals[2].issue.contains("is 500% of Google traffic"));
    }

    #[test]
    fn test_parse_contact_time_formats() {
        let at = |h, m| Some(Utc.with_ymd_and_hms(2026, 2, 10, h, m, 0).unwrap());
        assert_eq!(parse_contact_time("2026-02-10"), at(0, 0));
        assert_eq!(parse_contact_time("2026-02-10T08:00:00Z"), at(8, 0));
        assert_eq!(parse_contact_time("2026-02-10T10:30:00+02:00"), at(8, 30));
        assert_eq!(parse_contact_time("2026-02-10T08:00:00"), at(8, 0));
        assert_eq!(parse_contact_time("Unknown"), None);
    }

    #[test]
    fn test_overdue_uses_full_elapsed_time() {
        // now() is 2026-03-01 09:00 UTC: 15 calendar days after the 14th for both.
        let report = DailyReport {
            airtable: CrmSummary {
                leads_needing_followup: vec![
                    lead("2026-02-14T20:00:00Z"),
                    lead("2026-02-14T08:00:00Z"),
                    lead("Unknown"),
                    lead(""),
                ],
                ..Default::default()
            },
            ..Default::default()
        };

        let proposals = MarketingAnalyzer::new(&report, now()).analyze();

        assert!(proposals[0].issue.starts_with("4 leads waiting for followup (1 overdue"));
        assert!(proposals[0].issue.contains("range from 2/14 to 2/14"));
    }

    #[test]
    fn test_render_proposals_lists_each() {
        let set = ProposalSet {
            generated_at: "2026-03-01T09:00:00+00:00".to_string(),
            proposals: vec![Proposal {
                id: "seo-gap-1".into(),
                priority: Priority::Medium,
                category: "seo".into(),
                issue: "issue".into(),
                solution: "solution".into(),
                effort: "1hr".into(),
                expected_impact: "impact".into(),
            }],
        };
        let text = render_proposals(&set, "Connected Montreal");
        assert!(text.contains("\nConnected Montreal AI Marketing Analysis\n"));
        assert!(text.contains("Total Proposals: 1"));
        assert!(text.contains("🎯 PROPOSAL 1: SEO-GAP-1"));
        assert!(text.contains("Priority: MEDIUM | Category: SEO"));
    }
}
