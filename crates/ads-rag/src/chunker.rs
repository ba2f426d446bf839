use ads_core::format::{format_count, format_currency, format_number, title_case_key};
use ads_core::{
    AnomalyRecord, Campaign, CampaignDataset, Chunk, ChunkMetadata, ChunkType, DailyMetrics,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Which chunk categories a build produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub overview: bool,
    pub daily: bool,
    pub insights: bool,
    pub comparison: bool,
    pub global: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            overview: true,
            daily: true,
            insights: true,
            comparison: true,
            global: true,
        }
    }
}

/// Renders a campaign dataset into retrievable text chunks.
///
/// Output order is fixed: overviews, daily records, insights, industry
/// comparisons, then global sections. Ids depend only on chunk type,
/// campaign id, date and industry, so rebuilding the same data yields the
/// same ids.
pub struct CampaignChunker<'a> {
    dataset: &'a CampaignDataset,
    config: ChunkerConfig,
}

impl<'a> CampaignChunker<'a> {
    pub fn new(dataset: &'a CampaignDataset, config: ChunkerConfig) -> Self {
        Self { dataset, config }
    }

    pub fn create_all_chunks(&self) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        if self.config.overview {
            self.overview_chunks(&mut chunks);
        }
        if self.config.daily {
            self.daily_chunks(&mut chunks);
        }
        if self.config.insights {
            self.insight_chunks(&mut chunks);
        }
        if self.config.comparison {
            self.comparison_chunks(&mut chunks);
        }
        if self.config.global {
            self.global_chunks(&mut chunks);
        }
        debug!(
            campaigns = self.dataset.campaigns().len(),
            chunks = chunks.len(),
            "campaign data chunked"
        );
        chunks
    }

    fn overview_chunks(&self, out: &mut Vec<Chunk>) {
        for campaign in self.dataset.campaigns() {
            out.push(Chunk {
                id: format!("overview_{}", campaign.id),
                content: overview_text(campaign),
                metadata: campaign_metadata(ChunkType::CampaignOverview, campaign)
                    .with("status", campaign.status.as_ref().map(|s| s.as_str().to_string()))
                    .with("objective", campaign.objective.clone()),
            });
        }
    }

    fn daily_chunks(&self, out: &mut Vec<Chunk>) {
        for campaign in self.dataset.campaigns() {
            for (date, metrics) in &campaign.daily_performance {
                out.push(Chunk {
                    id: format!("daily_{}_{}", campaign.id, date),
                    content: daily_text(campaign, date, metrics),
                    metadata: campaign_metadata(ChunkType::DailyPerformance, campaign)
                        .with("date", date.as_str())
                        .with("metrics", json!(metrics.metric_names()))
                        .with("spend", metrics.spend)
                        .with("roas", metrics.roas)
                        .with("cpm", metrics.cpm)
                        .with("ctr", metrics.ctr),
                });
            }
        }
    }

    fn insight_chunks(&self, out: &mut Vec<Chunk>) {
        for campaign in self.dataset.campaigns() {
            if campaign.insights.is_empty() {
                continue;
            }
            let keys: Vec<&String> = campaign.insights.keys().collect();
            out.push(Chunk {
                id: format!("insights_{}", campaign.id),
                content: insights_text(campaign),
                metadata: campaign_metadata(ChunkType::CampaignInsights, campaign)
                    .with("insights_keys", json!(keys)),
            });
        }
    }

    fn comparison_chunks(&self, out: &mut Vec<Chunk>) {
        // keyed by the id slug; the first spelling seen is the display name
        let mut by_industry: IndexMap<String, (&str, Vec<&Campaign>)> = IndexMap::new();
        for campaign in self.dataset.campaigns() {
            let industry = campaign.industry.as_deref().unwrap_or("Unknown");
            by_industry
                .entry(industry.to_lowercase().replace(' ', "_"))
                .or_insert_with(|| (industry, Vec::new()))
                .1
                .push(campaign);
        }

        for (slug, (industry, campaigns)) in by_industry {
            if campaigns.len() < 2 {
                continue;
            }
            let ids: Vec<&str> = campaigns.iter().map(|c| c.id.as_str()).collect();
            let names: Vec<&str> = campaigns.iter().map(|c| c.name.as_str()).collect();
            out.push(Chunk {
                id: format!("comparison_{}", slug),
                content: comparison_text(industry, &campaigns),
                metadata: ChunkMetadata::new(ChunkType::IndustryComparison)
                    .with("industry", industry)
                    .with("campaign_count", campaigns.len())
                    .with("campaign_ids", json!(ids))
                    .with("campaign_names", json!(names)),
            });
        }
    }

    fn global_chunks(&self, out: &mut Vec<Chunk>) {
        let global = self.dataset.global_insights();
        let sections = [
            (
                "global_market_trends",
                ChunkType::MarketTrends,
                global.market_trends.as_ref(),
                "Market trends and analysis: ",
            ),
            (
                "global_best_practices",
                ChunkType::BestPractices,
                global.best_practices.as_ref(),
                "Best practices and recommendations: ",
            ),
        ];
        for (id, chunk_type, section, prefix) in sections {
            let Some(section) = section.filter(|s| !s.is_empty()) else {
                continue;
            };
            out.push(Chunk {
                id: id.to_string(),
                content: keyed_section_text(prefix, section),
                metadata: ChunkMetadata::new(chunk_type).with("data_type", "global_insights"),
            });
        }

        if let Some(anomalies) = global.anomalies_detected.as_ref().filter(|a| !a.is_empty()) {
            out.push(Chunk {
                id: "global_anomalies".to_string(),
                content: anomalies_text(anomalies),
                metadata: ChunkMetadata::new(ChunkType::Anomalies)
                    .with("data_type", "global_insights"),
            });
        }
    }
}

pub fn chunks_of_type(chunks: &[Chunk], chunk_type: ChunkType) -> Vec<&Chunk> {
    chunks
        .iter()
        .filter(|c| c.metadata.chunk_type == chunk_type)
        .collect()
}

pub fn chunks_for_campaign<'c>(chunks: &'c [Chunk], campaign_id: &str) -> Vec<&'c Chunk> {
    chunks
        .iter()
        .filter(|c| c.metadata.campaign_id() == Some(campaign_id))
        .collect()
}

fn campaign_metadata(chunk_type: ChunkType, campaign: &Campaign) -> ChunkMetadata {
    ChunkMetadata::new(chunk_type)
        .with("campaign_id", campaign.id.as_str())
        .with("campaign_name", campaign.name.as_str())
        .with("industry", campaign.industry.clone())
        .with("audience", campaign.audience.clone())
}

fn overview_text(campaign: &Campaign) -> String {
    let mut first = format!("Campaign '{}' is a", campaign.name);
    match &campaign.objective {
        Some(objective) => first.push_str(&format!(" {} campaign", objective)),
        None => first.push_str(" campaign"),
    }
    if let Some(industry) = &campaign.industry {
        first.push_str(&format!(" in the {} industry", industry));
    }
    if let Some(audience) = &campaign.audience {
        first.push_str(&format!(" targeting {}", audience));
    }
    first.push('.');

    let mut sentences = vec![first];
    if let Some(status) = &campaign.status {
        sentences.push(format!("Current status: {}.", status));
    }
    if let Some(budget) = &campaign.budget {
        let mut parts = Vec::new();
        if let Some(daily) = budget.daily_budget {
            parts.push(format!("Daily budget: {}", format_currency(daily)));
        }
        if let Some(total) = budget.total_budget {
            parts.push(format!("Total budget: {}", format_currency(total)));
        }
        if !parts.is_empty() {
            sentences.push(format!("{}.", parts.join(", ")));
        }
    }
    if let Some(targeting) = &campaign.targeting {
        if let (Some(min), Some(max)) = (targeting.age_min, targeting.age_max) {
            sentences.push(format!("Targeting ages {}-{}.", min, max));
        }
        if !targeting.interests.is_empty() {
            sentences.push(format!(
                "Interest targeting: {}.",
                targeting.interests.join(", ")
            ));
        }
        if !targeting.placements.is_empty() {
            sentences.push(format!("Ad placements: {}.", targeting.placements.join(", ")));
        }
    }
    sentences.join(" ")
}

fn daily_text(campaign: &Campaign, date: &str, m: &DailyMetrics) -> String {
    let mut text = format!(
        "On {}, campaign '{}' generated {} impressions and {} clicks, spending ${:.2}. \
         This resulted in {} conversions. \
         Key metrics: CTR {:.1}%, CPM ${:.2}, CPC ${:.2}, ROAS {:.1}x, Frequency {:.1}.",
        date,
        campaign.name,
        format_number(m.impressions),
        format_number(m.clicks),
        m.spend,
        format_count(m.conversions),
        m.ctr,
        m.cpm,
        m.cpc,
        m.roas,
        m.frequency,
    );
    if let Some(reach) = m.reach {
        text.push_str(&format!(" Reach: {} people.", format_number(reach)));
    }
    text
}

fn insights_text(campaign: &Campaign) -> String {
    keyed_section_text(
        &format!("Insights for campaign '{}': ", campaign.name),
        &campaign.insights,
    )
}

fn comparison_text(industry: &str, campaigns: &[&Campaign]) -> String {
    let mut text = format!("Industry comparison for {} campaigns: ", industry);
    for campaign in campaigns {
        // campaigns without daily data have no latest figures to report
        let Some((_, latest)) = campaign.latest_performance() else {
            continue;
        };
        let status = campaign
            .status
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or("status unknown");
        text.push_str(&format!(
            "'{}' ({}) shows ROAS of {:.1}x with CPM of ${:.2}. ",
            campaign.name, status, latest.roas, latest.cpm
        ));
    }
    text.trim_end().to_string()
}

fn anomalies_text(anomalies: &IndexMap<String, Value>) -> String {
    let mut text = String::from("Detected anomalies and issues: ");
    for (name, details) in anomalies {
        let Some(record) = AnomalyRecord::from_value(details) else {
            continue;
        };
        text.push_str(&format!(
            "{} on {} in '{}': {}. Resolution: {}. ",
            title_case_key(name),
            record.date.as_deref().unwrap_or("Unknown date"),
            record.campaign.as_deref().unwrap_or("Unknown campaign"),
            record.issue.as_deref().unwrap_or("Unknown issue"),
            record.resolution.as_deref().unwrap_or("No resolution provided"),
        ));
    }
    text.trim_end().to_string()
}

/// `"<prefix>Key One: value. Key Two: a, b."`
fn keyed_section_text(prefix: &str, entries: &IndexMap<String, Value>) -> String {
    let mut text = prefix.to_string();
    for (key, value) in entries {
        if let Some(rendered) = render_value(value) {
            text.push_str(&format!("{}: {}. ", title_case_key(key), rendered));
        }
    }
    text.trim_end().to_string()
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(render_value).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter_map(|(k, v)| {
                    render_value(v).map(|r| format!("{} {}", title_case_key(k), r))
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const DATA: &str = r#"{
        "campaigns": [
            {
                "id": "fb_001", "name": "Holiday Fashion", "objective": "CONVERSIONS",
                "status": "ACTIVE", "industry": "Fashion", "audience": "Lookalike 1%",
                "budget": {"daily_budget": 1500, "total_budget": 45000},
                "targeting": {"age_min": 25, "age_max": 44, "interests": ["fashion", "shopping"], "placements": ["feed", "stories"]},
                "daily_performance": {
                    "2024-11-28": {"impressions": 120000, "clicks": 2400, "spend": 1450.5, "conversions": 48,
                                   "ctr": 2.0, "cpm": 12.09, "cpc": 0.6, "roas": 3.2, "frequency": 1.8},
                    "2024-11-29": {"impressions": 98000, "clicks": 1500, "spend": 1620.0, "conversions": 30,
                                   "ctr": 1.53, "cpm": 16.53, "cpc": 1.08, "roas": 2.1, "frequency": 2.6, "reach": 37692}
                },
                "insights": {"top_creative": "carousel", "recommendations": ["refresh creative", "cap frequency"]}
            },
            {
                "id": "fb_002", "name": "Spring Basics", "status": "PAUSED", "industry": "Fashion",
                "daily_performance": {}
            },
            {
                "id": "fb_003", "name": "Gadget Drop", "objective": "TRAFFIC", "industry": "Consumer Electronics",
                "daily_performance": {
                    "2024-11-29": {"impressions": 5000, "clicks": 100, "spend": 80.0, "conversions": 2,
                                   "ctr": 2.0, "cpm": 16.0, "cpc": 0.8, "roas": 1.5, "frequency": 1.1}
                }
            }
        ],
        "global_insights": {
            "market_trends": {"cpm_trend": "CPMs rise 30% in Q4", "top_channels": ["reels", "feed"]},
            "best_practices": {},
            "anomalies_detected": {
                "cpm_spike": {"date": "2024-11-29", "campaign": "Holiday Fashion", "issue": "CPM up 37%"},
                "note": "ignored"
            }
        }
    }"#;

    fn dataset() -> CampaignDataset {
        CampaignDataset::from_json_str("test", DATA).unwrap()
    }

    fn by_id<'c>(chunks: &'c [Chunk], id: &str) -> &'c Chunk {
        chunks.iter().find(|c| c.id == id).unwrap()
    }

    #[test]
    fn produces_every_category() {
        let ds = dataset();
        let chunks = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "overview_fb_001",
                "overview_fb_002",
                "overview_fb_003",
                "daily_fb_001_2024-11-28",
                "daily_fb_001_2024-11-29",
                "daily_fb_003_2024-11-29",
                "insights_fb_001",
                "comparison_fashion",
                "global_market_trends",
                "global_anomalies",
            ]
        );
        assert!(chunks.len() >= ds.campaigns().len());
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn rebuild_is_deterministic() {
        let ds = dataset();
        let a = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();
        let b = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();
        assert_eq!(a, b);
    }

    #[test]
    fn overview_omits_missing_fields() {
        let ds = dataset();
        let chunks = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();
        let full = by_id(&chunks, "overview_fb_001");
        assert_eq!(
            full.content,
            "Campaign 'Holiday Fashion' is a CONVERSIONS campaign in the Fashion industry targeting Lookalike 1%. \
             Current status: ACTIVE. Daily budget: $1,500.00, Total budget: $45,000.00. \
             Targeting ages 25-44. Interest targeting: fashion, shopping. Ad placements: feed, stories."
        );
        let sparse = by_id(&chunks, "overview_fb_003");
        assert_eq!(
            sparse.content,
            "Campaign 'Gadget Drop' is a TRAFFIC campaign in the Consumer Electronics industry."
        );
        assert!(!sparse.content.contains("Unknown"));
    }

    #[test]
    fn daily_text_uses_fixed_formatting() {
        let ds = dataset();
        let chunks = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();
        let day = by_id(&chunks, "daily_fb_001_2024-11-28");
        assert_eq!(
            day.content,
            "On 2024-11-28, campaign 'Holiday Fashion' generated 120,000 impressions and 2,400 clicks, \
             spending $1450.50. This resulted in 48 conversions. Key metrics: CTR 2.0%, CPM $12.09, \
             CPC $0.60, ROAS 3.2x, Frequency 1.8."
        );
        assert_eq!(day.metadata.get_str("date"), Some("2024-11-28"));
        assert_eq!(day.metadata.campaign_id(), Some("fb_001"));

        let with_reach = by_id(&chunks, "daily_fb_001_2024-11-29");
        assert!(with_reach.content.ends_with("Reach: 37,692 people."));
    }

    #[test]
    fn comparison_uses_latest_day_and_skips_empty_campaigns() {
        let ds = dataset();
        let chunks = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();
        let cmp = by_id(&chunks, "comparison_fashion");
        assert_eq!(
            cmp.content,
            "Industry comparison for Fashion campaigns: 'Holiday Fashion' (ACTIVE) shows ROAS of 2.1x with CPM of $16.53."
        );
        assert_eq!(cmp.metadata.get("campaign_count"), Some(&json!(2)));
        // a lone campaign does not get a comparison chunk
        assert!(!chunks.iter().any(|c| c.id == "comparison_consumer_electronics"));
    }

    #[test]
    fn insights_and_global_sections() {
        let ds = dataset();
        let chunks = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();
        assert_eq!(
            by_id(&chunks, "insights_fb_001").content,
            "Insights for campaign 'Holiday Fashion': Top Creative: carousel. Recommendations: refresh creative, cap frequency."
        );
        assert_eq!(
            by_id(&chunks, "global_market_trends").content,
            "Market trends and analysis: Cpm Trend: CPMs rise 30% in Q4. Top Channels: reels, feed."
        );
        assert_eq!(
            by_id(&chunks, "global_anomalies").content,
            "Detected anomalies and issues: Cpm Spike on 2024-11-29 in 'Holiday Fashion': CPM up 37%. Resolution: No resolution provided."
        );
    }

    #[test]
    fn categories_can_be_toggled() {
        let ds = dataset();
        let config = ChunkerConfig {
            daily: false,
            global: false,
            ..ChunkerConfig::default()
        };
        let chunks = CampaignChunker::new(&ds, config).create_all_chunks();
        assert!(chunks_of_type(&chunks, ChunkType::DailyPerformance).is_empty());
        assert!(chunks_of_type(&chunks, ChunkType::MarketTrends).is_empty());
        assert_eq!(chunks_of_type(&chunks, ChunkType::CampaignOverview).len(), 3);
        assert_eq!(chunks_for_campaign(&chunks, "fb_001").len(), 2);
    }

    #[test]
    fn empty_dataset_yields_no_chunks() {
        let ds = CampaignDataset::default();
        assert!(CampaignChunker::new(&ds, ChunkerConfig::default())
            .create_all_chunks()
            .is_empty());
    }

    #[test]
    fn industry_spellings_share_one_comparison() {
        let day = r#"{"2024-11-29": {"impressions": 1000, "clicks": 20, "spend": 10.0, "conversions": 1,
                      "ctr": 2.0, "cpm": 10.0, "cpc": 0.5, "roas": 2.0, "frequency": 1.0}}"#;
        let spellings = [("a", "Fashion"), ("b", "Fashion"), ("c", "fashion"), ("d", "fashion")];
        let campaigns: Vec<String> = spellings
            .iter()
            .map(|(id, industry)| {
                format!(
                    r#"{{"id": "{id}", "name": "Camp {id}", "industry": "{industry}",
                        "daily_performance": {day}}}"#
                )
            })
            .collect();
        let data = format!(r#"{{"campaigns": [{}]}}"#, campaigns.join(","));
        let ds = CampaignDataset::from_json_str("test", &data).unwrap();
        let chunks = CampaignChunker::new(&ds, ChunkerConfig::default()).create_all_chunks();

        let comparisons = chunks_of_type(&chunks, ChunkType::IndustryComparison);
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].id, "comparison_fashion");
        assert_eq!(comparisons[0].metadata.get("campaign_count"), Some(&json!(4)));
        assert_eq!(comparisons[0].metadata.get("industry"), Some(&json!("Fashion")));

        let ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), chunks.len());
    }
}
