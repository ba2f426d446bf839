use std::collections::BTreeMap;
use std::path::Path;

use ads_error::{AdsError, ErrorMetadataBuilder, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{null_as_default, Campaign, CampaignStatus, DailyMetrics, GlobalInsights};

/// The `{"campaigns": [...], "global_insights": {...}}` document a data source supplies.
/// Immutable once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignDataset {
    #[serde(default, deserialize_with = "null_as_default")]
    pub campaigns: Vec<Campaign>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub global_insights: GlobalInsights,
}

/// One flattened (campaign, day) record.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceRow {
    pub campaign_id: String,
    pub campaign_name: String,
    pub industry: Option<String>,
    pub audience: Option<String>,
    pub status: Option<CampaignStatus>,
    pub date: String,
    pub metrics: DailyMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_campaigns: usize,
    pub active_campaigns: usize,
    pub total_spend: f64,
    pub total_conversions: f64,
    pub total_impressions: f64,
    /// Spend-weighted ROAS over every daily record
    pub average_roas: f64,
}

impl CampaignDataset {
    pub fn from_json_str(source_name: &str, raw: &str) -> Result<Self> {
        let mut dataset: CampaignDataset = serde_json::from_str(raw)
            .map_err(|e| AdsError::data_shape(source_name, e.to_string()))?;
        dataset.normalize_dates();
        info!(
            source = %source_name,
            campaigns = dataset.campaigns.len(),
            "campaign data loaded"
        );
        Ok(dataset)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AdsError::data_shape(&source_name, "data file not found")
            }
            _ => AdsError::Io {
                operation: format!("read {}", source_name),
                message: e.to_string(),
            },
        })?;
        Self::from_json_str(&source_name, &raw)
    }

    /// Like `load`, but a missing or malformed source yields an empty dataset.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(dataset) => dataset,
            Err(err) => {
                let metadata = ErrorMetadataBuilder::new("dataset")
                    .operation("load")
                    .context("path", &path.display().to_string())
                    .build(&err);
                err.log(&metadata);
                Self::default()
            }
        }
    }

    /// Re-keys every daily record by zero-padded ISO date; unparseable keys are dropped.
    fn normalize_dates(&mut self) {
        for campaign in &mut self.campaigns {
            let raw = std::mem::take(&mut campaign.daily_performance);
            let mut normalized = BTreeMap::new();
            for (key, metrics) in raw {
                match normalize_date(&key) {
                    Some(iso) => {
                        if normalized.insert(iso.clone(), metrics).is_some() {
                            warn!(
                                campaign_id = %campaign.id,
                                date = %iso,
                                "duplicate date after normalisation"
                            );
                        }
                    }
                    None => {
                        warn!(
                            campaign_id = %campaign.id,
                            date = %key,
                            "dropping unparseable date key"
                        );
                    }
                }
            }
            campaign.daily_performance = normalized;
        }
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    pub fn global_insights(&self) -> &GlobalInsights {
        &self.global_insights
    }

    pub fn campaign_by_id(&self, campaign_id: &str) -> Option<&Campaign> {
        self.campaigns.iter().find(|c| c.id == campaign_id)
    }

    pub fn campaigns_by_industry(&self, industry: &str) -> Vec<&Campaign> {
        self.campaigns
            .iter()
            .filter(|c| {
                c.industry
                    .as_deref()
                    .is_some_and(|i| i.eq_ignore_ascii_case(industry))
            })
            .collect()
    }

    pub fn campaigns_by_audience(&self, audience: &str) -> Vec<&Campaign> {
        let needle = audience.to_lowercase();
        self.campaigns
            .iter()
            .filter(|c| {
                c.audience
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Case-insensitive substring search over name, industry, audience and targeting.
    pub fn search_campaigns(&self, query: &str) -> Vec<&Campaign> {
        let needle = query.to_lowercase();
        self.campaigns
            .iter()
            .filter(|c| searchable_text(c).contains(&needle))
            .collect()
    }

    pub fn performance_rows(&self) -> Vec<PerformanceRow> {
        let mut rows: Vec<PerformanceRow> = self
            .campaigns
            .iter()
            .flat_map(|c| {
                c.daily_performance.iter().map(move |(date, metrics)| PerformanceRow {
                    campaign_id: c.id.clone(),
                    campaign_name: c.name.clone(),
                    industry: c.industry.clone(),
                    audience: c.audience.clone(),
                    status: c.status.clone(),
                    date: date.clone(),
                    metrics: metrics.clone(),
                })
            })
            .collect();
        // dates are already ordered within a campaign
        rows.sort_by(|a, b| a.campaign_id.cmp(&b.campaign_id));
        rows
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let mut summary = PerformanceSummary {
            total_campaigns: self.campaigns.len(),
            ..Default::default()
        };
        let mut weighted_return = 0.0;
        for campaign in &self.campaigns {
            if campaign.is_active() {
                summary.active_campaigns += 1;
            }
            for metrics in campaign.daily_performance.values() {
                summary.total_spend += metrics.spend;
                summary.total_conversions += metrics.conversions;
                summary.total_impressions += metrics.impressions;
                weighted_return += metrics.roas * metrics.spend;
            }
        }
        if summary.total_spend > 0.0 {
            summary.average_roas = weighted_return / summary.total_spend;
        }
        summary
    }
}

/// Parses `YYYY-MM-DD`, `YYYY/MM/DD` or a timestamp with such a prefix into zero-padded ISO form.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
            .ok()
    };
    let date = parse(raw).or_else(|| {
        raw.split(['T', ' '])
            .next()
            .filter(|prefix| prefix.len() < raw.len())
            .and_then(parse)
    })?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn searchable_text(campaign: &Campaign) -> String {
    let mut parts: Vec<&str> = vec![campaign.name.as_str()];
    parts.extend(campaign.industry.as_deref());
    parts.extend(campaign.audience.as_deref());
    if let Some(t) = &campaign.targeting {
        parts.extend(t.interests.iter().map(String::as_str));
        parts.extend(t.placements.iter().map(String::as_str));
        parts.extend(t.devices.iter().map(String::as_str));
    }
    parts.join(" ").to_lowercase()
}
