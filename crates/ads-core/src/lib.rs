use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub mod dataset;
pub mod format;

pub use ads_error::{AdsError as Error, Result};
pub use dataset::{CampaignDataset, PerformanceRow, PerformanceSummary};

// ========== Campaign data ==========

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CampaignStatus {
    Active,
    Paused,
    Archived,
    Other(String),
}

impl CampaignStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Archived => "ARCHIVED",
            CampaignStatus::Other(s) => s,
        }
    }
}

impl From<String> for CampaignStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => CampaignStatus::Active,
            "PAUSED" => CampaignStatus::Paused,
            "ARCHIVED" => CampaignStatus::Archived,
            _ => CampaignStatus::Other(value),
        }
    }
}

impl From<CampaignStatus> for String {
    fn from(value: CampaignStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Budget {
    pub daily_budget: Option<f64>,
    pub total_budget: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Targeting {
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interests: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub placements: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub devices: Vec<String>,
}

/// One day of delivery for one campaign. Rates are taken as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyMetrics {
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub conversions: f64,
    pub ctr: f64,
    pub cpm: f64,
    pub cpc: f64,
    pub roas: f64,
    pub frequency: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reach: Option<f64>,
}

impl DailyMetrics {
    pub fn metric_names(&self) -> Vec<&'static str> {
        let mut names = vec![
            "impressions",
            "clicks",
            "spend",
            "conversions",
            "ctr",
            "cpm",
            "cpc",
            "roas",
            "frequency",
        ];
        if self.reach.is_some() {
            names.push("reach");
        }
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub objective: Option<String>,
    pub status: Option<CampaignStatus>,
    pub industry: Option<String>,
    pub audience: Option<String>,
    pub budget: Option<Budget>,
    pub targeting: Option<Targeting>,
    /// Keyed by ISO `YYYY-MM-DD` after ingestion, so the last key is the latest day.
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily_performance: BTreeMap<String, DailyMetrics>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub insights: IndexMap<String, Value>,
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        matches!(self.status, Some(CampaignStatus::Active))
    }

    pub fn latest_performance(&self) -> Option<(&String, &DailyMetrics)> {
        self.daily_performance.iter().next_back()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalInsights {
    pub market_trends: Option<IndexMap<String, Value>>,
    pub best_practices: Option<IndexMap<String, Value>>,
    pub anomalies_detected: Option<IndexMap<String, Value>>,
}

impl GlobalInsights {
    pub fn is_empty(&self) -> bool {
        self.market_trends.is_none()
            && self.best_practices.is_none()
            && self.anomalies_detected.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub date: Option<String>,
    pub campaign: Option<String>,
    pub issue: Option<String>,
    pub resolution: Option<String>,
}

impl AnomalyRecord {
    /// Only object-valued entries describe an anomaly.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

// ========== Chunks ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    CampaignOverview,
    DailyPerformance,
    CampaignInsights,
    IndustryComparison,
    MarketTrends,
    BestPractices,
    Anomalies,
}

impl ChunkType {
    pub const ALL: [ChunkType; 7] = [
        ChunkType::CampaignOverview,
        ChunkType::DailyPerformance,
        ChunkType::CampaignInsights,
        ChunkType::IndustryComparison,
        ChunkType::MarketTrends,
        ChunkType::BestPractices,
        ChunkType::Anomalies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::CampaignOverview => "campaign_overview",
            ChunkType::DailyPerformance => "daily_performance",
            ChunkType::CampaignInsights => "campaign_insights",
            ChunkType::IndustryComparison => "industry_comparison",
            ChunkType::MarketTrends => "market_trends",
            ChunkType::BestPractices => "best_practices",
            ChunkType::Anomalies => "anomalies",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ChunkType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_type: ChunkType,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ChunkMetadata {
    pub fn new(chunk_type: ChunkType) -> Self {
        Self {
            chunk_type,
            fields: Map::new(),
        }
    }

    /// Adds a field; null values are left out.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(key.to_string(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn campaign_id(&self) -> Option<&str> {
        self.get_str("campaign_id")
    }

    /// All metadata values rendered as space separated text, chunk type first.
    pub fn value_text(&self) -> String {
        let mut parts = vec![self.chunk_type.as_str().to_string()];
        for value in self.fields.values() {
            push_value_text(value, &mut parts);
        }
        parts.join(" ")
    }
}

fn push_value_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| push_value_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| push_value_text(v, out)),
        other => out.push(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn chunk_type(&self) -> ChunkType {
        self.metadata.chunk_type
    }
}

/// A retrieved chunk with its relevance under the index that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

// ========== Query intent ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    PerformanceAnomaly,
    CampaignComparison,
    PerformanceRanking,
    TrendAnalysis,
    PredictionForecast,
    OptimizationAdvice,
    BudgetSpend,
    AudienceAnalysis,
    CreativePerformance,
    GeneralInquiry,
    /// Placeholder carried by failed responses
    Unknown,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::PerformanceAnomaly => "performance_anomaly",
            IntentType::CampaignComparison => "campaign_comparison",
            IntentType::PerformanceRanking => "performance_ranking",
            IntentType::TrendAnalysis => "trend_analysis",
            IntentType::PredictionForecast => "prediction_forecast",
            IntentType::OptimizationAdvice => "optimization_advice",
            IntentType::BudgetSpend => "budget_spend",
            IntentType::AudienceAnalysis => "audience_analysis",
            IntentType::CreativePerformance => "creative_performance",
            IntentType::GeneralInquiry => "general_inquiry",
            IntentType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CampaignNames,
    Metrics,
    TimePeriods,
    SpecificDates,
    Percentages,
    Currency,
    AudienceTypes,
    Industries,
    Placements,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::CampaignNames => "campaign_names",
            EntityKind::Metrics => "metrics",
            EntityKind::TimePeriods => "time_periods",
            EntityKind::SpecificDates => "specific_dates",
            EntityKind::Percentages => "percentages",
            EntityKind::Currency => "currency",
            EntityKind::AudienceTypes => "audience_types",
            EntityKind::Industries => "industries",
            EntityKind::Placements => "placements",
        }
    }
}

/// A regex match: the single captured group, or every group when there are several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityMatch {
    Text(String),
    Groups(Vec<String>),
}

impl EntityMatch {
    pub fn as_text(&self) -> String {
        match self {
            EntityMatch::Text(s) => s.clone(),
            EntityMatch::Groups(groups) => groups.join(" "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    LastWeek,
    LastMonth,
    LastQuarter,
    NextWeek,
    NextMonth,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilter {
    pub period: TimePeriod,
    /// Nominal length of the window; absent for custom phrases
    pub days: Option<u32>,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    AudienceType,
    CampaignLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    Roas,
    Cpm,
    Ctr,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestedFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_filter: Option<TimeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_filter: Option<Vec<EntityMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience_filter: Option<Vec<EntityMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_filter: Option<Vec<EntityMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_focus: Option<Vec<EntityMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_type: Option<ComparisonType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_metric: Option<RankingMetric>,
}

impl SuggestedFilters {
    pub fn is_empty(&self) -> bool {
        *self == SuggestedFilters::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub intent_type: IntentType,
    pub confidence: f32,
    pub extracted_entities: BTreeMap<EntityKind, Vec<EntityMatch>>,
    pub suggested_filters: SuggestedFilters,
}

impl QueryIntent {
    pub fn unknown() -> Self {
        Self {
            intent_type: IntentType::Unknown,
            confidence: 0.0,
            extracted_entities: BTreeMap::new(),
            suggested_filters: SuggestedFilters::default(),
        }
    }

    pub fn entities(&self, kind: EntityKind) -> &[EntityMatch] {
        self.extracted_entities
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ========== Responses ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCitation {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    pub intent: QueryIntent,
    pub sources: Vec<SourceCitation>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub mode: String,
    pub latency_ms: i64,
}

/// Treats an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_as_plain_string() {
        let status: CampaignStatus = serde_json::from_value(json!("active")).unwrap();
        assert_eq!(status, CampaignStatus::Active);
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("ACTIVE"));

        let other: CampaignStatus = serde_json::from_value(json!("IN_REVIEW")).unwrap();
        assert_eq!(other.as_str(), "IN_REVIEW");
    }

    #[test]
    fn campaign_tolerates_missing_and_null_fields() {
        let campaign: Campaign = serde_json::from_value(json!({
            "id": "c1",
            "name": "Spring",
            "daily_performance": null,
            "insights": null
        }))
        .unwrap();
        assert!(campaign.daily_performance.is_empty());
        assert!(campaign.insights.is_empty());
        assert!(campaign.status.is_none());
        assert!(!campaign.is_active());
    }

    #[test]
    fn metadata_flattens_and_skips_nulls() {
        let meta = ChunkMetadata::new(ChunkType::DailyPerformance)
            .with("campaign_id", "c1")
            .with("industry", Value::Null)
            .with("metrics", json!(["spend", "roas"]))
            .with("roas", 3.5);
        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["chunk_type"], json!("daily_performance"));
        assert_eq!(v["campaign_id"], json!("c1"));
        assert!(v.get("industry").is_none());
        assert_eq!(meta.value_text(), "daily_performance c1 spend roas 3.5");
    }

    #[test]
    fn anomaly_record_requires_object() {
        assert!(AnomalyRecord::from_value(&json!("text")).is_none());
        let rec = AnomalyRecord::from_value(&json!({"date": "2024-11-29", "issue": "CPM spike"}))
            .unwrap();
        assert_eq!(rec.issue.as_deref(), Some("CPM spike"));
        assert!(rec.campaign.is_none());
    }

    #[test]
    fn entity_match_serializes_untagged() {
        let m = EntityMatch::Groups(vec!["last".into(), "week".into()]);
        assert_eq!(serde_json::to_value(&m).unwrap(), json!(["last", "week"]));
        assert_eq!(m.as_text(), "last week");
    }
}
