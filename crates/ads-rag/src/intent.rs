use std::collections::{BTreeMap, BTreeSet};

use ads_core::{
    ComparisonType, EntityKind, EntityMatch, IntentType, QueryIntent, RankingMetric,
    SuggestedFilters, TimeFilter, TimePeriod,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Confidence reported when no intent pattern matches.
pub const GENERAL_INQUIRY_CONFIDENCE: f32 = 0.3;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static intent pattern"))
        .collect()
}

/// Category table, in tie-break order. Patterns run against the lower-cased query.
static INTENT_PATTERNS: Lazy<Vec<(IntentType, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            IntentType::PerformanceAnomaly,
            compile(&[
                concat!(
                    r"\b(spike|jump|increase|rise|surge)\b.*\b(cpm|cpc|cost|spend)",
                    r"|\b(cpm|cpc|cost|spend)\b.*\b(spike|jump|surge|spiked|jumped|surged)",
                ),
                r"\b(drop|decline|decrease|fall|crash)\b.*\b(roas|conversion|ctr|performance)",
                concat!(
                    r"\bwhy\b.*\b(high|low|bad|poor|expensive)",
                    r"|\bwhy\b.*\b(spike|jump|surge|spiked|jumped|surged|drop|dropped|crash|crashed)",
                ),
                r"\bwhat.*(happen|wrong|cause|problem)",
                r"\b(anomaly|unusual|strange|weird|unexpected)",
            ]),
        ),
        (
            IntentType::CampaignComparison,
            compile(&[
                r"\bcompare\b.*\b(campaign|audience|performance)",
                r"\b(vs|versus|against|compared to)\b",
                r"\bbetter\b.*\b(campaign|audience|performance)",
                r"\b(difference|different)\b.*\b(between|campaign)",
                r"\b(retargeting|lookalike|interest)\b.*\b(vs|versus|compared)",
            ]),
        ),
        (
            IntentType::PerformanceRanking,
            compile(&[
                r"\bbest\b.*\b(perform|campaign|audience|creative)",
                r"\btop\b.*\b(perform|campaign|audience)",
                r"\b(worst|lowest|highest|most|least)\b.*\b(perform|roas|cpm|cpc)",
                r"\brank.*\b(campaign|audience|performance)",
                r"\bwhich.*\b(best|better|perform)",
            ]),
        ),
        (
            IntentType::TrendAnalysis,
            compile(&[
                r"\btrend\b.*\b(over time|monthly|weekly|daily)",
                r"\b(pattern|seasonal|timeline|history)",
                r"\b(last|past|previous)\b.*\b(week|month|quarter|year)",
                r"\bover\b.*\b(time|period|duration)",
                r"\b(growth|decline|change)\b.*\b(time|period)",
            ]),
        ),
        (
            IntentType::PredictionForecast,
            compile(&[
                r"\bpredict\b.*\b(performance|next|future)",
                r"\bforecast\b.*\b(week|month|performance)",
                r"\bnext\b.*\b(week|month|quarter)",
                r"\bfuture\b.*\b(performance|trend|result)",
                r"\bwill\b.*\b(perform|cost|convert)",
                r"\bexpect\b.*\b(performance|result|roas)",
            ]),
        ),
        (
            IntentType::OptimizationAdvice,
            compile(&[
                r"\bhow.*\b(improve|optimize|fix|increase|decrease)",
                r"\bwhat.*\b(should|recommend|suggest|advice)",
                r"\b(recommendation|advice|suggestion|tip)",
                r"\b(optimize|improve|fix|boost|enhance)",
                r"\bshould i\b.*\b(pause|stop|increase|decrease)",
            ]),
        ),
        (
            IntentType::BudgetSpend,
            compile(&[
                r"\bbudget\b.*\b(increase|decrease|optimize|allocate)",
                r"\bspend\b.*\b(too much|too little|optimize|control)",
                r"\bcost\b.*\b(per|efficiency|optimization)",
                r"\b(expensive|cheap|costly)\b.*\b(campaign|audience)",
                r"\bmoney\b.*\b(waste|save|optimize|efficient)",
            ]),
        ),
        (
            IntentType::AudienceAnalysis,
            compile(&[
                r"\baudience\b.*\b(perform|target|segment|behavior)",
                r"\b(demographic|interest|behavior)\b.*\b(perform|target)",
                r"\b(age|gender|location|interest)\b.*\b(perform|convert)",
                r"\btarget\b.*\b(audience|demographic|interest)",
                r"\bsegment\b.*\b(perform|audience|target)",
            ]),
        ),
        (
            IntentType::CreativePerformance,
            compile(&[
                r"\bcreative\b.*\b(perform|fatigue|refresh|test)",
                r"\bad\b.*\b(creative|copy|image|video|perform)",
                r"\b(headline|copy|image|video)\b.*\b(perform|test)",
                r"\bcreative.*\b(rotation|refresh|update|change)",
                r"\b(fatigue|tired|stale)\b.*\b(creative|ad|audience)",
            ]),
        ),
    ]
});

/// Entity table; applied case-insensitively to the query as written.
static ENTITY_PATTERNS: Lazy<Vec<(EntityKind, Regex)>> = Lazy::new(|| {
    let table: [(EntityKind, &str); 9] = [
        (EntityKind::CampaignNames, r#"(?i)\b(campaign|ad)\s+['"]([^'"]+)['"]"#),
        (
            EntityKind::Metrics,
            r"(?i)\b(roas|cpm|cpc|ctr|spend|cost|conversion|impression|click|reach|frequency)\b",
        ),
        (
            EntityKind::TimePeriods,
            r"(?i)\b(last|past|previous|next)\s+(week|month|quarter|year|day)",
        ),
        (
            EntityKind::SpecificDates,
            r"(?i)\b(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}|\d{4}[/\-]\d{1,2}[/\-]\d{1,2})\b",
        ),
        (EntityKind::Percentages, r"(?i)\b(\d+(?:\.\d+)?)\s*%"),
        (EntityKind::Currency, r"(?i)\$(\d+(?:,\d{3})*(?:\.\d{2})?)"),
        (
            EntityKind::AudienceTypes,
            r"(?i)\b(retargeting|lookalike|interest|broad|custom|website\s+visitor)\b",
        ),
        (
            EntityKind::Industries,
            r"(?i)\b(fashion|electronics|fitness|travel|luxury|home|garden)\b",
        ),
        (
            EntityKind::Placements,
            r"(?i)\b(feed|story|stories|reel|reels|messenger|audience\s+network)\b",
        ),
    ];
    table
        .into_iter()
        .map(|(kind, p)| (kind, Regex::new(p).expect("static entity pattern")))
        .collect()
});

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("static word pattern"));

/// Rule-based query classifier. Pure: the same query always yields the same intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> QueryIntent {
        let scores = self.intent_scores(query);

        // first strictly greater score wins, so ties go to the earlier category
        let mut best: Option<(IntentType, f32)> = None;
        for (intent, score) in &scores {
            if *score > best.map(|(_, s)| s).unwrap_or(0.0) {
                best = Some((*intent, *score));
            }
        }
        let (intent_type, confidence) = match best {
            Some((intent, score)) => (intent, score.min(1.0)),
            None => (IntentType::GeneralInquiry, GENERAL_INQUIRY_CONFIDENCE),
        };

        let extracted_entities = self.extract_entities(query);
        let suggested_filters = self.suggest_filters(query, &extracted_entities, intent_type);
        QueryIntent {
            intent_type,
            confidence,
            extracted_entities,
            suggested_filters,
        }
    }

    /// Per category: Σ matches(pattern) / number of patterns.
    pub fn intent_scores(&self, query: &str) -> Vec<(IntentType, f32)> {
        let lower = query.to_lowercase();
        INTENT_PATTERNS
            .iter()
            .map(|(intent, patterns)| {
                let weight = 1.0 / patterns.len() as f32;
                let score: f32 = patterns
                    .iter()
                    .map(|re| re.find_iter(&lower).count() as f32 * weight)
                    .sum();
                (*intent, score)
            })
            .collect()
    }

    /// Campaign names keep their case; keyword-like entities are lower-cased.
    pub fn extract_entities(&self, query: &str) -> BTreeMap<EntityKind, Vec<EntityMatch>> {
        let mut entities = BTreeMap::new();
        for (kind, re) in ENTITY_PATTERNS.iter() {
            let preserve_case = *kind == EntityKind::CampaignNames;
            let normalize = |s: &str| {
                if preserve_case {
                    s.to_string()
                } else {
                    s.to_lowercase()
                }
            };
            let group_count = re.captures_len() - 1;
            let matches: Vec<EntityMatch> = re
                .captures_iter(query)
                .map(|caps| {
                    let group = |i: usize| {
                        caps.get(i)
                            .map(|m| normalize(m.as_str()))
                            .unwrap_or_default()
                    };
                    match group_count {
                        0 => EntityMatch::Text(group(0)),
                        1 => EntityMatch::Text(group(1)),
                        n => EntityMatch::Groups((1..=n).map(group).collect()),
                    }
                })
                .collect();
            if !matches.is_empty() {
                entities.insert(*kind, matches);
            }
        }
        entities
    }

    pub fn suggest_filters(
        &self,
        query: &str,
        entities: &BTreeMap<EntityKind, Vec<EntityMatch>>,
        intent: IntentType,
    ) -> SuggestedFilters {
        let mut filters = SuggestedFilters {
            time_filter: entities
                .get(&EntityKind::TimePeriods)
                .and_then(|m| m.first())
                .map(|m| parse_time_period(&m.as_text())),
            campaign_filter: entities.get(&EntityKind::CampaignNames).cloned(),
            audience_filter: entities.get(&EntityKind::AudienceTypes).cloned(),
            industry_filter: entities.get(&EntityKind::Industries).cloned(),
            metrics_focus: entities.get(&EntityKind::Metrics).cloned(),
            ..SuggestedFilters::default()
        };

        let lower = query.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        match intent {
            IntentType::CampaignComparison => {
                if mentions(&["retargeting", "lookalike"]) {
                    filters.comparison_type = Some(ComparisonType::AudienceType);
                } else if mentions(&["campaign", "ad"]) {
                    filters.comparison_type = Some(ComparisonType::CampaignLevel);
                }
            }
            IntentType::PerformanceRanking => {
                if mentions(&["roas", "return"]) {
                    filters.ranking_metric = Some(RankingMetric::Roas);
                } else if mentions(&["cpm", "cost", "expensive"]) {
                    filters.ranking_metric = Some(RankingMetric::Cpm);
                } else if mentions(&["ctr", "engagement"]) {
                    filters.ranking_metric = Some(RankingMetric::Ctr);
                }
            }
            _ => {}
        }
        filters
    }

    /// Query words, metric/audience/industry entities and intent keywords; deduplicated, sorted.
    pub fn search_keywords(&self, query: &str, intent: &QueryIntent) -> Vec<String> {
        let mut keywords: BTreeSet<String> = WORD
            .find_iter(query)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        for kind in [
            EntityKind::Metrics,
            EntityKind::AudienceTypes,
            EntityKind::Industries,
        ] {
            keywords.extend(intent.entities(kind).iter().map(EntityMatch::as_text));
        }
        keywords.extend(intent_keywords(intent.intent_type).iter().map(|s| s.to_string()));
        keywords.into_iter().collect()
    }
}

fn intent_keywords(intent: IntentType) -> &'static [&'static str] {
    match intent {
        IntentType::PerformanceAnomaly => &["spike", "increase", "problem", "issue", "anomaly"],
        IntentType::CampaignComparison => &["compare", "versus", "performance", "better"],
        IntentType::PerformanceRanking => &["best", "top", "rank", "performance"],
        IntentType::TrendAnalysis => &["trend", "pattern", "over time", "change"],
        IntentType::PredictionForecast => &["predict", "forecast", "future", "next"],
        IntentType::OptimizationAdvice => &["optimize", "improve", "recommendation", "advice"],
        IntentType::BudgetSpend => &["budget", "spend", "cost", "efficiency"],
        IntentType::AudienceAnalysis => &["audience", "targeting", "segment", "demographic"],
        IntentType::CreativePerformance => &["creative", "fatigue", "refresh", "ad"],
        IntentType::GeneralInquiry | IntentType::Unknown => &[],
    }
}

/// Maps a relative time phrase onto a coarse window.
pub fn parse_time_period(raw: &str) -> TimeFilter {
    let lower = raw.to_lowercase();
    let (period, days) = if lower.contains("last week") || lower.contains("past week") {
        (TimePeriod::LastWeek, Some(7))
    } else if lower.contains("last month") || lower.contains("past month") {
        (TimePeriod::LastMonth, Some(30))
    } else if lower.contains("last quarter") {
        (TimePeriod::LastQuarter, Some(90))
    } else if lower.contains("next week") {
        (TimePeriod::NextWeek, Some(7))
    } else if lower.contains("next month") {
        (TimePeriod::NextMonth, Some(30))
    } else {
        (TimePeriod::Custom, None)
    };
    TimeFilter {
        period,
        days,
        raw: raw.to_string(),
    }
}
