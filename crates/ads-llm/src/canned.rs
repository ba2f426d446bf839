/// Offline generator: picks a fixed answer by the first keyword found.
#[derive(Debug, Clone, Default)]
pub struct CannedResponder;

const RESPONSES: [(&str, &str); 5] = [
    (
        "cpm",
        "Based on the campaign data, CPM spikes can indicate audience saturation or increased competition. I recommend analyzing frequency caps and expanding your target audience.",
    ),
    (
        "roas",
        "The ROAS data shows strong performance in Electronics campaigns. Consider reallocating budget from underperforming segments to maximize returns.",
    ),
    (
        "frequency",
        "High frequency rates may indicate audience fatigue. Try refreshing your creative assets or expanding your audience targeting.",
    ),
    (
        "performance",
        "Campaign performance analysis shows seasonal trends. Black Friday periods typically see 40-60% higher engagement rates.",
    ),
    (
        "optimization",
        "For campaign optimization, focus on high-performing ad sets and pause underperforming creative variants. A/B testing different audience segments is recommended.",
    ),
];

const DEFAULT_RESPONSE: &str = "Based on the campaign data provided, I can help analyze your Meta Ads performance. Please provide more specific questions about CPM, ROAS, frequency, or campaign optimization.";

impl CannedResponder {
    pub fn new() -> Self {
        Self
    }

    /// Matches the question first, then the retrieved context.
    pub fn respond(&self, question: &str, context: &str) -> String {
        Self::lookup(question)
            .or_else(|| Self::lookup(context))
            .unwrap_or(DEFAULT_RESPONSE)
            .to_string()
    }

    pub fn model_name(&self) -> &str {
        "canned-responder"
    }

    fn lookup(text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        RESPONSES
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, response)| *response)
    }
}
