use ads_core::{Chunk, IntentType, QueryIntent};

pub const SYSTEM_PROMPT: &str = "You are a senior Meta Ads performance analyst. \
Use only the metrics present in the supplied campaign data and say so when the data does not cover the question.";

/// Extra guidance appended to the prompt for each intent.
pub fn intent_instructions(intent: IntentType) -> Option<&'static str> {
    let text = match intent {
        IntentType::PerformanceAnomaly => {
            "Focus on identifying root causes, timeline of changes, and actionable recommendations.\n\
             Include specific metrics and percentage changes where available."
        }
        IntentType::CampaignComparison => {
            "Provide a clear side-by-side comparison with specific metrics.\n\
             Highlight the winner and explain why one performs better than the other."
        }
        IntentType::PerformanceRanking => {
            "Rank the items clearly (1st, 2nd, 3rd, etc.) with supporting metrics.\n\
             Explain what makes the top performers successful."
        }
        IntentType::TrendAnalysis => {
            "Describe the direction and size of changes over the covered dates.\n\
             Call out turning points and any seasonal effects visible in the data."
        }
        IntentType::PredictionForecast => {
            "Base predictions on historical patterns and seasonal trends.\n\
             Include confidence levels and key assumptions in your forecast."
        }
        IntentType::OptimizationAdvice => {
            "Provide specific, actionable recommendations with expected impact.\n\
             Prioritize suggestions by potential ROI and ease of implementation."
        }
        IntentType::BudgetSpend => {
            "Relate spend to returns for each campaign mentioned.\n\
             Recommend concrete budget shifts and the metric each shift should improve."
        }
        IntentType::AudienceAnalysis => {
            "Compare audience segments on CTR, CPM, conversions and ROAS.\n\
             Point out saturation signs such as rising frequency."
        }
        IntentType::CreativePerformance => {
            "Assess creative health using CTR, frequency and CPM movement.\n\
             Flag likely creative fatigue and suggest what to refresh or test."
        }
        IntentType::GeneralInquiry | IntentType::Unknown => return None,
    };
    Some(text)
}

/// Assembles the generation prompt from the question, intent and retrieved chunks.
pub fn build_context_prompt(question: &str, intent: &QueryIntent, chunks: &[Chunk]) -> String {
    let mut prompt = format!(
        "You are an expert Meta Ads analyst. Answer the user's question based on the provided campaign data.\n\n\
         User Question: {}\n\
         Query Intent: {}\n\
         Confidence: {:.2}\n\n\
         Campaign Data:\n",
        question, intent.intent_type, intent.confidence
    );

    for (i, chunk) in chunks.iter().enumerate() {
        prompt.push_str(&format!(
            "\nDocument {} ({}):\n{}\n",
            i + 1,
            chunk.chunk_type(),
            chunk.content
        ));
    }

    if let Some(instructions) = intent_instructions(intent.intent_type) {
        prompt.push_str(&format!("\nSpecific Instructions:\n{}\n", instructions));
    }

    prompt.push_str(
        "\nRequirements:\n\
         1. Be specific and data-driven\n\
         2. Include relevant metrics and comparisons\n\
         3. Provide actionable insights\n\
         4. Use marketing terminology appropriately\n\
         5. Structure your response clearly with sections\n\n\
         Answer:",
    );
    prompt
}

/// Short context for the canned responder: leading characters of the top chunks.
pub fn brief_context(chunks: &[Chunk], max_chunks: usize, max_chars: usize) -> String {
    chunks
        .iter()
        .take(max_chunks)
        .map(|c| c.content.chars().take(max_chars).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n\n")
}
