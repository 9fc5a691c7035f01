//! Fixed instruction prompts for the hosted vision model.

use super::types::{AnalysisRequest, SignalVocabulary};

const SYSTEM_PROMPT_TERNARY: &str = "\
You are an educational assistant that reads trading chart screenshots.
Never promise profit or certainty and never give betting instructions.
Return ONLY one valid JSON object with these fields:
- \"signal\": \"BUY\" | \"SELL\" | \"NEUTRAL\"
- \"confidence\": integer 0-100
- \"summary\": one short sentence describing what you saw
- \"assetType\": \"FOREX\" | \"CRYPTO\"
If the image is not a chart, answer \"NEUTRAL\" with low confidence.";

const SYSTEM_PROMPT_BINARY: &str = "\
You are an educational assistant that reads trading chart screenshots.
Never promise profit or certainty and never give betting instructions.
Return ONLY one valid JSON object with these fields:
- \"signal\": \"BUY\" | \"SELL\" (pick the more likely direction, never anything else)
- \"confidence\": integer 0-100
- \"summary\": one short sentence describing what you saw
- \"assetType\": \"FOREX\" | \"CRYPTO\"
If the image is not a chart, pick either direction with confidence below 20.";

const USER_PROMPT: &str = "\
Analyse the candlestick chart screenshot and give an educational reading.
Focus on short-term trend, possible continuation or reversal, volatility and visible support/resistance.";

/// System instruction for the configured vocabulary.
pub fn system_prompt(vocabulary: SignalVocabulary) -> &'static str {
    match vocabulary {
        SignalVocabulary::Ternary => SYSTEM_PROMPT_TERNARY,
        SignalVocabulary::Binary => SYSTEM_PROMPT_BINARY,
    }
}

/// User instruction, with the asset and horizon when known.
pub fn user_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = String::from(USER_PROMPT);
    if let Some(asset) = &request.asset {
        prompt.push_str(&format!("\nAsset: {asset}."));
    }
    prompt.push_str(&format!(
        "\nHorizon: the next {} seconds.\nAnswer with JSON only.",
        request.duration_seconds
    ));
    prompt
}
