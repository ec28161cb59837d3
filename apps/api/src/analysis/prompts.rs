// All LLM prompt text for the analysis module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Fixed system instruction sent ahead of every analysis request.
pub const ANALYSIS_SYSTEM: &str = "You are an expert résumé reviewer and ATS (applicant \
    tracking system) specialist. You give honest, specific and actionable feedback.";

/// Substitution token for the extracted document text.
pub const DOCUMENT_TEXT_TOKEN: &str = "{{DOCUMENT_TEXT}}";

/// Default analysis template. `{{DOCUMENT_TEXT}}` is replaced verbatim before sending.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyse the following résumé text.

First decide whether the text is actually a résumé or CV. If it is not, respond with
exactly this object and nothing else:
{"error": "This document does not appear to be a résumé."}

Otherwise return a JSON object with this EXACT schema:
{
  "overallScore": 7,
  "strengths": ["Clear section structure"],
  "improvements": ["Quantify the impact of each role"],
  "summary": "Two or three sentences on the overall impression.",
  "performanceMetrics": {
    "formatting": 8,
    "contentQuality": 7,
    "atsCompatibility": 6,
    "keywordUsage": 5,
    "quantifiableResults": 4
  },
  "actionItems": ["Add a metric to the first bullet of the most recent role"],
  "proTips": ["Mirror the job posting's wording for key skills"],
  "keywords": ["Rust", "distributed systems"]
}

Rules:
1. All scores are numbers from 0 to 10.
2. strengths and improvements: 3 to 5 items each, specific to this résumé.
3. keywords: the technical and domain keywords an ATS would pick up from the text.
4. Base every statement on the text below. Do not invent experience.

RÉSUMÉ TEXT:
{{DOCUMENT_TEXT}}"#;
