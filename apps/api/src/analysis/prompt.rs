use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::analysis::prompts::{ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM, DOCUMENT_TEXT_TOKEN};
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{ChatMessage, ModelRequest};

/// Immutable prompt template asset. Guaranteed to contain `{{DOCUMENT_TEXT}}`.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if !text.contains(DOCUMENT_TEXT_TOKEN) {
            bail!("prompt template is missing the {DOCUMENT_TEXT_TOKEN} token");
        }
        Ok(Self { text })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt template {}", path.display()))?;
        Self::new(text).with_context(|| format!("invalid prompt template {}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, document_text: &str) -> String {
        fill_template(&self.text, document_text)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: ANALYSIS_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Replaces the first `{{DOCUMENT_TEXT}}` verbatim. Later occurrences are left as-is;
/// no escaping and no length limit.
pub fn fill_template(template: &str, document_text: &str) -> String {
    template.replacen(DOCUMENT_TEXT_TOKEN, document_text, 1)
}

/// System instruction + user prompt, addressed to `model`.
pub fn build_model_request(model: &str, prompt: String) -> ModelRequest {
    ModelRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(format!("{ANALYSIS_SYSTEM} {JSON_ONLY_SYSTEM}")),
            ChatMessage::user(prompt),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_token_is_replaced_verbatim() {
        let out = fill_template("Text:\n{{DOCUMENT_TEXT}}\nEnd", "a \"quoted\" {brace}\nline");
        assert_eq!(out, "Text:\na \"quoted\" {brace}\nline\nEnd");
    }

    #[test]
    fn test_only_first_token_is_replaced() {
        let out = fill_template("{{DOCUMENT_TEXT}} | {{DOCUMENT_TEXT}}", "cv");
        assert_eq!(out, "cv | {{DOCUMENT_TEXT}}");
    }

    #[test]
    fn test_template_is_not_mutated() {
        let template = PromptTemplate::default();
        let before = template.as_str().to_string();
        let rendered = template.render("Jane Doe");
        assert_eq!(template.as_str(), before);
        assert!(rendered.ends_with("Jane Doe"));
        assert!(!rendered.contains(DOCUMENT_TEXT_TOKEN));
    }

    #[test]
    fn test_empty_document_text() {
        assert_eq!(fill_template("[{{DOCUMENT_TEXT}}]", ""), "[]");
    }

    #[test]
    fn test_template_without_token_is_rejected() {
        assert!(PromptTemplate::new("Analyse this: {document}").is_err());
    }

    #[test]
    fn test_template_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Review:\n{{{{DOCUMENT_TEXT}}}}").unwrap();
        let template = PromptTemplate::from_file(file.path()).unwrap();
        assert_eq!(template.render("cv"), "Review:\ncv");
    }

    #[test]
    fn test_request_has_system_then_user() {
        let request = build_model_request("gpt-4o-mini", "prompt body".to_string());
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[0].content.contains("JSON"));
        assert_eq!(request.messages[1], ChatMessage::user("prompt body"));
    }
}
