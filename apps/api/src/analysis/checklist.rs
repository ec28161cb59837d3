//! ATS checklist: content-only presence checks over the extracted document text.
//!
//! Runs without the model, so it is available even when later stages fail.
//! Item order comes from the catalog, never from where a match sits in the text.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub label: String,
    pub present: bool,
}

/// A labelled, case-insensitive pattern test.
#[derive(Debug, Clone)]
pub struct ChecklistRule {
    pub label: String,
    pattern: Regex,
}

impl ChecklistRule {
    pub fn new(label: &str, pattern: &str) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid checklist pattern for '{label}'"))?;
        Ok(Self {
            label: label.to_string(),
            pattern,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Email address or a phone number. A phone needs a leading `+`, a parenthesised
/// area code or a separator before the last four digits; bare digit runs don't count.
const CONTACT_PATTERN: &str = concat!(
    r"[\w.+-]+@[\w-]+\.[\w.-]+",
    r"|\+\d[\d\s.()-]{6,}\d",
    r"|\(\d{2,4}\)\s*\d{3}[\s.-]?\d{4}\b",
    r"|\b(\d{3}[\s.-])?\d{3}[\s.-]\d{4}\b",
);
const SECTION_PATTERN: &str = r"experience|education|skills";
const QUANTIFIED_PATTERN: &str = r"\d|%";
const ACTION_VERB_PATTERN: &str = r"\b(led|managed|developed|built|designed|implemented|created|improved|launched|delivered|achieved|optimi[sz]ed)\b";
const SUMMARY_PATTERN: &str = r"summary|objective|profile";
const ONLINE_PATTERN: &str = r"linkedin|github|portfolio";
const TIMELINE_PATTERN: &str = r"\b(19|20)\d{2}\b";

/// The fixed, ordered list of checks.
#[derive(Debug, Clone)]
pub struct ChecklistCatalog {
    rules: Vec<ChecklistRule>,
}

impl ChecklistCatalog {
    pub fn new(rules: Vec<ChecklistRule>) -> Self {
        Self { rules }
    }

    /// Built-in ATS checks.
    pub fn ats_default() -> Result<Self> {
        Ok(Self::new(vec![
            ChecklistRule::new("Contact Information", CONTACT_PATTERN)?,
            ChecklistRule::new("Section Headings", SECTION_PATTERN)?,
            ChecklistRule::new("Quantified Achievements", QUANTIFIED_PATTERN)?,
            ChecklistRule::new("Action Verbs", ACTION_VERB_PATTERN)?,
            ChecklistRule::new("Professional Summary", SUMMARY_PATTERN)?,
            ChecklistRule::new("Online Presence", ONLINE_PATTERN)?,
            ChecklistRule::new("Dates & Timeline", TIMELINE_PATTERN)?,
        ]))
    }

    pub fn rules(&self) -> &[ChecklistRule] {
        &self.rules
    }
}

/// Pure and deterministic: the same text always yields the same items.
pub fn build_checklist(catalog: &ChecklistCatalog, document_text: &str) -> Vec<ChecklistItem> {
    catalog
        .rules
        .iter()
        .map(|rule| ChecklistItem {
            label: rule.label.clone(),
            present: rule.matches(document_text),
        })
        .collect()
}
