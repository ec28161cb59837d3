// Résumé analysis: checklist, prompt, reply handling, metrics and the pipeline tying them together.
// All model calls go through llm_client; nothing here talks to the provider directly.

pub mod checklist;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod prompts;
pub mod reply;
