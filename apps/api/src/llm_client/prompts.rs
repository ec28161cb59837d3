// Shared prompt fragments.
// Each module that talks to the model defines its own prompts.rs alongside it;
// this file only holds cross-cutting pieces.

/// System prompt fragment that asks for a bare JSON object.
/// The reply parser tolerates decoration anyway, so this is a request, not a guarantee.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with a single valid JSON object. \
    Do NOT include any text outside the JSON object. \
    Do NOT include explanations or apologies.";
