//! Inline request syntax (§6): `@<provider>:` and `#<model>:` prefixes and
//! the bare override keyword, all stripped from the prompt before it
//! reaches a provider.

use crate::config::InlineConfig;

/// Result of parsing one prompt's inline syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrompt {
    /// The prompt text with every recognized prefix/keyword removed.
    pub prompt: String,
    /// Cloud provider name from an `@<provider>:` prefix, if present.
    pub provider_override: Option<String>,
    /// Model name from a `#<model>:` prefix, if present.
    pub model_override: Option<String>,
    /// Whether the override keyword was present anywhere in the prompt.
    pub allow_paid_override: bool,
}

/// Parse and strip `@provider:` / `#model:` prefixes (checked in that order,
/// each optional and independent) and the configured override keyword
/// (matched whole-word, case-insensitively, anywhere in the remaining text).
pub fn parse_inline_syntax(prompt: &str, config: &InlineConfig) -> ParsedPrompt {
    let mut rest = prompt.trim();
    let mut provider_override = None;
    let mut model_override = None;

    if let Some(stripped) = rest.strip_prefix('@') {
        if let Some((provider, remainder)) = stripped.split_once(':') {
            if !provider.is_empty() && !provider.contains(char::is_whitespace) {
                provider_override = Some(provider.to_string());
                rest = remainder.trim_start();
            }
        }
    }

    if let Some(stripped) = rest.strip_prefix('#') {
        if let Some((model, remainder)) = stripped.split_once(':') {
            if !model.is_empty() && !model.contains(char::is_whitespace) {
                model_override = Some(model.to_string());
                rest = remainder.trim_start();
            }
        }
    }

    let (cleaned, allow_paid_override) = strip_keyword(rest, &config.override_keyword);

    if provider_override.is_none() {
        if let Some(model) = &model_override {
            provider_override = detect_provider_from_model(model).map(str::to_string);
        }
    }

    ParsedPrompt {
        prompt: cleaned,
        provider_override,
        model_override,
        allow_paid_override,
    }
}

/// Name-prefix → provider table for `#<model>:` overrides that don't also
/// carry an explicit `@<provider>:` prefix (§6).
const MODEL_PREFIX_PROVIDERS: &[(&str, &str)] = &[
    ("gpt-", "openai"),
    ("o1-", "openai"),
    ("claude-", "anthropic"),
    ("mistral-", "mistral"),
    ("sonar", "perplexity"),
    ("gemini-", "gemini"),
];

/// Auto-detect a cloud provider from a bare model name's prefix, per §6's
/// table. Returns `None` for a name matching no known family.
pub fn detect_provider_from_model(model: &str) -> Option<&'static str> {
    let lower = model.to_lowercase();
    MODEL_PREFIX_PROVIDERS
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, provider)| *provider)
}

/// Remove every case-insensitive whole-word occurrence of `keyword` from
/// `text`, collapsing the resulting extra whitespace. Returns the cleaned
/// text and whether the keyword was found at all.
fn strip_keyword(text: &str, keyword: &str) -> (String, bool) {
    let keyword_lower = keyword.to_lowercase();
    let mut found = false;
    let cleaned: Vec<&str> = text
        .split_whitespace()
        .filter(|word| {
            let is_match = word.to_lowercase() == keyword_lower;
            found |= is_match;
            !is_match
        })
        .collect();
    (cleaned.join(" "), found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InlineConfig {
        InlineConfig::default()
    }

    #[test]
    fn plain_prompt_is_untouched() {
        let parsed = parse_inline_syntax("what is the weather", &config());
        assert_eq!(parsed.prompt, "what is the weather");
        assert!(parsed.provider_override.is_none());
        assert!(parsed.model_override.is_none());
        assert!(!parsed.allow_paid_override);
    }

    #[test]
    fn parses_provider_prefix() {
        let parsed = parse_inline_syntax("@anthropic: summarize this", &config());
        assert_eq!(parsed.provider_override.as_deref(), Some("anthropic"));
        assert_eq!(parsed.prompt, "summarize this");
    }

    #[test]
    fn parses_model_prefix_after_provider() {
        let parsed = parse_inline_syntax("@anthropic:#claude-haiku: summarize this", &config());
        assert_eq!(parsed.provider_override.as_deref(), Some("anthropic"));
        assert_eq!(parsed.model_override.as_deref(), Some("claude-haiku"));
        assert_eq!(parsed.prompt, "summarize this");
    }

    #[test]
    fn bare_model_prefix_auto_detects_provider() {
        let parsed = parse_inline_syntax("#claude-haiku: summarize this", &config());
        assert_eq!(parsed.model_override.as_deref(), Some("claude-haiku"));
        assert_eq!(parsed.provider_override.as_deref(), Some("anthropic"));
    }

    #[test]
    fn detect_provider_from_model_covers_the_spec_table() {
        assert_eq!(detect_provider_from_model("gpt-4o"), Some("openai"));
        assert_eq!(detect_provider_from_model("o1-preview"), Some("openai"));
        assert_eq!(detect_provider_from_model("claude-opus-4"), Some("anthropic"));
        assert_eq!(detect_provider_from_model("mistral-large"), Some("mistral"));
        assert_eq!(detect_provider_from_model("sonar-pro"), Some("perplexity"));
        assert_eq!(detect_provider_from_model("gemini-1.5-pro"), Some("gemini"));
        assert_eq!(detect_provider_from_model("llama-3"), None);
    }

    #[test]
    fn strips_override_keyword_case_insensitively() {
        let parsed = parse_inline_syntax("OVERRIDE please escalate this", &config());
        assert!(parsed.allow_paid_override);
        assert_eq!(parsed.prompt, "please escalate this");
    }

    #[test]
    fn override_keyword_is_whole_word_only() {
        let parsed = parse_inline_syntax("overridden logic please", &config());
        assert!(!parsed.allow_paid_override);
        assert_eq!(parsed.prompt, "overridden logic please");
    }
}
