use std::collections::{HashMap, HashSet};

/// Decides which model ids may be sent to the chat completion endpoint.
pub trait ModelSupport: Send + Sync {
    fn supports_model(&self, name: &str) -> bool;

    /// Canonical id for a short alias, if the name is one.
    fn resolve_alias(&self, _name: &str) -> Option<String> {
        None
    }
}

impl<F> ModelSupport for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn supports_model(&self, name: &str) -> bool {
        self(name)
    }
}

const BUILTIN_MODELS: [&str; 8] = [
    "openai/gpt-4o",
    "openai/gpt-4o-mini",
    "anthropic/claude-3.5-sonnet",
    "anthropic/claude-3-haiku",
    "google/gemini-pro-1.5",
    "meta-llama/llama-3.1-70b-instruct",
    "mistralai/mixtral-8x7b-instruct",
    "deepseek/deepseek-chat",
];

const BUILTIN_ALIASES: [(&str, &str); 6] = [
    ("gpt-4o", "openai/gpt-4o"),
    ("gpt-4o-mini", "openai/gpt-4o-mini"),
    ("claude-3.5-sonnet", "anthropic/claude-3.5-sonnet"),
    ("claude-3-haiku", "anthropic/claude-3-haiku"),
    ("llama-3.1-70b", "meta-llama/llama-3.1-70b-instruct"),
    ("mixtral-8x7b", "mistralai/mixtral-8x7b-instruct"),
];

/// Known model ids plus a short-alias table.
///
/// With `allow_unlisted` set (the default) any id shaped like `vendor/model` is
/// accepted, so new router models work without a catalog update.
///
/// # Examples
///
/// ```
/// use openrouter_http::models::{ModelCatalog, ModelSupport};
///
/// let catalog = ModelCatalog::default();
/// assert_eq!(catalog.resolve_alias("gpt-4o").as_deref(), Some("openai/gpt-4o"));
/// assert!(catalog.supports_model("qwen/qwen-2-72b-instruct"));
/// assert!(!ModelCatalog::default().allow_unlisted(false).supports_model("qwen/qwen-2-72b-instruct"));
/// ```
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    known: HashSet<String>,
    aliases: HashMap<String, String>,
    allow_unlisted: bool,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        for model in BUILTIN_MODELS {
            catalog = catalog.with_model(model);
        }
        for (alias, model) in BUILTIN_ALIASES {
            catalog = catalog.with_alias(alias, model);
        }
        catalog
    }
}

impl ModelCatalog {
    /// Catalog without entries that still accepts well-formed ids.
    pub fn empty() -> Self {
        Self {
            known: HashSet::new(),
            aliases: HashMap::new(),
            allow_unlisted: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.known.insert(model.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, model: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), model.into());
        self
    }

    pub fn allow_unlisted(mut self, allow: bool) -> Self {
        self.allow_unlisted = allow;
        self
    }
}

impl ModelSupport for ModelCatalog {
    fn supports_model(&self, name: &str) -> bool {
        if self.known.contains(name) {
            return true;
        }
        self.allow_unlisted && looks_like_model_id(name)
    }

    fn resolve_alias(&self, name: &str) -> Option<String> {
        self.aliases.get(name).cloned()
    }
}

/// `vendor/model[:variant]` with no whitespace and non-empty parts.
fn looks_like_model_id(name: &str) -> bool {
    if name.chars().any(char::is_whitespace) {
        return false;
    }
    match name.split_once('/') {
        Some((vendor, model)) => !vendor.is_empty() && !model.is_empty(),
        None => false,
    }
}
