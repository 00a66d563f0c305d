//! Translation of requested model names into names the model provider understands.
//!
//! Clients written against other embedding APIs send names like
//! `text-embedding-3-small`; those are mapped onto sentence-transformers models
//! of comparable size.

/// Substrings (lowercase) that mark a name as already being a sentence-transformers model.
const CANONICAL_PATTERNS: &[&str] = &[
    "all-minilm",
    "all-mpnet",
    "paraphrase",
    "sentence-transformers",
];

/// Foreign model names (lowercase) and the canonical model each maps to.
const FOREIGN_MODELS: &[(&str, &str)] = &[
    ("text-embedding-3-small", "all-MiniLM-L6-v2"),
    ("text-embedding-3-large", "all-mpnet-base-v2"),
    ("text-embedding-ada-002", "all-MiniLM-L6-v2"),
    ("text-embedding", "all-MiniLM-L6-v2"),
];

/// Resolves requested model names to canonical ones. Never fails.
#[derive(Debug, Clone)]
pub struct NameMapper {
    default_model: String,
}

impl NameMapper {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Resolve a requested model name.
    ///
    /// Absent or empty names resolve to the default model. Canonical names pass
    /// through untouched, known foreign names are mapped, and anything else is
    /// returned as-is so the provider gets a chance to load it.
    pub fn resolve(&self, requested: Option<&str>) -> String {
        let requested = match requested {
            Some(name) if !name.is_empty() => name,
            _ => return self.default_model.clone(),
        };

        let lowered = requested.to_lowercase();

        if is_canonical(&lowered) {
            return requested.to_string();
        }

        if let Some(mapped) = lookup_foreign(&lowered) {
            tracing::debug!("Mapped model name: {} -> {}", requested, mapped);
            return mapped.to_string();
        }

        tracing::warn!(
            "Unknown model name '{}', using as-is. If it fails, will fall back to default: {}",
            requested,
            self.default_model
        );
        requested.to_string()
    }
}

fn is_canonical(lowered: &str) -> bool {
    CANONICAL_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

fn lookup_foreign(lowered: &str) -> Option<&'static str> {
    FOREIGN_MODELS
        .iter()
        .find(|(foreign, _)| *foreign == lowered)
        .map(|(_, canonical)| *canonical)
}
