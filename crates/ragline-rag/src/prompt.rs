//! System prompts, model profiles and prompt assembly.

use std::collections::BTreeMap;

use ragline_backend::ChatMessage;

use crate::index::SearchResult;

/// System prompt used when the current model has no profile.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Based only on the given context, answer the user's question. If you don't know the answer from the context, admit it.";

/// Chat models known out of the box.
const BUILTIN_MODELS: [&str; 4] = [
    "qwen3-8b-mlx",
    "qwen3-14b-mlx",
    "deepcogito-cogito-v1-preview-qwen-32b",
    "llama3-8b-mlx",
];

/// What we know about a chat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    pub name: String,
    /// Free-form family or format tag, e.g. "mlx".
    pub kind: String,
    pub context_length: usize,
    pub system_prompt: String,
}

impl ModelProfile {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "mlx".to_string(),
            context_length: 8192,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }
}

/// Registry of model profiles, one per pipeline.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    profiles: BTreeMap<String, ModelProfile>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in chat models.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in BUILTIN_MODELS {
            registry.register(ModelProfile::new(name, DEFAULT_SYSTEM_PROMPT));
        }
        registry
    }

    /// Add or replace a profile.
    pub fn register(&mut self, profile: ModelProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&ModelProfile> {
        self.profiles.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn system_prompt_for(&self, model: &str) -> &str {
        self.get(model)
            .map(|p| p.system_prompt.as_str())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

/// Render retrieved documents as numbered context blocks.
pub fn format_context(contexts: &[SearchResult]) -> String {
    contexts
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("Document {}:\n{}", i + 1, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System prompt with context, then replayed history, then the new question.
pub fn build_messages(
    system_prompt: &str,
    contexts: &[SearchResult],
    history: &[ChatMessage],
    query: &str,
) -> Vec<ChatMessage> {
    let system = format!("{}\n\nContext:\n{}", system_prompt, format_context(contexts));

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(query));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_backend::Role;

    fn result(content: &str) -> SearchResult {
        SearchResult {
            id: 0,
            content: content.to_string(),
            metadata: BTreeMap::new(),
            score: 1.0,
        }
    }

    #[test]
    fn test_system_prompt_fallback() {
        let mut registry = PromptRegistry::with_defaults();
        assert_eq!(registry.system_prompt_for("unknown-model"), DEFAULT_SYSTEM_PROMPT);

        registry.register(ModelProfile::new("vet-7b", "You are a veterinary assistant."));
        assert_eq!(
            registry.system_prompt_for("vet-7b"),
            "You are a veterinary assistant."
        );
        assert!(registry.list().contains(&"qwen3-8b-mlx"));
    }

    #[test]
    fn test_format_context() {
        let text = format_context(&[result("first"), result("second")]);
        assert_eq!(text, "Document 1:\nfirst\n\nDocument 2:\nsecond");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_build_messages_order() {
        let history = vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")];
        let messages = build_messages("SYS", &[result("doc")], &history, "q2");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("SYS\n\nContext:\nDocument 1:\ndoc"));
        assert_eq!(messages[1].content, "q1");
        assert_eq!(messages[2].content, "a1");
        assert_eq!(messages[3], ChatMessage::user("q2"));
    }
}
