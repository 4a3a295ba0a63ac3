use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Output-token counter wrapping a tiktoken encoding chosen per model.
///
/// `gpt-4o`/`gpt-4.1` families use `o200k_base`, Qwen models use
/// `cl100k_base`, any other model gets its own registered encoding when
/// tiktoken knows it and `cl100k_base` otherwise. If no encoding loads,
/// every count is 0.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Option<Arc<CoreBPE>>,
}

impl TokenCounter {
    pub fn for_model(model: &str) -> Self {
        let bpe = load_encoding(model);
        if bpe.is_none() {
            warn!(model, "No tokenizer available, token counts will be 0");
        }
        Self {
            bpe: bpe.map(Arc::new),
        }
    }

    /// A counter that always reports 0.
    pub fn disabled() -> Self {
        Self { bpe: None }
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe
            .as_ref()
            .map_or(0, |bpe| bpe.encode_ordinary(text).len())
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("loaded", &self.bpe.is_some())
            .finish()
    }
}

fn load_encoding(model: &str) -> Option<CoreBPE> {
    let lower = model.to_ascii_lowercase();
    if lower.contains("gpt-4o") || lower.contains("gpt-4.1") {
        return tiktoken_rs::o200k_base().ok();
    }
    if lower.contains("qwen") {
        return tiktoken_rs::cl100k_base().ok();
    }
    let basename = model.rsplit('/').next().unwrap_or(model);
    tiktoken_rs::get_bpe_from_model(basename)
        .ok()
        .or_else(|| tiktoken_rs::cl100k_base().ok())
}
