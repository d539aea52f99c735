use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Architecture of a BERT encoder, in the layout of a Hugging Face `config.json`.
///
/// Unknown keys in the file (`architectures`, `model_type`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BertConfig {
    /// Size of the WordPiece vocabulary.
    pub vocab_size: i64,
    /// Dimension of the hidden states.
    pub hidden_size: i64,
    /// Number of transformer layers.
    pub num_hidden_layers: i64,
    /// Number of attention heads per layer.
    pub num_attention_heads: i64,
    /// Width of the feed-forward block.
    pub intermediate_size: i64,
    /// Activation of the feed-forward block ("gelu" or "relu").
    pub hidden_act: String,
    /// Dropout on embeddings and residual branches.
    pub hidden_dropout_prob: f64,
    /// Dropout on attention probabilities.
    pub attention_probs_dropout_prob: f64,
    /// Maximum sequence length covered by position embeddings.
    pub max_position_embeddings: i64,
    /// Number of segment (token type) ids.
    pub type_vocab_size: i64,
    pub layer_norm_eps: f64,
    pub pad_token_id: i64,
}

impl Default for BertConfig {
    fn default() -> Self {
        // bert-base-multilingual-cased
        Self {
            vocab_size: 119547,
            hidden_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            hidden_act: "gelu".to_string(),
            hidden_dropout_prob: 0.1,
            attention_probs_dropout_prob: 0.1,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
            pad_token_id: 0,
        }
    }
}

impl BertConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read BERT config at {:?}", path))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse BERT config at {:?}", path))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: BertConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn head_size(&self) -> i64 {
        self.hidden_size / self.num_attention_heads
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_attention_heads <= 0 || self.hidden_size % self.num_attention_heads != 0 {
            anyhow::bail!(
                "hidden_size {} is not a multiple of num_attention_heads {}",
                self.hidden_size,
                self.num_attention_heads
            );
        }
        match self.hidden_act.as_str() {
            "gelu" | "relu" => Ok(()),
            other => anyhow::bail!("Unsupported hidden_act: {}", other),
        }
    }
}
