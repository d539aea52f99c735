use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// CSV with `content` and `sentiment` columns.
    pub data_path: String,
    /// Where the best checkpoint is written.
    pub model_path: String,
    /// Per-epoch metrics CSV.
    pub metrics_path: String,
    /// Hub model id, or a local directory holding config.json,
    /// tokenizer.json and model.safetensors.
    pub bert_path: String,
    pub max_len: usize,
    pub train_batch_size: usize,
    pub valid_batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub warmup_steps: usize,
    /// Dropout in front of the classification head.
    pub dropout: f64,
    /// Fraction of rows held out for validation.
    pub test_size: f64,
    pub seed: u64,
    pub lowercase: bool,
    /// Start from the pretrained encoder weights instead of a random init.
    pub pretrained: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            data_path: "./data/train.csv".to_string(),
            model_path: "model.safetensors".to_string(),
            metrics_path: "metrics.csv".to_string(),
            bert_path: "bert-base-multilingual-cased".to_string(),
            max_len: 512,
            train_batch_size: 8,
            valid_batch_size: 4,
            epochs: 5,
            learning_rate: 3e-5,
            weight_decay: 0.001,
            warmup_steps: 0,
            dropout: 0.3,
            test_size: 0.2,
            seed: 42,
            lowercase: true,
            pretrained: true,
        }
    }
}

impl TrainerConfig {
    /// Reads the YAML file at `path` if it exists, otherwise returns defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: TrainerConfig = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read training config {:?}", path))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse training config {:?}", path))?
        } else {
            TrainerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_len < 2 {
            bail!("max_len must be at least 2, got {}", self.max_len);
        }
        if self.train_batch_size == 0 || self.valid_batch_size == 0 {
            bail!("batch sizes must be positive");
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            bail!("test_size must be in (0, 1), got {}", self.test_size);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_overrides_defaults() {
        let config: TrainerConfig = serde_yaml::from_str("epochs: 2\nmax_len: 128\n").unwrap();
        assert_eq!(config.epochs, 2);
        assert_eq!(config.max_len, 128);
        assert_eq!(config.train_batch_size, 8);
        assert_eq!(config.bert_path, "bert-base-multilingual-cased");
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = TrainerConfig::load_or_default("does/not/exist.yaml").unwrap();
        assert_eq!(config, TrainerConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let config = TrainerConfig {
            test_size: 1.0,
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrainerConfig {
            valid_batch_size: 0,
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
