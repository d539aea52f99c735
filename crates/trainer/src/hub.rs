use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use hf_hub::api::sync::Api;

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Local paths of the pretrained assets a run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainedFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    /// Only resolved when the encoder starts from pretrained weights.
    pub weights: Option<PathBuf>,
}

impl PretrainedFiles {
    /// `bert_path` is either a local directory or a Hugging Face hub model id.
    pub fn resolve(bert_path: &str, with_weights: bool) -> Result<Self> {
        let local = Path::new(bert_path);
        if local.is_dir() {
            Self::from_dir(local, with_weights)
        } else {
            Self::download(bert_path, with_weights)
        }
    }

    pub fn from_dir(dir: &Path, with_weights: bool) -> Result<Self> {
        let existing = |name: &str| -> Result<PathBuf> {
            let path = dir.join(name);
            if !path.is_file() {
                bail!("{} not found in {:?}", name, dir);
            }
            Ok(path)
        };

        Ok(Self {
            config: existing(CONFIG_FILE)?,
            tokenizer: existing(TOKENIZER_FILE)?,
            weights: if with_weights { Some(existing(WEIGHTS_FILE)?) } else { None },
        })
    }

    fn download(model_id: &str, with_weights: bool) -> Result<Self> {
        log::info!("Fetching {} from the Hugging Face hub", model_id);
        let api = Api::new().context("Failed to initialize the Hugging Face hub client")?;
        let repo = api.model(model_id.to_string());
        let fetch = |name: &str| {
            repo.get(name)
                .with_context(|| format!("Failed to download {} from {}", name, model_id))
        };

        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            weights: if with_weights { Some(fetch(WEIGHTS_FILE)?) } else { None },
        })
    }
}
