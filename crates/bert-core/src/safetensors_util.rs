use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::MmapOptions;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use tch::{nn, Device, Kind, Tensor};

/// Outcome of importing a pretrained checkpoint into a var store.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadReport {
    /// Model variables that received a tensor from the file.
    pub loaded: Vec<String>,
    /// Tensors in the file the model has no variable for.
    pub skipped: Vec<String>,
    /// Model variables the file did not cover; they keep their init.
    pub missing: Vec<String>,
}

/// Maps a tensor name from a hub checkpoint onto our variable naming.
///
/// Legacy TF-era names use `gamma`/`beta` for LayerNorm; bare encoder names
/// get `prefix` prepended.
pub fn normalize_name(raw: &str, prefix: &str) -> String {
    let name = if let Some(stem) = raw.strip_suffix(".gamma") {
        format!("{}.weight", stem)
    } else if let Some(stem) = raw.strip_suffix(".beta") {
        format!("{}.bias", stem)
    } else {
        raw.to_string()
    };

    if prefix.is_empty() || name.starts_with(&format!("{}.", prefix)) {
        name
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn kind_of(dtype: Dtype) -> Result<Kind> {
    Ok(match dtype {
        Dtype::F32 => Kind::Float,
        Dtype::F16 => Kind::Half,
        Dtype::BF16 => Kind::BFloat16,
        Dtype::F64 => Kind::Double,
        Dtype::I64 => Kind::Int64,
        other => bail!("Unsupported dtype: {:?}", other),
    })
}

fn import<P: AsRef<Path>>(vs: &mut nn::VarStore, path: P, prefix: &str) -> Result<LoadReport> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let buffer = unsafe { MmapOptions::new().map(&file)? };
    let tensors = SafeTensors::deserialize(&buffer)
        .with_context(|| format!("Failed to parse safetensors file {:?}", path))?;

    let mut variables = vs.variables();
    let device = vs.device();
    let mut report = LoadReport::default();
    let mut seen = HashSet::new();

    for (raw_name, view) in tensors.tensors() {
        let name = normalize_name(&raw_name, prefix);
        let Some(var) = variables.get_mut(&name) else {
            log::debug!("Skipping tensor {} (no matching variable)", raw_name);
            report.skipped.push(raw_name);
            continue;
        };

        let shape: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
        if var.size() != shape {
            bail!(
                "Shape mismatch for {}: model has {:?}, file has {:?}",
                name,
                var.size(),
                shape
            );
        }

        let kind = kind_of(view.dtype())?;
        let tensor = Tensor::from_data_size(view.data(), &shape, kind).to_device(device);
        tch::no_grad(|| {
            var.copy_(&tensor);
        });
        seen.insert(name.clone());
        report.loaded.push(name);
    }

    let mut missing: Vec<String> = variables
        .keys()
        .filter(|name| !seen.contains(*name))
        .cloned()
        .collect();
    missing.sort();
    report.missing = missing;

    Ok(report)
}

/// Imports pretrained encoder weights. Tensors the model does not know about
/// (pretraining heads) are skipped; variables the file lacks (the new
/// classification head) keep their initialization.
pub fn load_pretrained<P: AsRef<Path>>(
    vs: &mut nn::VarStore,
    path: P,
    prefix: &str,
) -> Result<LoadReport> {
    let report = import(vs, path, prefix)?;
    log::info!(
        "Loaded {} pretrained tensors ({} skipped, {} newly initialized)",
        report.loaded.len(),
        report.skipped.len(),
        report.missing.len()
    );
    for name in &report.missing {
        log::debug!("Not in pretrained checkpoint: {}", name);
    }
    Ok(report)
}

/// Restores a checkpoint written by [`save_safetensors`]. Every variable of
/// the model must be present in the file.
pub fn load_safetensors<P: AsRef<Path>>(vs: &mut nn::VarStore, path: P) -> Result<()> {
    let path = path.as_ref();
    let report = import(vs, path, "")?;
    if !report.missing.is_empty() {
        bail!(
            "Checkpoint {:?} is missing {} variables, e.g. {}",
            path,
            report.missing.len(),
            report.missing[0]
        );
    }
    Ok(())
}

/// Writes every variable of the store as F32 into a safetensors file.
pub fn save_safetensors<P: AsRef<Path>>(vs: &nn::VarStore, path: P) -> Result<()> {
    let path = path.as_ref();

    let mut entries: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
    for (name, var) in vs.variables() {
        let tensor = var.detach().to_kind(Kind::Float).to_device(Device::Cpu).contiguous();
        let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
        let values = Vec::<f32>::try_from(&tensor.flatten(0, -1))?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        entries.push((name, shape, bytes));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let views = entries
        .iter()
        .map(|(name, shape, bytes)| Ok((name.as_str(), TensorView::new(Dtype::F32, shape.clone(), bytes)?)))
        .collect::<Result<Vec<_>>>()?;

    safetensors::serialize_to_file(views, &None, path)
        .with_context(|| format!("Failed to write checkpoint {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{SentimentClassifier, ENCODER_PREFIX};
    use crate::config::BertConfig;

    fn tiny_config() -> BertConfig {
        BertConfig {
            vocab_size: 30,
            hidden_size: 8,
            num_hidden_layers: 1,
            num_attention_heads: 2,
            intermediate_size: 16,
            max_position_embeddings: 12,
            ..BertConfig::default()
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("bert_core_{}_{}", std::process::id(), name))
    }

    #[test]
    fn normalizes_hub_names() {
        assert_eq!(
            normalize_name("bert.embeddings.LayerNorm.gamma", "bert"),
            "bert.embeddings.LayerNorm.weight"
        );
        assert_eq!(
            normalize_name("encoder.layer.0.output.LayerNorm.beta", "bert"),
            "bert.encoder.layer.0.output.LayerNorm.bias"
        );
        assert_eq!(normalize_name("out.weight", ""), "out.weight");
        assert_eq!(
            normalize_name("cls.predictions.bias", "bert"),
            "bert.cls.predictions.bias"
        );
    }

    #[test]
    fn checkpoint_round_trip_restores_weights() {
        let path = temp_path("roundtrip.safetensors");
        let config = tiny_config();

        let vs = nn::VarStore::new(Device::Cpu);
        let _model = SentimentClassifier::new(&vs.root(), &config, 3, 0.1);
        save_safetensors(&vs, &path).unwrap();

        let mut restored = nn::VarStore::new(Device::Cpu);
        let _model = SentimentClassifier::new(&restored.root(), &config, 3, 0.1);
        load_safetensors(&mut restored, &path).unwrap();

        let original = vs.variables();
        for (name, var) in restored.variables() {
            assert!(var.equal(&original[&name]), "{} differs", name);
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn pretrained_import_keeps_head_initialized() {
        let path = temp_path("encoder.safetensors");
        let config = tiny_config();

        // An encoder-only file with bare names, like a hub BertModel export.
        let encoder_vs = nn::VarStore::new(Device::Cpu);
        let _encoder = crate::encoder::BertModel::new(&encoder_vs.root(), &config);
        save_safetensors(&encoder_vs, &path).unwrap();

        let mut vs = nn::VarStore::new(Device::Cpu);
        let _model = SentimentClassifier::new(&vs.root(), &config, 3, 0.1);
        let report = load_pretrained(&mut vs, &path, ENCODER_PREFIX).unwrap();

        assert_eq!(report.missing, vec!["out.bias".to_string(), "out.weight".to_string()]);
        assert!(report.skipped.is_empty());
        let word = &vs.variables()["bert.embeddings.word_embeddings.weight"];
        assert!(word.equal(&encoder_vs.variables()["embeddings.word_embeddings.weight"]));

        // Strict loading refuses the same file.
        let mut strict = nn::VarStore::new(Device::Cpu);
        let _model = SentimentClassifier::new(&strict.root(), &config, 3, 0.1);
        assert!(load_safetensors(&mut strict, &path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let path = temp_path("mismatch.safetensors");
        let vs = nn::VarStore::new(Device::Cpu);
        let _model = SentimentClassifier::new(&vs.root(), &tiny_config(), 3, 0.1);
        save_safetensors(&vs, &path).unwrap();

        let mut other = nn::VarStore::new(Device::Cpu);
        let _model = SentimentClassifier::new(&other.root(), &tiny_config(), 5, 0.1);
        assert!(load_safetensors(&mut other, &path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
