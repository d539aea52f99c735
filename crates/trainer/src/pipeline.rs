use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use tch::Device;

use bert_core::BertConfig;
use tokenizer::BertTokenizer;

use crate::data::{load_reviews, train_test_split, Review, Sentiment};
use crate::dataset::{DataLoader, SentimentDataset};
use crate::hub::PretrainedFiles;
use crate::metrics::matthews_corrcoef;
use crate::train::{EvalOutput, FitSummary, Trainer};
use crate::TrainerConfig;

/// Reads the CSV and holds out the validation rows.
pub fn prepare_split(config: &TrainerConfig) -> Result<(Vec<Review>, Vec<Review>)> {
    let reviews = load_reviews(&config.data_path)?;
    if reviews.is_empty() {
        bail!("No rows in {}", config.data_path);
    }

    let (train, valid) = train_test_split(reviews, config.test_size, config.seed);
    if train.is_empty() || valid.is_empty() {
        bail!(
            "Split of {} rows left an empty side (train {}, valid {})",
            train.len() + valid.len(),
            train.len(),
            valid.len()
        );
    }
    Ok((train, valid))
}

fn load_tokenizer(files: &PretrainedFiles, config: &TrainerConfig) -> Result<BertTokenizer> {
    Ok(BertTokenizer::from_file(&files.tokenizer)?.with_lowercase(config.lowercase))
}

/// Wall-clock seconds since the Unix epoch.
pub fn unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Full fine-tuning run: data, tokenizer, encoder, train/validate loop.
pub fn run_training(config: &TrainerConfig, device: Device) -> Result<FitSummary> {
    log::info!("Run started at {} (unix seconds)", unix_timestamp()?);

    let files = PretrainedFiles::resolve(&config.bert_path, config.pretrained)?;
    let bert_config = BertConfig::from_file(&files.config)?;
    let tokenizer = load_tokenizer(&files, config)?;

    let (train_rows, valid_rows) = prepare_split(config)?;
    log::info!("Bert Model: {}", config.bert_path);
    log::info!("Train size : {}", train_rows.len());
    log::info!("Valid size : {}", valid_rows.len());

    let train_set = SentimentDataset::new(&train_rows, &tokenizer, config.max_len)?;
    let valid_set = SentimentDataset::new(&valid_rows, &tokenizer, config.max_len)?;

    let mut trainer = Trainer::new(&bert_config, config.clone(), device)?;
    if let Some(weights) = &files.weights {
        trainer.load_pretrained(weights)?;
    } else {
        log::warn!("Starting from a randomly initialized encoder");
    }

    let mut train_loader = DataLoader::shuffled(&train_set, config.train_batch_size, device, config.seed);
    let mut valid_loader = DataLoader::sequential(&valid_set, config.valid_batch_size, device);

    let summary = trainer.fit(&mut train_loader, &mut valid_loader)?;
    match summary.best_epoch {
        Some(epoch) => log::info!(
            "Best Accuracy Score = {:.3} at epoch {}, saved to {}",
            summary.best_accuracy,
            epoch,
            config.model_path
        ),
        None => log::warn!("Validation accuracy never rose above 0; no checkpoint written"),
    }
    Ok(summary)
}

/// Re-scores the saved checkpoint on the validation split.
pub fn run_evaluation(config: &TrainerConfig, device: Device) -> Result<EvalOutput> {
    let files = PretrainedFiles::resolve(&config.bert_path, false)?;
    let tokenizer = load_tokenizer(&files, config)?;
    let (_, valid_rows) = prepare_split(config)?;
    let valid_set = SentimentDataset::new(&valid_rows, &tokenizer, config.max_len)?;

    let trainer = Trainer::from_checkpoint(config.clone(), device)?;
    let mut loader = DataLoader::sequential(&valid_set, config.valid_batch_size, device);
    let eval = trainer.evaluate(&mut loader)?;

    let mcc = matthews_corrcoef(&eval.predictions, &eval.targets, Sentiment::COUNT);
    log::info!("Valid size : {}", valid_rows.len());
    log::info!("val_loss={:.4}, val_acc={:.3}, val_mcc={:.3}", eval.loss, eval.accuracy, mcc);
    for (label, count) in prediction_counts(&eval.predictions) {
        log::info!("predicted {:<8} : {}", label.name(), count);
    }
    Ok(eval)
}

/// Number of predictions per class, in class-id order.
pub fn prediction_counts(predictions: &[i64]) -> Vec<(Sentiment, usize)> {
    let mut counts = [0usize; Sentiment::COUNT];
    for &p in predictions {
        if let Some(slot) = usize::try_from(p).ok().and_then(|i| counts.get_mut(i)) {
            *slot += 1;
        }
    }
    counts
        .iter()
        .enumerate()
        .filter_map(|(id, &n)| Sentiment::from_class_id(id as i64).map(|s| (s, n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_timestamp_is_wall_clock() {
        // 2020-01-01T00:00:00Z
        assert!(unix_timestamp().unwrap() > 1_577_836_800);
    }

    #[test]
    fn counts_predictions_per_class() {
        let counts = prediction_counts(&[2, 1, 1, 0, 2, 2, 7]);
        assert_eq!(
            counts,
            vec![
                (Sentiment::Neutral, 1),
                (Sentiment::Positive, 2),
                (Sentiment::Negative, 3),
            ]
        );
    }
}
