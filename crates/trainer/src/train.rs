use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};

use bert_core::safetensors_util::{self, LoadReport};
use bert_core::{BertConfig, SentimentClassifier, ENCODER_PREFIX, NO_DECAY_GROUP};

use crate::data::Sentiment;
use crate::dataset::DataLoader;
use crate::metrics::{accuracy, matthews_corrcoef, BestTracker, EpochMetrics, MetricsLogger};
use crate::schedule::{num_train_steps, LinearWarmup};
use crate::TrainerConfig;

pub const NUM_CLASSES: i64 = Sentiment::COUNT as i64;

/// AdamW epsilon used for fine-tuning.
const ADAM_EPS: f64 = 1e-6;
const LOG_EVERY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutput {
    pub predictions: Vec<i64>,
    pub targets: Vec<i64>,
    pub loss: f64,
    pub accuracy: f64,
}

/// Sidecar written next to the weights so a checkpoint can be rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub accuracy: f64,
    pub mcc: f64,
    pub num_classes: i64,
    pub bert_config: BertConfig,
}

impl CheckpointMeta {
    pub fn path_for(model_path: &Path) -> PathBuf {
        let mut name = model_path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    pub fn load(model_path: &Path) -> Result<Self> {
        let path = Self::path_for(model_path);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint metadata {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse checkpoint metadata {:?}", path))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub history: Vec<EpochMetrics>,
    pub best_accuracy: f64,
    /// Epoch whose weights are in the checkpoint, if one was written.
    pub best_epoch: Option<usize>,
}

pub struct Trainer {
    config: TrainerConfig,
    model: SentimentClassifier,
    optimizer: nn::Optimizer,
    schedule: Option<LinearWarmup>,
    step: usize,
    device: Device,
    vs: nn::VarStore,
}

fn count_correct(logits: &Tensor, labels: &Tensor) -> i64 {
    logits
        .argmax(-1, false)
        .eq_tensor(labels)
        .sum(Kind::Int64)
        .int64_value(&[])
}

impl Trainer {
    pub fn new(bert_config: &BertConfig, trainer_config: TrainerConfig, device: Device) -> Result<Self> {
        trainer_config.validate()?;
        if trainer_config.max_len as i64 > bert_config.max_position_embeddings {
            bail!(
                "max_len {} exceeds the encoder's {} position embeddings",
                trainer_config.max_len,
                bert_config.max_position_embeddings
            );
        }

        tch::manual_seed(trainer_config.seed as i64);
        let vs = nn::VarStore::new(device);
        let model = SentimentClassifier::new(&vs.root(), bert_config, NUM_CLASSES, trainer_config.dropout);

        let mut optimizer = nn::AdamW {
            wd: trainer_config.weight_decay,
            eps: ADAM_EPS,
            ..Default::default()
        }
        .build(&vs, trainer_config.learning_rate)?;
        optimizer.set_weight_decay_group(NO_DECAY_GROUP, 0.0);

        Ok(Self {
            config: trainer_config,
            model,
            optimizer,
            schedule: None,
            step: 0,
            device,
            vs,
        })
    }

    /// Rebuilds the classifier saved at `config.model_path`.
    pub fn from_checkpoint(trainer_config: TrainerConfig, device: Device) -> Result<Self> {
        let model_path = PathBuf::from(&trainer_config.model_path);
        let meta = CheckpointMeta::load(&model_path)?;
        if meta.num_classes != NUM_CLASSES {
            bail!(
                "Checkpoint has {} classes, expected {}",
                meta.num_classes,
                NUM_CLASSES
            );
        }

        let mut trainer = Self::new(&meta.bert_config, trainer_config, device)?;
        safetensors_util::load_safetensors(&mut trainer.vs, &model_path)?;
        log::info!(
            "Loaded checkpoint {:?} (epoch {}, accuracy {:.3})",
            model_path,
            meta.epoch,
            meta.accuracy
        );
        Ok(trainer)
    }

    /// Initializes the encoder from a pretrained safetensors file.
    pub fn load_pretrained<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport> {
        safetensors_util::load_pretrained(&mut self.vs, path, ENCODER_PREFIX)
    }

    /// Stretches the linear decay over `total_steps` optimizer steps.
    /// Without a schedule the learning rate stays at its base value.
    pub fn set_total_steps(&mut self, total_steps: usize) {
        self.schedule = Some(LinearWarmup::new(
            self.config.learning_rate,
            self.config.warmup_steps,
            total_steps,
        ));
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn steps_taken(&self) -> usize {
        self.step
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// One pass over `loader` with dropout on, stepping optimizer and
    /// schedule once per batch. Returns the mean batch loss and accuracy.
    pub fn train_epoch(&mut self, loader: &mut DataLoader) -> Result<EpochStats> {
        let num_batches = loader.num_batches();
        let mut total_loss = 0.0;
        let mut correct = 0i64;
        let mut seen = 0i64;
        let mut batches = 0usize;

        for batch in loader.epoch() {
            if let Some(schedule) = &self.schedule {
                self.optimizer.set_lr(schedule.lr_at(self.step));
            }

            let logits = self
                .model
                .forward_t(&batch.ids, &batch.mask, &batch.token_type_ids, true);
            let loss = logits.cross_entropy_for_logits(&batch.labels);
            self.optimizer.backward_step(&loss);
            self.step += 1;

            let loss_val = loss.double_value(&[]);
            total_loss += loss_val;
            correct += count_correct(&logits, &batch.labels);
            seen += batch.size();
            batches += 1;

            if batches % LOG_EVERY == 0 {
                log::debug!("Batch {}/{} | Loss: {:.4}", batches, num_batches, loss_val);
            }
        }

        if batches == 0 {
            bail!("Training set is empty");
        }

        Ok(EpochStats {
            loss: total_loss / batches as f64,
            accuracy: correct as f64 / seen as f64,
        })
    }

    /// Scores `loader` without gradients and with dropout off.
    pub fn evaluate(&self, loader: &mut DataLoader) -> Result<EvalOutput> {
        let mut predictions = Vec::with_capacity(loader.len());
        let mut targets = Vec::with_capacity(loader.len());
        let mut total_loss = 0.0;
        let mut batches = 0usize;

        tch::no_grad(|| -> Result<()> {
            for batch in loader.epoch() {
                let logits = self
                    .model
                    .forward_t(&batch.ids, &batch.mask, &batch.token_type_ids, false);
                total_loss += logits.cross_entropy_for_logits(&batch.labels).double_value(&[]);

                let preds = logits.argmax(-1, false).to_device(Device::Cpu);
                predictions.extend(Vec::<i64>::try_from(&preds)?);
                targets.extend(Vec::<i64>::try_from(&batch.labels.to_device(Device::Cpu))?);
                batches += 1;
            }
            Ok(())
        })?;

        if batches == 0 {
            bail!("Validation set is empty");
        }

        Ok(EvalOutput {
            accuracy: accuracy(&predictions, &targets),
            loss: total_loss / batches as f64,
            predictions,
            targets,
        })
    }

    /// Trains for `config.epochs` epochs, scoring the validation set after
    /// each one. The checkpoint is rewritten only when validation accuracy
    /// beats every earlier epoch.
    pub fn fit(&mut self, train: &mut DataLoader, valid: &mut DataLoader) -> Result<FitSummary> {
        let total_steps = num_train_steps(train.len(), self.config.train_batch_size, self.config.epochs);
        self.set_total_steps(total_steps);
        log::info!("Optimizer steps in schedule: {}", total_steps);

        let metrics_logger = MetricsLogger::new(&self.config.metrics_path)?;
        let mut best = BestTracker::default();
        let mut best_epoch = None;
        let mut history = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            log::info!("epoch={}", epoch);

            let train_stats = self.train_epoch(train)?;
            let eval = self.evaluate(valid)?;
            let val_mcc = matthews_corrcoef(&eval.predictions, &eval.targets, Sentiment::COUNT);

            log::info!("val_MCC_Score = {:.3}", val_mcc);
            log::info!("train_loss={:.4}, val_loss={:.4}", train_stats.loss, eval.loss);
            log::info!("train_acc={:.3}, val_acc={:.3}", train_stats.accuracy, eval.accuracy);
            log::info!("Accuracy Score = {:.3}", eval.accuracy);

            let row = EpochMetrics {
                epoch,
                train_loss: train_stats.loss,
                train_acc: train_stats.accuracy,
                val_loss: eval.loss,
                val_acc: eval.accuracy,
                val_mcc,
            };
            metrics_logger.log(&row)?;
            history.push(row);

            if best.observe(eval.accuracy) {
                log::info!("Saving model with Accuracy Score = {:.3}", eval.accuracy);
                self.save_checkpoint(&CheckpointMeta {
                    epoch,
                    accuracy: eval.accuracy,
                    mcc: val_mcc,
                    num_classes: NUM_CLASSES,
                    bert_config: self.model.config().clone(),
                })?;
                best_epoch = Some(epoch);
            }
        }

        Ok(FitSummary {
            history,
            best_accuracy: best.best(),
            best_epoch,
        })
    }

    /// Writes the weights to `config.model_path` and the metadata sidecar.
    pub fn save_checkpoint(&self, meta: &CheckpointMeta) -> Result<()> {
        let path = Path::new(&self.config.model_path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        safetensors_util::save_safetensors(&self.vs, path)?;
        fs::write(CheckpointMeta::path_for(path), serde_json::to_string_pretty(meta)?)?;
        log::debug!("Saved checkpoint to {:?}", path);
        Ok(())
    }
}
