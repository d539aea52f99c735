use tch::{nn, Tensor};
use crate::config::BertConfig;
use crate::encoder::BertModel;
use crate::layers::Linear;

/// Variable prefix of the encoder inside a classifier var store.
pub const ENCODER_PREFIX: &str = "bert";

/// BERT encoder with a dropout + linear head over the pooled `[CLS]` output.
pub struct SentimentClassifier {
    bert: BertModel,
    out: Linear,
    dropout: f64,
    pub num_classes: i64,
}

impl SentimentClassifier {
    pub fn new(vs: &nn::Path, config: &BertConfig, num_classes: i64, dropout: f64) -> Self {
        let bert = BertModel::new(&(vs / ENCODER_PREFIX), config);
        let out = Linear::new(&(vs / "out"), config.hidden_size, num_classes);

        Self {
            bert,
            out,
            dropout,
            num_classes,
        }
    }

    pub fn config(&self) -> &BertConfig {
        &self.bert.config
    }

    /// Returns class logits of shape `[batch, num_classes]`.
    pub fn forward_t(
        &self,
        ids: &Tensor,
        mask: &Tensor,
        token_type_ids: &Tensor,
        train: bool,
    ) -> Tensor {
        let (_, pooled) = self.bert.forward_t(ids, mask, token_type_ids, train);
        pooled.dropout(self.dropout, train).apply(&self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn logits_have_one_column_per_class() {
        let config = BertConfig {
            vocab_size: 40,
            hidden_size: 8,
            num_hidden_layers: 1,
            num_attention_heads: 2,
            intermediate_size: 16,
            max_position_embeddings: 16,
            ..BertConfig::default()
        };
        let vs = nn::VarStore::new(Device::Cpu);
        let model = SentimentClassifier::new(&vs.root(), &config, 3, 0.3);

        let ids = Tensor::from_slice(&[2i64, 5, 6, 3, 2, 7, 3, 0]).view([2, 4]);
        let mask = ids.ne(0).to_kind(Kind::Int64);
        let logits = model.forward_t(&ids, &mask, &ids.zeros_like(), true);

        assert_eq!(logits.size(), vec![2, 3]);
        assert!(vs.variables().contains_key("out.weight"));
        assert!(vs.variables().contains_key("bert.pooler.dense.bias"));
    }
}
