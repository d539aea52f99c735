use tch::{nn, nn::Module, Kind, Tensor};
use crate::attention::{extended_attention_mask, Attention};
use crate::config::BertConfig;
use crate::layers::{bert_init, LayerNorm, Linear};

/// Word + position + segment embeddings, normalized.
pub struct Embeddings {
    word_embeddings: nn::Embedding,
    position_embeddings: nn::Embedding,
    token_type_embeddings: nn::Embedding,
    layer_norm: LayerNorm,
    dropout: f64,
}

impl Embeddings {
    pub fn new(vs: &nn::Path, config: &BertConfig) -> Self {
        let emb_config = nn::EmbeddingConfig {
            ws_init: bert_init(),
            ..Default::default()
        };
        let hidden = config.hidden_size;

        Self {
            word_embeddings: nn::embedding(vs / "word_embeddings", config.vocab_size, hidden, emb_config),
            position_embeddings: nn::embedding(
                vs / "position_embeddings",
                config.max_position_embeddings,
                hidden,
                emb_config,
            ),
            token_type_embeddings: nn::embedding(
                vs / "token_type_embeddings",
                config.type_vocab_size,
                hidden,
                emb_config,
            ),
            layer_norm: LayerNorm::new(&(vs / "LayerNorm"), config),
            dropout: config.hidden_dropout_prob,
        }
    }

    /// ids, token_type_ids: [batch, seq_len] (Int64)
    pub fn forward_t(&self, ids: &Tensor, token_type_ids: &Tensor, train: bool) -> Tensor {
        let seq_len = ids.size()[1];
        let position_ids = Tensor::arange(seq_len, (Kind::Int64, ids.device())).unsqueeze(0);

        let x = ids.apply(&self.word_embeddings)
            + position_ids.apply(&self.position_embeddings)
            + token_type_ids.apply(&self.token_type_embeddings);

        self.layer_norm.forward(&x).dropout(self.dropout, train)
    }
}

/// Position-wise feed-forward block (`intermediate` + `output` in the checkpoint).
pub struct FeedForward {
    intermediate: Linear,
    output: Linear,
    layer_norm: LayerNorm,
    activation: Activation,
    dropout: f64,
}

#[derive(Debug, Clone, Copy)]
enum Activation {
    Gelu,
    Relu,
}

impl FeedForward {
    pub fn new(vs: &nn::Path, config: &BertConfig) -> Self {
        let output = vs / "output";
        let activation = match config.hidden_act.as_str() {
            "relu" => Activation::Relu,
            _ => Activation::Gelu,
        };

        Self {
            intermediate: Linear::new(
                &(vs / "intermediate" / "dense"),
                config.hidden_size,
                config.intermediate_size,
            ),
            output: Linear::new(&(&output / "dense"), config.intermediate_size, config.hidden_size),
            layer_norm: LayerNorm::new(&(&output / "LayerNorm"), config),
            activation,
            dropout: config.hidden_dropout_prob,
        }
    }

    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let h = x.apply(&self.intermediate);
        let h = match self.activation {
            Activation::Gelu => h.gelu("none"),
            Activation::Relu => h.relu(),
        };
        let h = h.apply(&self.output).dropout(self.dropout, train);
        self.layer_norm.forward(&(h + x))
    }
}

/// One post-LayerNorm transformer layer.
pub struct Layer {
    attention: Attention,
    ffn: FeedForward,
}

impl Layer {
    pub fn new(vs: &nn::Path, config: &BertConfig) -> Self {
        Self {
            attention: Attention::new(&(vs / "attention"), config),
            ffn: FeedForward::new(vs, config),
        }
    }

    pub fn forward_t(&self, x: &Tensor, mask_bias: &Tensor, train: bool) -> Tensor {
        let x = self.attention.forward_t(x, mask_bias, train);
        self.ffn.forward_t(&x, train)
    }
}

/// BERT encoder with pooler.
pub struct BertModel {
    embeddings: Embeddings,
    layers: Vec<Layer>,
    pooler: Linear,
    pub config: BertConfig,
}

impl BertModel {
    pub fn new(vs: &nn::Path, config: &BertConfig) -> Self {
        let embeddings = Embeddings::new(&(vs / "embeddings"), config);

        let mut layers = Vec::new();
        for i in 0..config.num_hidden_layers {
            layers.push(Layer::new(&(vs / "encoder" / "layer" / i), config));
        }

        let pooler = Linear::new(&(vs / "pooler" / "dense"), config.hidden_size, config.hidden_size);

        Self {
            embeddings,
            layers,
            pooler,
            config: config.clone(),
        }
    }

    /// Returns `(sequence_output [B, T, H], pooled_output [B, H])`.
    pub fn forward_t(
        &self,
        ids: &Tensor,
        mask: &Tensor,
        token_type_ids: &Tensor,
        train: bool,
    ) -> (Tensor, Tensor) {
        let mask_bias = extended_attention_mask(mask);

        let mut x = self.embeddings.forward_t(ids, token_type_ids, train);
        for layer in &self.layers {
            x = layer.forward_t(&x, &mask_bias, train);
        }

        let pooled = x.select(1, 0).apply(&self.pooler).tanh();
        (x, pooled)
    }
}
