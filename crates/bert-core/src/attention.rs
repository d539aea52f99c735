use tch::{nn, nn::Module, Kind, Tensor};
use crate::config::BertConfig;
use crate::layers::{LayerNorm, Linear};

/// Large negative score added to padded key positions before the softmax.
const MASKED_SCORE: f64 = -10000.0;

/// Turns a `[batch, seq_len]` 0/1 attention mask into an additive bias of
/// shape `[batch, 1, 1, seq_len]`: 0 for real tokens, a large negative value
/// for padding.
pub fn extended_attention_mask(mask: &Tensor) -> Tensor {
    let mask = mask.to_kind(Kind::Float).unsqueeze(1).unsqueeze(2);
    (mask.ones_like() - mask) * MASKED_SCORE
}

/// Bidirectional multi-head self-attention.
pub struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    n_head: i64,
    head_size: i64,
    dropout: f64,
}

impl SelfAttention {
    pub fn new(vs: &nn::Path, config: &BertConfig) -> Self {
        let hidden = config.hidden_size;
        Self {
            query: Linear::new(&(vs / "query"), hidden, hidden),
            key: Linear::new(&(vs / "key"), hidden, hidden),
            value: Linear::new(&(vs / "value"), hidden, hidden),
            n_head: config.num_attention_heads,
            head_size: config.head_size(),
            dropout: config.attention_probs_dropout_prob,
        }
    }

    /// x: [batch, seq_len, hidden], mask_bias: [batch, 1, 1, seq_len]
    pub fn forward_t(&self, x: &Tensor, mask_bias: &Tensor, train: bool) -> Tensor {
        let size = x.size();
        let (b, t, c) = (size[0], size[1], size[2]);

        let split_heads = |xs: Tensor| xs.view([b, t, self.n_head, self.head_size]).transpose(1, 2);
        let q = split_heads(x.apply(&self.query));
        let k = split_heads(x.apply(&self.key));
        let v = split_heads(x.apply(&self.value));

        let att = q.matmul(&k.transpose(-2, -1)) * (1.0 / (self.head_size as f64).sqrt());
        let att = att + mask_bias;
        let att = att.softmax(-1, Kind::Float).dropout(self.dropout, train);

        att.matmul(&v).transpose(1, 2).contiguous().view([b, t, c])
    }
}

/// Self-attention followed by its output projection and residual LayerNorm.
pub struct Attention {
    self_attn: SelfAttention,
    dense: Linear,
    layer_norm: LayerNorm,
    dropout: f64,
}

impl Attention {
    pub fn new(vs: &nn::Path, config: &BertConfig) -> Self {
        let output = vs / "output";
        Self {
            self_attn: SelfAttention::new(&(vs / "self"), config),
            dense: Linear::new(&(&output / "dense"), config.hidden_size, config.hidden_size),
            layer_norm: LayerNorm::new(&(&output / "LayerNorm"), config),
            dropout: config.hidden_dropout_prob,
        }
    }

    pub fn forward_t(&self, x: &Tensor, mask_bias: &Tensor, train: bool) -> Tensor {
        let attn_out = self.self_attn.forward_t(x, mask_bias, train);
        let projected = attn_out.apply(&self.dense).dropout(self.dropout, train);
        self.layer_norm.forward(&(projected + x))
    }
}
