use tch::{nn, Tensor};
use crate::config::BertConfig;

/// Optimizer group for matrices that receive weight decay.
pub const DECAY_GROUP: usize = 0;
/// Optimizer group for biases and LayerNorm parameters.
pub const NO_DECAY_GROUP: usize = 1;

/// Normal(0, 0.02), the BERT initializer for weight matrices.
pub fn bert_init() -> nn::Init {
    nn::Init::Randn { mean: 0.0, stdev: 0.02 }
}

/// Dense layer whose bias lives in the no-decay optimizer group.
#[derive(Debug)]
pub struct Linear {
    pub ws: Tensor,
    pub bs: Tensor,
}

impl Linear {
    pub fn new(vs: &nn::Path, in_dim: i64, out_dim: i64) -> Self {
        let ws = vs
            .set_group(DECAY_GROUP)
            .var("weight", &[out_dim, in_dim], bert_init());
        let bs = vs
            .set_group(NO_DECAY_GROUP)
            .var("bias", &[out_dim], nn::Init::Const(0.0));
        Self { ws, bs }
    }
}

impl nn::Module for Linear {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.linear(&self.ws, Some(&self.bs))
    }
}

#[derive(Debug)]
pub struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    hidden_size: i64,
    eps: f64,
}

impl LayerNorm {
    pub fn new(vs: &nn::Path, config: &BertConfig) -> Self {
        let vs = vs.set_group(NO_DECAY_GROUP);
        let weight = vs.var("weight", &[config.hidden_size], nn::Init::Const(1.0));
        let bias = vs.var("bias", &[config.hidden_size], nn::Init::Const(0.0));
        Self {
            weight,
            bias,
            hidden_size: config.hidden_size,
            eps: config.layer_norm_eps,
        }
    }
}

impl nn::Module for LayerNorm {
    /// x: [batch, seq_len, hidden]
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.layer_norm(
            &[self.hidden_size],
            Some(&self.weight),
            Some(&self.bias),
            self.eps,
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::Module, Device, Kind};

    fn tiny_config() -> BertConfig {
        BertConfig {
            hidden_size: 8,
            num_attention_heads: 2,
            ..BertConfig::default()
        }
    }

    #[test]
    fn bias_and_norm_params_land_in_no_decay_group() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let _dense = Linear::new(&(&root / "dense"), 8, 4);
        let _norm = LayerNorm::new(&(&root / "LayerNorm"), &tiny_config());

        let variables = vs.variables();
        assert_eq!(variables["dense.weight"].size(), vec![4, 8]);
        assert_eq!(variables["dense.bias"].size(), vec![4]);
        assert!(variables.contains_key("LayerNorm.weight"));
        assert!(variables.contains_key("LayerNorm.bias"));
    }

    #[test]
    fn layer_norm_normalizes_last_dim() {
        let vs = nn::VarStore::new(Device::Cpu);
        let norm = LayerNorm::new(&vs.root(), &tiny_config());
        let xs = Tensor::randn(&[2, 3, 8], (Kind::Float, Device::Cpu)) * 5.0 + 3.0;
        let ys = norm.forward(&xs);
        let mean = ys.mean_dim(Some(&[-1i64][..]), false, Kind::Float);
        assert!(mean.abs().max().double_value(&[]) < 1e-4);
    }
}
