use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::config::ModelConfig;
use crate::model::layers::{layer_norm, FeedForward, LayerNorm, MultiHeadAttention};

struct EncoderLayer {
    self_attn: MultiHeadAttention,
    norm1: LayerNorm,
    ff: FeedForward,
    norm2: LayerNorm,
}

impl EncoderLayer {
    fn load(cfg: &ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            self_attn: MultiHeadAttention::load(cfg.d_model, cfg.nhead, vb.pp("self_attn"))?,
            norm1: layer_norm(cfg.d_model, cfg.layer_norm_eps, vb.pp("norm1"))?,
            ff: FeedForward::load(cfg.d_model, cfg.dim_feedforward, vb.clone())?,
            norm2: layer_norm(cfg.d_model, cfg.layer_norm_eps, vb.pp("norm2"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        // Post-norm:
        //   h = norm1(x + attn(x))
        //   y = norm2(h + ff(h))
        let h = self.norm1.forward(&(xs + self.self_attn.forward(xs, xs, None)?)?)?;
        self.norm2.forward(&(&h + self.ff.forward(&h)?)?)
    }
}

pub(crate) struct Encoder {
    layers: Vec<EncoderLayer>,
    norm: LayerNorm,
}

impl Encoder {
    pub(crate) fn load(cfg: &ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut layers = Vec::with_capacity(cfg.num_encoder_layers);
        for i in 0..cfg.num_encoder_layers {
            layers.push(EncoderLayer::load(cfg, vb.pp(format!("layers.{i}")))?);
        }
        Ok(Self {
            layers,
            norm: layer_norm(cfg.d_model, cfg.layer_norm_eps, vb.pp("norm"))?,
        })
    }

    /// `xs` is `(b, t, d_model)` with positions already encoded.
    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = xs.clone();
        for layer in &self.layers {
            h = layer.forward(&h)?;
        }
        self.norm.forward(&h)
    }
}
