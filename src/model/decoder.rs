use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::config::ModelConfig;
use crate::model::layers::{layer_norm, FeedForward, LayerNorm, MultiHeadAttention};

struct DecoderLayer {
    self_attn: MultiHeadAttention,
    norm1: LayerNorm,
    cross_attn: MultiHeadAttention,
    norm2: LayerNorm,
    ff: FeedForward,
    norm3: LayerNorm,
}

impl DecoderLayer {
    fn load(cfg: &ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let eps = cfg.layer_norm_eps;
        Ok(Self {
            self_attn: MultiHeadAttention::load(cfg.d_model, cfg.nhead, vb.pp("self_attn"))?,
            norm1: layer_norm(cfg.d_model, eps, vb.pp("norm1"))?,
            cross_attn: MultiHeadAttention::load(
                cfg.d_model,
                cfg.nhead,
                vb.pp("multihead_attn"),
            )?,
            norm2: layer_norm(cfg.d_model, eps, vb.pp("norm2"))?,
            ff: FeedForward::load(cfg.d_model, cfg.dim_feedforward, vb.clone())?,
            norm3: layer_norm(cfg.d_model, eps, vb.pp("norm3"))?,
        })
    }

    fn forward(&self, xs: &Tensor, memory: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        let h = self
            .norm1
            .forward(&(xs + self.self_attn.forward(xs, xs, Some(mask))?)?)?;
        let h = self
            .norm2
            .forward(&(&h + self.cross_attn.forward(&h, memory, None)?)?)?;
        self.norm3.forward(&(&h + self.ff.forward(&h)?)?)
    }
}

pub(crate) struct Decoder {
    layers: Vec<DecoderLayer>,
    norm: LayerNorm,
}

impl Decoder {
    pub(crate) fn load(cfg: &ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut layers = Vec::with_capacity(cfg.num_decoder_layers);
        for i in 0..cfg.num_decoder_layers {
            layers.push(DecoderLayer::load(cfg, vb.pp(format!("layers.{i}")))?);
        }
        Ok(Self {
            layers,
            norm: layer_norm(cfg.d_model, cfg.layer_norm_eps, vb.pp("norm"))?,
        })
    }

    /// `tgt` is `(b, t, d_model)`; `mask` is the `(t, t)` causal mask.
    pub(crate) fn forward(
        &self,
        tgt: &Tensor,
        memory: &Tensor,
        mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let mut h = tgt.clone();
        for layer in &self.layers {
            h = layer.forward(&h, memory, mask)?;
        }
        self.norm.forward(&h)
    }
}
