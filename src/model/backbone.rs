use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, VarBuilder};

use crate::config::ModelConfig;

const BATCH_NORM_EPS: f64 = 1e-5;

struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
    pool: (usize, usize),
}

impl ConvBlock {
    fn load(
        in_c: usize,
        out_c: usize,
        pool: (usize, usize),
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv: candle_nn::conv2d(in_c, out_c, 3, cfg, vb.pp("conv"))?,
            bn: candle_nn::batch_norm(out_c, BATCH_NORM_EPS, vb.pp("bn"))?,
            pool,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        // Inference only: running statistics, no update.
        let xs = self.bn.forward_t(&xs, false)?.relu()?;
        if self.pool == (1, 1) {
            Ok(xs)
        } else {
            xs.avg_pool2d_with_stride(self.pool, self.pool)
        }
    }
}

/// Convolutional feature extractor turning a `(b, 3, h, w)` image into a
/// `(b, w' * h', d_model)` sequence, columns first.
pub(crate) struct Backbone {
    layers: Vec<ConvBlock>,
    last_conv_1x1: Conv2d,
}

impl Backbone {
    pub(crate) fn load(cfg: &ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut layers = Vec::with_capacity(cfg.cnn_channels.len());
        let mut in_c = 3;
        for (i, (&out_c, &pool)) in cfg.cnn_channels.iter().zip(&cfg.cnn_pool).enumerate() {
            layers.push(ConvBlock::load(in_c, out_c, pool, vb.pp(format!("layers.{i}")))?);
            in_c = out_c;
        }
        Ok(Self {
            layers,
            last_conv_1x1: candle_nn::conv2d(
                in_c,
                cfg.d_model,
                1,
                Conv2dConfig::default(),
                vb.pp("last_conv_1x1"),
            )?,
        })
    }

    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = xs.clone();
        for layer in &self.layers {
            h = layer.forward(&h)?;
        }
        let h = self.last_conv_1x1.forward(&h)?;
        // (b, c, h, w) -> (b, c, w, h) -> (b, c, w*h) -> (b, w*h, c)
        h.transpose(2, 3)?
            .flatten_from(2)?
            .transpose(1, 2)?
            .contiguous()
    }
}
