use candle_core::{Device, Module, Tensor, D};
use candle_nn::{Embedding, Linear, VarBuilder};

use crate::config::ModelConfig;
use crate::model::backbone::Backbone;
use crate::model::decoder::Decoder;
use crate::model::encoder::Encoder;
use crate::model::layers::{add_positional_encoding, causal_mask};

/// CNN backbone followed by a transformer encoder-decoder over characters.
pub(crate) struct OcrTransformer {
    cnn: Backbone,
    encoder: Encoder,
    decoder: Decoder,
    embed_tgt: Embedding,
    fc: Linear,
}

impl OcrTransformer {
    pub(crate) fn load(
        cfg: &ModelConfig,
        vocab_size: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let t = vb.pp("transformer");
        Ok(Self {
            cnn: Backbone::load(cfg, vb.pp("cnn"))?,
            encoder: Encoder::load(cfg, t.pp("encoder"))?,
            decoder: Decoder::load(cfg, t.pp("decoder"))?,
            embed_tgt: candle_nn::embedding(vocab_size, cfg.d_model, t.pp("embed_tgt"))?,
            fc: candle_nn::linear(cfg.d_model, vocab_size, t.pp("fc"))?,
        })
    }

    /// `(b, 3, h, w)` image to `(b, s, d_model)` encoder memory.
    pub(crate) fn encode(&self, image: &Tensor) -> candle_core::Result<Tensor> {
        let src = self.cnn.forward(image)?;
        self.encoder.forward(&add_positional_encoding(&src)?)
    }

    /// Softmax over the vocabulary for the position after `prefix`.
    pub(crate) fn next_token_probs(
        &self,
        memory: &Tensor,
        prefix: &[u32],
        device: &Device,
    ) -> candle_core::Result<Vec<f32>> {
        let len = prefix.len();
        if len == 0 {
            candle_core::bail!("decoder prefix must contain the start token");
        }
        let ids = Tensor::new(prefix, device)?.unsqueeze(0)?;
        let tgt = add_positional_encoding(&self.embed_tgt.forward(&ids)?)?;
        let mask = causal_mask(len, device)?;
        let h = self.decoder.forward(&tgt, memory, &mask)?;
        let last = h.narrow(1, len - 1, 1)?;
        let probs = candle_nn::ops::softmax(&self.fc.forward(&last)?, D::Minus1)?;
        probs.flatten_all()?.to_vec1::<f32>()
    }
}
