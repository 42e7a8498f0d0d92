use candle_core::{Device, Module, Tensor, D};
use candle_nn::{Linear, VarBuilder};

pub(crate) struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
}

impl LayerNorm {
    pub(crate) fn load(size: usize, eps: f64, vb: VarBuilder) -> candle_core::Result<Self> {
        let weight = vb.get(size, "weight")?;
        let bias = vb.get(size, "bias")?;
        Ok(Self { weight, bias, eps })
    }

    pub(crate) fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.weight.dim(0)? as f64;
        let mean = (x.sum_keepdim(D::Minus1)? / hidden)?;
        let centered = x.broadcast_sub(&mean)?;
        let var = (centered.sqr()?.sum_keepdim(D::Minus1)? / hidden)?;
        let normed = centered.broadcast_div(&(var + self.eps)?.sqrt()?)?;
        normed.broadcast_mul(&self.weight)?.broadcast_add(&self.bias)
    }
}

pub(crate) fn layer_norm(size: usize, eps: f64, vb: VarBuilder) -> candle_core::Result<LayerNorm> {
    LayerNorm::load(size, eps, vb)
}

/// Multi-head attention with a packed `in_proj_weight` of shape `(3 * d, d)`.
pub(crate) struct MultiHeadAttention {
    q: Linear,
    k: Linear,
    v: Linear,
    out: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl MultiHeadAttention {
    pub(crate) fn load(d_model: usize, num_heads: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let in_w = vb.get((3 * d_model, d_model), "in_proj_weight")?;
        let in_b = vb.get(3 * d_model, "in_proj_bias")?;
        let slice = |i: usize| -> candle_core::Result<Linear> {
            Ok(Linear::new(
                in_w.narrow(0, i * d_model, d_model)?,
                Some(in_b.narrow(0, i * d_model, d_model)?),
            ))
        };
        let head_dim = d_model / num_heads;
        Ok(Self {
            q: slice(0)?,
            k: slice(1)?,
            v: slice(2)?,
            out: candle_nn::linear(d_model, d_model, vb.pp("out_proj"))?,
            num_heads,
            head_dim,
            scale: (head_dim as f64).powf(-0.5),
        })
    }

    /// `query` is `(b, tq, d)`; `kv` is `(b, tk, d)`; `mask` broadcasts to `(tq, tk)`.
    pub(crate) fn forward(
        &self,
        query: &Tensor,
        kv: &Tensor,
        mask: Option<&Tensor>,
    ) -> candle_core::Result<Tensor> {
        let (b, tq, _) = query.dims3()?;
        let tk = kv.dim(1)?;
        let split = |x: Tensor, t: usize| {
            x.reshape((b, t, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };

        let q = split((self.q.forward(query)? * self.scale)?, tq)?;
        let k = split(self.k.forward(kv)?, tk)?;
        let v = split(self.v.forward(kv)?, tk)?;

        let mut scores = q.matmul(&k.transpose(2, 3)?.contiguous()?)?;
        if let Some(mask) = mask {
            scores = scores.broadcast_add(mask)?;
        }
        let attn = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let out = attn.matmul(&v)?.transpose(1, 2)?.contiguous()?.reshape((
            b,
            tq,
            self.num_heads * self.head_dim,
        ))?;
        self.out.forward(&out)
    }
}

pub(crate) struct FeedForward {
    linear1: Linear,
    linear2: Linear,
}

impl FeedForward {
    pub(crate) fn load(d_model: usize, dim_ff: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            linear1: candle_nn::linear(d_model, dim_ff, vb.pp("linear1"))?,
            linear2: candle_nn::linear(dim_ff, d_model, vb.pp("linear2"))?,
        })
    }

    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.linear2.forward(&self.linear1.forward(xs)?.relu()?)
    }
}

/// Scales by `sqrt(d_model)` and adds interleaved sin/cos position codes.
pub(crate) fn add_positional_encoding(xs: &Tensor) -> candle_core::Result<Tensor> {
    let (_, len, d_model) = xs.dims3()?;
    let table = sinusoidal_table(len, d_model, xs.device())?.to_dtype(xs.dtype())?;
    (xs * (d_model as f64).sqrt())?.broadcast_add(&table.unsqueeze(0)?)
}

fn sinusoidal_table(len: usize, d_model: usize, device: &Device) -> candle_core::Result<Tensor> {
    let mut data = vec![0f32; len * d_model];
    for pos in 0..len {
        for i in (0..d_model).step_by(2) {
            let angle = pos as f64 / 10_000f64.powf(i as f64 / d_model as f64);
            data[pos * d_model + i] = angle.sin() as f32;
            if i + 1 < d_model {
                data[pos * d_model + i + 1] = angle.cos() as f32;
            }
        }
    }
    Tensor::from_vec(data, (len, d_model), device)
}

/// Additive mask hiding future positions: 0 on and below the diagonal, -inf above.
pub(crate) fn causal_mask(len: usize, device: &Device) -> candle_core::Result<Tensor> {
    let data: Vec<f32> = (0..len)
        .flat_map(|i| (0..len).map(move |j| if j > i { f32::NEG_INFINITY } else { 0.0 }))
        .collect();
    Tensor::from_vec(data, (len, len), device)
}
