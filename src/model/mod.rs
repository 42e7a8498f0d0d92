mod backbone;
pub(crate) mod checkpoint;
mod decoder;
mod encoder;
mod layers;
pub(crate) mod seq2seq;
