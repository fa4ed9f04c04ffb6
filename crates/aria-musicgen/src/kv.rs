//! KV-cache threading between decoder steps.
//!
//! The first decode step runs the full decoder graph, which emits present
//! self-attention *and* cross-attention tensors for every layer. Subsequent
//! steps run the with-past graph: it consumes all four tensors per layer and
//! re-emits only the self-attention pair (cross-attention keys/values are a
//! function of the encoder output and never change).
//!
//! Cache lifetime is one generation: allocated at step 0, threaded step to
//! step, dropped on completion.

use aria_core::errors::EngineError;
use aria_models::tensor::TensorBuf;

/// Per-layer attention caches for the whole decoder stack.
#[derive(Debug)]
pub struct KvCache {
    /// `(self_key, self_value)` per layer, grown every step.
    pub decoder: Vec<(TensorBuf, TensorBuf)>,
    /// `(cross_key, cross_value)` per layer, fixed after step 0.
    pub encoder: Vec<(TensorBuf, TensorBuf)>,
}

impl KvCache {
    /// Capture all caches from the first-step outputs.
    pub fn from_first_step(
        outputs: &ort::session::SessionOutputs,
        num_layers: usize,
    ) -> Result<Self, EngineError> {
        let mut decoder = Vec::with_capacity(num_layers);
        let mut encoder = Vec::with_capacity(num_layers);
        for layer in 0..num_layers {
            decoder.push((
                TensorBuf::extract(outputs, &format!("present.{layer}.decoder.key"))?,
                TensorBuf::extract(outputs, &format!("present.{layer}.decoder.value"))?,
            ));
            encoder.push((
                TensorBuf::extract(outputs, &format!("present.{layer}.encoder.key"))?,
                TensorBuf::extract(outputs, &format!("present.{layer}.encoder.value"))?,
            ));
        }
        Ok(Self { decoder, encoder })
    }

    /// Replace the self-attention pairs from a with-past step's outputs.
    pub fn update_decoder(
        &mut self,
        outputs: &ort::session::SessionOutputs,
    ) -> Result<(), EngineError> {
        for layer in 0..self.decoder.len() {
            self.decoder[layer] = (
                TensorBuf::extract(outputs, &format!("present.{layer}.decoder.key"))?,
                TensorBuf::extract(outputs, &format!("present.{layer}.decoder.value"))?,
            );
        }
        Ok(())
    }

    /// Input names and tensors for the with-past graph, in layer order.
    pub fn past_inputs(&self) -> Vec<(String, TensorBuf)> {
        let mut inputs = Vec::with_capacity(self.decoder.len() * 4);
        for (layer, ((dec_k, dec_v), (enc_k, enc_v))) in
            self.decoder.iter().zip(&self.encoder).enumerate()
        {
            inputs.push((format!("past_key_values.{layer}.decoder.key"), dec_k.clone()));
            inputs.push((format!("past_key_values.{layer}.decoder.value"), dec_v.clone()));
            inputs.push((format!("past_key_values.{layer}.encoder.key"), enc_k.clone()));
            inputs.push((format!("past_key_values.{layer}.encoder.value"), enc_v.clone()));
        }
        inputs
    }
}
