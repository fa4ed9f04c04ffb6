//! Host-tensor plumbing between the engines and `ort`.
//!
//! Engines keep activations as flat `Vec<f32>` with explicit shapes and
//! convert at the session boundary, which keeps KV-cache threading and CFG
//! arithmetic allocation-predictable.

use std::borrow::Cow;

use aria_core::errors::{EngineError, ErrorKind};

/// An owned host tensor in the (shape, data) layout `ort` accepts directly.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorBuf {
    /// Dimensions.
    pub shape: Vec<i64>,
    /// Row-major f32 data.
    pub data: Vec<f32>,
}

impl TensorBuf {
    /// Copy a named tensor out of session outputs.
    pub fn extract(outputs: &ort::session::SessionOutputs, name: &str) -> Result<Self, EngineError> {
        let value = outputs.get(name).ok_or_else(|| {
            EngineError::failed(ErrorKind::ModelInferenceFailed, format!("missing output '{name}'"))
        })?;
        let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
            EngineError::failed(ErrorKind::ModelInferenceFailed, format!("extract '{name}': {e}"))
        })?;
        Ok(Self {
            shape: shape.iter().copied().collect(),
            data: data.to_vec(),
        })
    }

    /// Copy the first output tensor (single-output graphs).
    pub fn extract_first(outputs: &ort::session::SessionOutputs) -> Result<Self, EngineError> {
        let value = &outputs[0];
        let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
            EngineError::failed(ErrorKind::ModelInferenceFailed, format!("extract output 0: {e}"))
        })?;
        Ok(Self {
            shape: shape.iter().copied().collect(),
            data: data.to_vec(),
        })
    }

    /// Total element count implied by the shape.
    pub fn element_count(&self) -> usize {
        self.shape.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Wrap a foreign error as a `MODEL_INFERENCE_FAILED` engine error.
pub fn infer_err(context: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::failed(ErrorKind::ModelInferenceFailed, format!("{context}: {e}"))
}

/// Named input list in the shape `Session::run` accepts.
pub type NamedInputs<'a> = Vec<(Cow<'a, str>, ort::session::SessionInputValue<'a>)>;

/// Append an f32 tensor input.
pub fn push_f32<'a>(
    inputs: &mut NamedInputs<'a>,
    name: impl Into<Cow<'a, str>>,
    shape: Vec<i64>,
    data: Vec<f32>,
) -> Result<(), EngineError> {
    let name = name.into();
    let tensor =
        ort::value::Tensor::from_array((shape, data)).map_err(|e| infer_err(name.as_ref(), e))?;
    inputs.push((name, tensor.into()));
    Ok(())
}

/// Append an i64 tensor input.
pub fn push_i64<'a>(
    inputs: &mut NamedInputs<'a>,
    name: impl Into<Cow<'a, str>>,
    shape: Vec<i64>,
    data: Vec<i64>,
) -> Result<(), EngineError> {
    let name = name.into();
    let tensor =
        ort::value::Tensor::from_array((shape, data)).map_err(|e| infer_err(name.as_ref(), e))?;
    inputs.push((name, tensor.into()));
    Ok(())
}
