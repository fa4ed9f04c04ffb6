//! Byte-pair tokenizer wrapper.
//!
//! Loads a `tokenizer.json` vocabulary and produces the i64 id/mask pairs
//! the ONNX text encoders expect. Encoding happens once per generation; the
//! encoder output is reused for every decoder/denoiser call.

use std::path::Path;

use crate::errors::{ModelError, ResultExt};

/// Token ids plus attention mask for one prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEncoding {
    /// Token ids, widened to the i64 the ONNX graphs take.
    pub ids: Vec<i64>,
    /// Attention mask (1 = real token, 0 = padding).
    pub attention_mask: Vec<i64>,
}

impl TextEncoding {
    /// Number of token positions.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the encoding is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A loaded byte-pair tokenizer.
pub struct TextTokenizer {
    inner: tokenizers::Tokenizer,
}

impl TextTokenizer {
    /// Load from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .tokenizer_ctx(&format!("load {}", path.display()))?;
        Ok(Self { inner })
    }

    /// Encode a prompt with special tokens (EOS) appended.
    pub fn encode(&self, text: &str) -> Result<TextEncoding, ModelError> {
        let encoding = self.inner.encode(text, true).tokenizer_ctx("encode")?;
        let ids = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let attention_mask = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect();
        Ok(TextEncoding { ids, attention_mask })
    }

    /// Decode ids back to text (diagnostics and tests).
    pub fn decode(&self, ids: &[u32]) -> Result<String, ModelError> {
        self.inner.decode(ids, true).tokenizer_ctx("decode")
    }
}
