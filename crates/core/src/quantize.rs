//! Embedding Quantizer
//!
//! Symmetric scalar quantization of f32 embeddings to int8 plus one scale
//! factor per vector (4x smaller on disk). Stateless; the main crate's store applies
//! it when `quantize_embeddings` is enabled.

use crate::error::{CoreError, CoreResult};

/// Largest magnitude an element is mapped to.
const QUANT_MAX: f32 = 127.0;

/// Quantize `vector` to int8.
///
/// Returns the quantized values and the scale (`127 / max_abs`) needed to
/// reverse it. An all-zero vector maps to zeros with scale 1.
pub fn quantize(vector: &[f32]) -> CoreResult<(Vec<i8>, f32)> {
    if vector.is_empty() {
        return Err(CoreError::validation("cannot quantize an empty embedding"));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::validation(
            "cannot quantize an embedding with non-finite values",
        ));
    }

    let max_abs = vector.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if max_abs == 0.0 {
        return Ok((vec![0; vector.len()], 1.0));
    }

    let scale = QUANT_MAX / max_abs;
    let quantized = vector
        .iter()
        .map(|v| (v * scale).clamp(-QUANT_MAX, QUANT_MAX) as i8)
        .collect();
    Ok((quantized, scale))
}

/// Reverse [`quantize`].
pub fn dequantize(quantized: &[i8], scale: f32) -> Vec<f32> {
    let scale = if scale == 0.0 || !scale.is_finite() {
        1.0
    } else {
        scale
    };
    quantized.iter().map(|&q| q as f32 / scale).collect()
}

/// Reinterpret int8 values as raw bytes for BLOB storage.
pub fn quantized_to_bytes(quantized: &[i8]) -> Vec<u8> {
    quantized.iter().map(|&q| q as u8).collect()
}

/// Reinterpret a BLOB back into int8 values.
pub fn bytes_to_quantized(bytes: &[u8]) -> Vec<i8> {
    bytes.iter().map(|&b| b as i8).collect()
}
