//! ONNX Runtime classifier backend
//!
//! The session is owned exclusively by the classifier and released when it is
//! dropped.

use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

use super::{ClassifierBackend, ModelOutput, OutputValues, FEATURE_COUNT};
use crate::error::{ScoringError, ScoringResult};

/// Driving-style classifier running on ONNX Runtime
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .finish()
    }
}

impl OnnxClassifier {
    /// Load a model from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ScoringResult<Self> {
        let path = path.as_ref();
        info!(?path, "Loading ONNX model");
        let bytes = std::fs::read(path).map_err(|e| {
            ScoringError::model_load(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Load a model from in-memory bytes
    pub fn from_bytes(bytes: &[u8]) -> ScoringResult<Self> {
        if bytes.is_empty() {
            return Err(ScoringError::model_load("model byte stream is empty"));
        }

        let session = Session::builder()
            .map_err(|e| ScoringError::model_load(format!("Failed to create session builder: {}", e)))?
            .commit_from_memory(bytes)
            .map_err(|e| ScoringError::model_load(format!("Failed to load model from bytes: {}", e)))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|input| input.name().to_string())
            .collect();

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect();

        let input_name = input_names
            .first()
            .cloned()
            .ok_or_else(|| ScoringError::model_load("model declares no inputs"))?;

        // Classifier exports usually carry a label output next to the
        // probability output; prefer the latter.
        let output_name = output_names
            .iter()
            .find(|name| name.to_ascii_lowercase().contains("prob"))
            .or_else(|| output_names.first())
            .cloned()
            .ok_or_else(|| ScoringError::model_load("model declares no outputs"))?;

        info!(
            inputs = ?input_names,
            outputs = ?output_names,
            selected_output = %output_name,
            "ONNX model loaded successfully"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

impl ClassifierBackend for OnnxClassifier {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn run(&mut self, features: &[f32; FEATURE_COUNT]) -> ScoringResult<ModelOutput> {
        let input = Tensor::from_array(([1usize, FEATURE_COUNT], features.to_vec()))
            .map_err(|e| ScoringError::inference(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| ScoringError::inference(format!("Inference failed: {}", e)))?;

        let value = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ScoringError::model_output(format!("missing output '{}'", self.output_name))
        })?;

        if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
            return Ok(shaped(shape, data, OutputValues::F32));
        }
        if let Ok((shape, data)) = value.try_extract_tensor::<f64>() {
            return Ok(shaped(shape, data, OutputValues::F64));
        }
        if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
            return Ok(shaped(shape, data, OutputValues::I64));
        }

        Ok(ModelOutput::Unsupported(format!(
            "output '{}' is not an f32, f64 or i64 tensor",
            self.output_name
        )))
    }
}

impl Drop for OnnxClassifier {
    fn drop(&mut self) {
        debug!("Releasing ONNX session");
    }
}

/// Split tensor data into rows when the tensor has more than one dimension
fn shaped<T: Copy>(dims: &[i64], data: &[T], wrap: fn(Vec<T>) -> OutputValues) -> ModelOutput {
    if dims.len() < 2 {
        return ModelOutput::Flat(wrap(data.to_vec()));
    }

    let row_len = dims.last().copied().unwrap_or(0);
    if row_len <= 0 {
        return ModelOutput::Unsupported(format!("tensor with shape {:?}", dims));
    }

    ModelOutput::Nested(
        data.chunks(row_len as usize)
            .map(|row| wrap(row.to_vec()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rank_one_output_is_flat() {
        assert_eq!(
            shaped(&[3], &[0.7f32, 0.2, 0.1], OutputValues::F32),
            ModelOutput::Flat(OutputValues::F32(vec![0.7, 0.2, 0.1]))
        );
    }

    #[test]
    fn test_batched_output_splits_rows() {
        assert_eq!(
            shaped(&[1, 3], &[0.7f32, 0.2, 0.1], OutputValues::F32),
            ModelOutput::Nested(vec![OutputValues::F32(vec![0.7, 0.2, 0.1])])
        );
        assert_eq!(
            shaped(&[2, 3], &[1i64, 0, 0, 0, 1, 0], OutputValues::I64),
            ModelOutput::Nested(vec![
                OutputValues::I64(vec![1, 0, 0]),
                OutputValues::I64(vec![0, 1, 0]),
            ])
        );
    }

    #[test]
    fn test_empty_last_dimension_is_unsupported() {
        let empty: &[f64] = &[];
        assert!(matches!(
            shaped(&[1, 0], empty, OutputValues::F64),
            ModelOutput::Unsupported(_)
        ));
    }
}
