// SPDX-License-Identifier: MIT

//! Unified error types for the array binding and the strided tensor bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BridgeError
//! ├── IndexOutOfRange       - Element access past the end of an array
//! ├── RankMismatch          - Foreign buffer dimensionality != array depth
//! ├── DTypeMismatch         - Foreign element type != array scalar type
//! ├── ShapeMismatch         - Extent disagreement between array and descriptor
//! ├── ForeignTensorRejected - Object is not a tensor / descriptor incomplete
//! ├── UnsupportedDType      - Scalar type has no external dtype (config error)
//! ├── DeviceNotAvailable    - Requested device unavailable
//! └── Candle                - Underlying array-library errors
//! ```
//!
//! All operations are single-shot: there are no retries and no
//! partial-success states. A conversion either fully populates its target or
//! reports one of these errors before any output is exposed.

use thiserror::Error;

/// Result type alias for gpu-array-bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the binding layer and the strided tensor bridge.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    /// Element index past the end of an array.
    ///
    /// Raised on element access instead of reading adjacent memory.
    #[error("index out of range: {index} >= {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Array length.
        len: usize,
    },

    /// Foreign buffer dimensionality does not equal the array depth.
    ///
    /// Checked before any memory is read; there is no partial copy.
    #[error("rank mismatch: expected {expected} dimensions, got {actual}")]
    RankMismatch {
        /// Array depth.
        expected: usize,
        /// Foreign buffer rank.
        actual: usize,
    },

    /// Foreign element type does not equal the array scalar type.
    ///
    /// No implicit numeric conversion is ever attempted.
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        /// Array scalar type name.
        expected: String,
        /// Foreign dtype name.
        actual: String,
    },

    /// Extent disagreement between an array and a buffer descriptor.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected extents.
        expected: Vec<usize>,
        /// Actual extents.
        actual: Vec<usize>,
    },

    /// The foreign object is not a tensor, or its descriptor could not be
    /// extracted (missing shape/stride/dtype/pointer accessors).
    #[error("foreign tensor rejected: {0}")]
    ForeignTensorRejected(String),

    /// The array's scalar type has no corresponding external dtype.
    ///
    /// This is a configuration error, not a data error: the conversion can
    /// never succeed for this instantiation.
    #[error("unsupported scalar type: {0}")]
    UnsupportedDType(String),

    /// Requested device not available.
    #[error("device not available: {device}")]
    DeviceNotAvailable {
        /// Description of the unavailable device.
        device: String,
    },

    /// Underlying array-library error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl BridgeError {
    /// Create an index-out-of-range error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    /// Create a rank mismatch error.
    pub fn rank_mismatch(expected: usize, actual: usize) -> Self {
        Self::RankMismatch { expected, actual }
    }

    /// Create a dtype mismatch error.
    pub fn dtype_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DTypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: impl Into<Vec<usize>>, actual: impl Into<Vec<usize>>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a foreign-tensor rejection error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::ForeignTensorRejected(msg.into())
    }

    /// Create an unsupported-dtype error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedDType(msg.into())
    }

    /// Create a device-not-available error.
    pub fn device_not_available(device: impl Into<String>) -> Self {
        Self::DeviceNotAvailable {
            device: device.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::index_out_of_range(7, 4);
        assert_eq!(err.to_string(), "index out of range: 7 >= 4");

        let err = BridgeError::rank_mismatch(2, 3);
        assert!(err.to_string().contains("expected 2 dimensions"));

        let err = BridgeError::dtype_mismatch("f32", "f64");
        assert_eq!(err.to_string(), "dtype mismatch: expected f32, got f64");

        let err = BridgeError::rejected("object is not a torch.Tensor");
        assert!(err.to_string().contains("foreign tensor rejected"));
    }

    #[test]
    fn test_shape_mismatch_reports_both_sides() {
        let err = BridgeError::shape_mismatch(vec![2, 3], vec![3, 2]);
        let msg = err.to_string();
        assert!(msg.contains("[2, 3]"));
        assert!(msg.contains("[3, 2]"));
    }
}
