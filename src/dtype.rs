// SPDX-License-Identifier: MIT

//! Scalar type tags and explicit dtype conversions.
//!
//! ## Design Decisions
//!
//! - **Tagged element types**: every array is instantiated for exactly one
//!   [`ElemType`]. The tag travels with buffer descriptors so type identity
//!   can be checked once at the API boundary, before any memory is touched.
//!
//! - **No implicit conversions**: every mapping between the library dtype,
//!   the tag, and a foreign framework's dtype name is a named function.
//!   Silent coercion during a copy would defeat the bit-for-bit round-trip
//!   guarantee of the bridge.
//!
//! - **Upstream-bounded scalar set**: the supported scalars are exactly
//!   those the array library computes with. Frameworks with a narrower set
//!   (PyTorch has no `uint32`) surface as a fatal [`UnsupportedDType`]
//!   configuration error, never as a lossy fallback.
//!
//! [`UnsupportedDType`]: crate::error::BridgeError::UnsupportedDType

use crate::error::{BridgeError, Result};
use candle_core::DType;

/// Scalar element type of a GPU array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    /// 16-bit IEEE float.
    F16,
    /// 16-bit brain float.
    BF16,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Unsigned 8-bit integer (also the mask representation).
    U8,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
}

impl ElemType {
    /// Size of one element in bytes.
    #[must_use]
    pub fn size_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::F16 | Self::BF16 => 2,
            Self::F32 | Self::U32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    /// Short lowercase name, used in error messages and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::I64 => "i64",
        }
    }

    /// Whether this is a floating-point tag (the only tags that admit
    /// gradient tracking and transcendental functions).
    #[must_use]
    pub fn is_floating_point(self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    /// The array library's dtype for this tag.
    #[must_use]
    pub fn to_candle(self) -> DType {
        match self {
            Self::F16 => DType::F16,
            Self::BF16 => DType::BF16,
            Self::F32 => DType::F32,
            Self::F64 => DType::F64,
            Self::U8 => DType::U8,
            Self::U32 => DType::U32,
            Self::I64 => DType::I64,
        }
    }

    /// Tag for an array-library dtype.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedDType`] for dtypes outside the
    /// bound scalar set (quantized and sub-byte float formats).
    pub fn from_candle(dtype: DType) -> Result<Self> {
        match dtype {
            DType::F16 => Ok(Self::F16),
            DType::BF16 => Ok(Self::BF16),
            DType::F32 => Ok(Self::F32),
            DType::F64 => Ok(Self::F64),
            DType::U8 => Ok(Self::U8),
            DType::U32 => Ok(Self::U32),
            DType::I64 => Ok(Self::I64),
            other => Err(BridgeError::unsupported(format!(
                "array dtype {other:?} has no element tag"
            ))),
        }
    }

    /// The PyTorch dtype name for this tag (`torch.float32` is reached as
    /// `getattr(torch, "float32")`).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedDType`] when PyTorch has no exact
    /// equivalent (`U32`). This is a configuration error: a conversion for
    /// that instantiation can never succeed, so it fails fast rather than
    /// widening or narrowing the element type.
    pub fn torch_name(self) -> Result<&'static str> {
        match self {
            Self::F16 => Ok("float16"),
            Self::BF16 => Ok("bfloat16"),
            Self::F32 => Ok("float32"),
            Self::F64 => Ok("float64"),
            Self::U8 => Ok("uint8"),
            Self::I64 => Ok("int64"),
            Self::U32 => Err(BridgeError::unsupported(
                "u32 arrays have no PyTorch dtype; convert via numpy instead",
            )),
        }
    }

    /// Parse a PyTorch dtype name (`"torch.float32"` or `"float32"`).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ForeignTensorRejected`] for unknown names.
    pub fn from_torch_name(name: &str) -> Result<Self> {
        match name.strip_prefix("torch.").unwrap_or(name) {
            "float16" | "half" => Ok(Self::F16),
            "bfloat16" => Ok(Self::BF16),
            "float32" | "float" => Ok(Self::F32),
            "float64" | "double" => Ok(Self::F64),
            "uint8" => Ok(Self::U8),
            "int64" | "long" => Ok(Self::I64),
            other => Err(BridgeError::rejected(format!(
                "unrecognized torch dtype: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ElemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for half::f16 {}
    impl Sealed for half::bf16 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for u8 {}
    impl Sealed for u32 {}
    impl Sealed for i64 {}
}

/// Rust scalars that can be array elements.
///
/// Sealed: the set is fixed by what the array library computes with.
pub trait Element: sealed::Sealed + candle_core::WithDType + Copy + 'static {
    /// The tag for this scalar.
    const ELEM: ElemType;
}

impl Element for half::f16 {
    const ELEM: ElemType = ElemType::F16;
}
impl Element for half::bf16 {
    const ELEM: ElemType = ElemType::BF16;
}
impl Element for f32 {
    const ELEM: ElemType = ElemType::F32;
}
impl Element for f64 {
    const ELEM: ElemType = ElemType::F64;
}
impl Element for u8 {
    const ELEM: ElemType = ElemType::U8;
}
impl Element for u32 {
    const ELEM: ElemType = ElemType::U32;
}
impl Element for i64 {
    const ELEM: ElemType = ElemType::I64;
}
