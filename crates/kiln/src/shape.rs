//! Tensor shapes: element type, dimensions, and strides.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scalar element types supported by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float32,
    Double64,
    Half16,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

impl DType {
    /// Storage size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Int8 | DType::Uint8 => 1,
            DType::Half16 | DType::Int16 | DType::Uint16 => 2,
            DType::Float32 | DType::Int32 | DType::Uint32 => 4,
            DType::Double64 | DType::Int64 | DType::Uint64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Double64 | DType::Half16)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    fn short_name(self) -> &'static str {
        match self {
            DType::Float32 => "f32",
            DType::Double64 => "f64",
            DType::Half16 => "f16",
            DType::Int8 => "i8",
            DType::Int16 => "i16",
            DType::Int32 => "i32",
            DType::Int64 => "i64",
            DType::Uint8 => "u8",
            DType::Uint16 => "u16",
            DType::Uint32 => "u32",
            DType::Uint64 => "u64",
        }
    }
}

/// An element type plus per-axis lengths and strides.
///
/// Strides are in elements, not bytes. A rank-0 shape (no axes) is permitted
/// and describes no data; zero-length axes are permitted and describe empty
/// buffers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dtype: DType,
    lens: Vec<usize>,
    strides: Vec<usize>,
}

impl Shape {
    /// Builds a standard (row-major, packed) shape from the given lengths.
    pub fn new<L: Into<Vec<usize>>>(dtype: DType, lens: L) -> Self {
        let lens = lens.into();
        let strides = row_major_strides(&lens);
        Shape {
            dtype,
            lens,
            strides,
        }
    }

    /// Builds a shape with explicit strides.
    ///
    /// Panics if `lens` and `strides` differ in length; that is a programmer
    /// error, not a recoverable condition.
    pub fn with_strides<L, S>(dtype: DType, lens: L, strides: S) -> Self
    where
        L: Into<Vec<usize>>,
        S: Into<Vec<usize>>,
    {
        let lens = lens.into();
        let strides = strides.into();
        assert_eq!(
            lens.len(),
            strides.len(),
            "shape lens and strides must have the same rank"
        );
        Shape {
            dtype,
            lens,
            strides,
        }
    }

    /// A rank-0 shape describing no data.
    pub fn none(dtype: DType) -> Self {
        Shape::new(dtype, Vec::new())
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn lens(&self) -> &[usize] {
        &self.lens
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.lens.len()
    }

    /// Number of logical elements.
    pub fn elements(&self) -> usize {
        if self.lens.is_empty() {
            return 0;
        }
        self.lens.iter().product()
    }

    /// Number of addressable element slots, respecting strides.
    pub fn element_space(&self) -> usize {
        if self.elements() == 0 {
            return 0;
        }
        self.lens
            .iter()
            .zip(&self.strides)
            .map(|(&len, &stride)| (len - 1) * stride)
            .sum::<usize>()
            + 1
    }

    /// Storage footprint in bytes, respecting strides for non-packed forms.
    pub fn bytes(&self) -> usize {
        self.element_space() * self.dtype.size_in_bytes()
    }

    /// True when strides are the row-major products of the trailing lens.
    pub fn standard(&self) -> bool {
        self.strides == row_major_strides(&self.lens)
    }

    /// True when the element count equals the addressable space (no padding).
    pub fn packed(&self) -> bool {
        self.elements() == self.element_space()
    }

    /// True when some axis has stride zero.
    pub fn broadcasted(&self) -> bool {
        self.strides.iter().any(|&s| s == 0)
    }

    /// True when strides are not monotonically non-increasing.
    pub fn transposed(&self) -> bool {
        self.strides.windows(2).any(|w| w[0] < w[1])
    }

    /// True when every axis has length one.
    pub fn scalar(&self) -> bool {
        !self.lens.is_empty() && self.lens.iter().all(|&len| len == 1)
    }

    /// Element offset of a multi-dimensional index.
    pub fn index_of(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.rank());
        index
            .iter()
            .zip(&self.strides)
            .map(|(&i, &stride)| i * stride)
            .sum()
    }

    /// Converts a linear (row-major) position into a multi-dimensional index.
    pub fn multi_index(&self, mut position: usize) -> Vec<usize> {
        let mut index = vec![0; self.rank()];
        for axis in (0..self.rank()).rev() {
            let len = self.lens[axis].max(1);
            index[axis] = position % len;
            position /= len;
        }
        index
    }

    /// The standard shape with the same dtype and lens.
    pub fn as_standard(&self) -> Shape {
        Shape::new(self.dtype, self.lens.clone())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype.short_name())?;
        for (i, len) in self.lens.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{len}")?;
        }
        write!(f, "]")?;
        if !self.standard() {
            write!(f, "{{")?;
            for (i, stride) in self.strides.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{stride}")?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}

fn row_major_strides(lens: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; lens.len()];
    for axis in (0..lens.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * lens[axis + 1];
    }
    strides
}

/// Guard for operator shape inference, producing `Error::InvalidShape` with
/// the operator name attached.
pub struct ShapeCheck<'a> {
    op: &'a str,
    inputs: &'a [Shape],
}

impl<'a> ShapeCheck<'a> {
    pub fn new(op: &'a str, inputs: &'a [Shape]) -> Self {
        ShapeCheck { op, inputs }
    }

    pub fn has(self, arity: usize) -> Result<Self> {
        if self.inputs.len() != arity {
            return Err(Error::invalid_shape(
                self.op,
                format!("expected {arity} inputs, got {}", self.inputs.len()),
            ));
        }
        Ok(self)
    }

    pub fn at_least(self, arity: usize) -> Result<Self> {
        if self.inputs.len() < arity {
            return Err(Error::invalid_shape(
                self.op,
                format!("expected at least {arity} inputs, got {}", self.inputs.len()),
            ));
        }
        Ok(self)
    }

    pub fn same_dtype(self) -> Result<Self> {
        if let Some(first) = self.inputs.first() {
            if self.inputs.iter().any(|s| s.dtype() != first.dtype()) {
                return Err(Error::invalid_shape(self.op, "inputs must share a dtype"));
            }
        }
        Ok(self)
    }

    pub fn same_shape(self) -> Result<Self> {
        if let Some(first) = self.inputs.first() {
            if self.inputs.iter().any(|s| s != first) {
                return Err(Error::invalid_shape(self.op, "inputs must share a shape"));
            }
        }
        Ok(self)
    }

    pub fn standard(self) -> Result<Self> {
        if self.inputs.iter().any(|s| !s.standard()) {
            return Err(Error::invalid_shape(self.op, "inputs must be standard"));
        }
        Ok(self)
    }

    pub fn packed(self) -> Result<Self> {
        if self.inputs.iter().any(|s| !s.packed()) {
            return Err(Error::invalid_shape(self.op, "inputs must be packed"));
        }
        Ok(self)
    }
}
