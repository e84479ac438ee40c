//! Immutable tensor constants.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::shape::{DType, Shape};

/// A shape plus owned element bytes, as stored by `@literal` instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    shape: Shape,
    data: Vec<u8>,
}

impl Literal {
    /// Builds a literal from raw bytes; the buffer must cover the shape.
    ///
    /// Panics on a size mismatch, which is a programmer error.
    pub fn from_bytes(shape: Shape, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            shape.bytes(),
            "literal buffer does not match its shape"
        );
        Literal { shape, data }
    }

    pub fn from_f32<L: Into<Vec<usize>>>(lens: L, values: &[f32]) -> Self {
        let shape = Shape::new(DType::Float32, lens);
        assert_eq!(values.len(), shape.elements(), "literal element count");
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Literal { shape, data }
    }

    pub fn from_i32<L: Into<Vec<usize>>>(lens: L, values: &[i32]) -> Self {
        let shape = Shape::new(DType::Int32, lens);
        assert_eq!(values.len(), shape.elements(), "literal element count");
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Literal { shape, data }
    }

    pub fn scalar_f32(value: f32) -> Self {
        Literal::from_f32([1usize; 1], &[value])
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads the literal back as f32 values (packed, standard layout only).
    pub fn to_f32(&self) -> Vec<f32> {
        assert_eq!(self.shape.dtype(), DType::Float32);
        self.data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "literal<{}>", self.shape)
    }
}

/// Deterministic pseudo-random literal for tests and benchmarks.
pub fn generate_literal(shape: Shape, seed: u64) -> Literal {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = match shape.dtype() {
        DType::Float32 => (0..shape.element_space())
            .flat_map(|_| rng.gen_range(-1.0f32..1.0f32).to_le_bytes())
            .collect(),
        _ => {
            let mut data = vec![0u8; shape.bytes()];
            rng.fill(data.as_mut_slice());
            data
        }
    };
    Literal::from_bytes(shape, data)
}
