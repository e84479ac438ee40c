//! Runtime buffer references produced and consumed by `compute`.

use std::fmt;
use std::sync::Arc;

use crate::literal::Literal;
use crate::shape::Shape;

/// A shape plus a reference-counted byte buffer and a byte offset into it.
///
/// Owning arguments hold a fresh buffer at offset zero; views share the base
/// buffer at a chosen offset (the `scratch`/`memory` parameters are carved up
/// this way). Cloning is cheap and never copies element data.
#[derive(Debug, Clone)]
pub struct Argument {
    shape: Shape,
    data: Arc<Vec<u8>>,
    offset: usize,
}

impl Argument {
    /// A zero-initialized owning argument.
    pub fn zeroed(shape: Shape) -> Self {
        let bytes = shape.bytes();
        Argument {
            shape,
            data: Arc::new(vec![0; bytes]),
            offset: 0,
        }
    }

    /// An empty argument carrying no data.
    pub fn empty(shape: Shape) -> Self {
        Argument {
            shape,
            data: Arc::new(Vec::new()),
            offset: 0,
        }
    }

    pub fn from_literal(literal: &Literal) -> Self {
        Argument {
            shape: literal.shape().clone(),
            data: Arc::new(literal.bytes().to_vec()),
            offset: 0,
        }
    }

    pub fn from_bytes(shape: Shape, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), shape.bytes(), "argument buffer size");
        Argument {
            shape,
            data: Arc::new(data),
            offset: 0,
        }
    }

    /// A view over `base`'s buffer presenting `shape` at `offset` bytes.
    ///
    /// Panics if the view does not fit inside the base buffer.
    pub fn view(base: &Argument, shape: Shape, offset: usize) -> Self {
        let end = base.offset + offset + shape.bytes();
        assert!(end <= base.data.len(), "view outside the base buffer");
        Argument {
            shape,
            data: Arc::clone(&base.data),
            offset: base.offset + offset,
        }
    }

    /// Reinterprets this argument under a different shape over the same
    /// buffer (transpose/reshape-style views).
    pub fn reshaped(&self, shape: Shape) -> Self {
        Argument {
            shape,
            data: Arc::clone(&self.data),
            offset: self.offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.shape.bytes()]
    }

    /// True when this argument shares a buffer with `other`.
    pub fn shares_buffer(&self, other: &Argument) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub fn to_literal(&self) -> Literal {
        Literal::from_bytes(self.shape.clone(), self.bytes().to_vec())
    }

    /// Copies this argument into a standard-layout owning argument.
    pub fn make_standard(&self) -> Argument {
        if self.shape.standard() {
            return Argument::from_bytes(self.shape.clone(), self.bytes().to_vec());
        }
        let out_shape = self.shape.as_standard();
        let elem = self.shape.dtype().size_in_bytes();
        let mut data = vec![0u8; out_shape.bytes()];
        let src = &self.data[self.offset..];
        for position in 0..self.shape.elements() {
            let index = self.shape.multi_index(position);
            let src_at = self.shape.index_of(&index) * elem;
            let dst_at = position * elem;
            data[dst_at..dst_at + elem].copy_from_slice(&src[src_at..src_at + elem]);
        }
        Argument::from_bytes(out_shape, data)
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Argument) -> bool {
        self.shape == other.shape && self.bytes() == other.bytes()
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "argument<{}>", self.shape)
    }
}
