//! Buffer reservation and the offset views that replace it after planning.

use crate::argument::Argument;
use crate::error::{Error, Result};
use crate::op::{FieldValue, Operator};
use crate::shape::{Shape, ShapeCheck};

/// Reserves a buffer of a given shape; its sole effect.
///
/// The shape comes either from the operator's own field (no inputs) or from
/// an `@outline` input. Memory planning replaces every `allocate` with a
/// [`Load`] into the `scratch`/`memory` parameter.
#[derive(Debug, Clone)]
pub struct Allocate {
    pub shape: Shape,
}

impl Allocate {
    pub fn new(shape: Shape) -> Self {
        Allocate { shape }
    }
}

impl Default for Allocate {
    fn default() -> Self {
        Allocate {
            shape: Shape::none(crate::shape::DType::Float32),
        }
    }
}

impl Operator for Allocate {
    fn name(&self) -> &str {
        "allocate"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        match inputs.len() {
            0 => Ok(self.shape.clone()),
            1 => Ok(inputs[0].clone()),
            n => Err(Error::invalid_shape(
                "allocate",
                format!("expected 0 or 1 inputs, got {n}"),
            )),
        }
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("shape", FieldValue::Shape(self.shape.clone()));
    }

    fn compute(&self, output: &Shape, _args: &[Argument]) -> Result<Argument> {
        Ok(Argument::zeroed(output.clone()))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Presents `shape` at a byte offset into a byte-buffer input.
#[derive(Debug, Clone)]
pub struct Load {
    pub shape: Shape,
    pub offset: usize,
}

impl Operator for Load {
    fn name(&self) -> &str {
        "load"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("load", inputs).has(1)?;
        let buffer = &inputs[0];
        if self.offset + self.shape.bytes() > buffer.bytes() {
            return Err(Error::invalid_shape(
                "load",
                format!(
                    "view of {} bytes at offset {} exceeds the {}-byte buffer",
                    self.shape.bytes(),
                    self.offset,
                    buffer.bytes()
                ),
            ));
        }
        Ok(self.shape.clone())
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("shape", FieldValue::Shape(self.shape.clone()));
        visit("offset", FieldValue::UInt(self.offset as u64));
    }

    fn output_alias(&self, _inputs: &[Shape]) -> Option<usize> {
        Some(0)
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(Argument::view(&args[0], output.clone(), self.offset))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}
