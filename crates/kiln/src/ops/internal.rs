use crate::argument::Argument;
use crate::error::Result;
use crate::literal::Literal;
use crate::op::{FieldValue, Operator};
use crate::shape::{Shape, ShapeCheck};

/// Named program input. Created by `Program::add_parameter`.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub shape: Shape,
}

impl Operator for Param {
    fn name(&self) -> &str {
        "@param"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("@param", inputs).has(0)?;
        Ok(self.shape.clone())
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("name", FieldValue::Str(self.name.clone()));
        visit("shape", FieldValue::Shape(self.shape.clone()));
    }
}

/// Embedded constant. Created by `Program::add_literal`.
#[derive(Debug, Clone)]
pub struct LiteralOp {
    pub literal: Literal,
}

impl Operator for LiteralOp {
    fn name(&self) -> &str {
        "@literal"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("@literal", inputs).has(0)?;
        Ok(self.literal.shape().clone())
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("shape", FieldValue::Shape(self.literal.shape().clone()));
        visit("digest", FieldValue::UInt(fnv1a(self.literal.bytes())));
    }

    fn compute(&self, _output: &Shape, _args: &[Argument]) -> Result<Argument> {
        Ok(Argument::from_literal(&self.literal))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Shape-only placeholder with no storage, fed to allocation operators.
/// Created by `Program::add_outline`.
#[derive(Debug, Clone)]
pub struct Outline {
    pub shape: Shape,
}

impl Operator for Outline {
    fn name(&self) -> &str {
        "@outline"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("@outline", inputs).has(0)?;
        Ok(self.shape.clone())
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("shape", FieldValue::Shape(self.shape.clone()));
    }

    fn compute(&self, output: &Shape, _args: &[Argument]) -> Result<Argument> {
        Ok(Argument::empty(output.clone()))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
