//! Shared test operators, in the spirit of the throwaway ops every pass test
//! needs: a pass-through that writes into its first input's buffer, a strict
//! variant demanding standard inputs, and a no-op.
#![allow(dead_code)]

use kiln::argument::Argument;
use kiln::error::Result;
use kiln::instruction::InsRef;
use kiln::op::Operator;
use kiln::ops::Allocate;
use kiln::program::Program;
use kiln::shape::{DType, Shape, ShapeCheck};

/// Forwards its first input; the output aliases that input's buffer.
#[derive(Debug, Clone, Default)]
pub struct PassOp;

impl Operator for PassOp {
    fn name(&self) -> &str {
        "pass"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        Ok(inputs
            .first()
            .cloned()
            .unwrap_or_else(|| Shape::none(DType::Float32)))
    }

    fn output_alias(&self, inputs: &[Shape]) -> Option<usize> {
        if inputs.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args
            .first()
            .cloned()
            .unwrap_or_else(|| Argument::empty(output.clone())))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Like [`PassOp`], but rejects non-standard inputs at shape inference.
#[derive(Debug, Clone, Default)]
pub struct PassStandardOp;

impl Operator for PassStandardOp {
    fn name(&self) -> &str {
        "pass_standard"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("pass_standard", inputs).at_least(1)?.standard()?;
        Ok(inputs[0].clone())
    }

    fn output_alias(&self, inputs: &[Shape]) -> Option<usize> {
        if inputs.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn compute(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].clone())
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Produces nothing and reads nothing, whatever its inputs.
#[derive(Debug, Clone, Default)]
pub struct Nop;

impl Operator for Nop {
    fn name(&self) -> &str {
        "nop"
    }

    fn compute_shape(&self, _inputs: &[Shape]) -> Result<Shape> {
        Ok(Shape::none(DType::Float32))
    }

    fn compute(&self, output: &Shape, _args: &[Argument]) -> Result<Argument> {
        Ok(Argument::empty(output.clone()))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Adds an outline-fed allocation, the way lowered programs reserve buffers.
pub fn add_alloc(p: &mut Program, shape: Shape) -> InsRef {
    let outline = p.add_outline(shape).unwrap();
    p.add_instruction(Allocate::default(), &[outline]).unwrap()
}

pub fn f32_shape<L: Into<Vec<usize>>>(lens: L) -> Shape {
    Shape::new(DType::Float32, lens)
}

/// True when no allocation instructions remain.
pub fn no_allocate(p: &Program) -> bool {
    p.iter().all(|(_, ins)| ins.name() != "allocate")
}

pub fn count_named(p: &Program, name: &str) -> usize {
    p.iter().filter(|(_, ins)| ins.name() == name).count()
}
