//! Layout-changing operators: views over an input buffer plus `contiguous`,
//! which materializes a standard copy.

use crate::argument::Argument;
use crate::error::{Error, Result};
use crate::op::{FieldValue, Operator};
use crate::shape::{Shape, ShapeCheck};

/// Passes its input through unchanged.
#[derive(Debug, Clone, Default)]
pub struct Identity;

impl Operator for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("identity", inputs).has(1)?;
        Ok(inputs[0].clone())
    }

    fn output_alias(&self, _inputs: &[Shape]) -> Option<usize> {
        Some(0)
    }

    fn compute(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].clone())
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Permutes axes; a pure view (strides are permuted with the lens).
#[derive(Debug, Clone)]
pub struct Transpose {
    pub perm: Vec<usize>,
}

impl Transpose {
    pub fn new<P: Into<Vec<usize>>>(perm: P) -> Self {
        Transpose { perm: perm.into() }
    }
}

impl Operator for Transpose {
    fn name(&self) -> &str {
        "transpose"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("transpose", inputs).has(1)?;
        let input = &inputs[0];
        if self.perm.len() != input.rank() || !is_permutation(&self.perm) {
            return Err(Error::invalid_shape(
                "transpose",
                format!("{:?} is not a permutation of rank {}", self.perm, input.rank()),
            ));
        }
        let lens: Vec<usize> = self.perm.iter().map(|&a| input.lens()[a]).collect();
        let strides: Vec<usize> = self.perm.iter().map(|&a| input.strides()[a]).collect();
        Ok(Shape::with_strides(input.dtype(), lens, strides))
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("perm", FieldValue::from(self.perm.as_slice()));
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].reshaped(output.clone()))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Copies its input into standard (row-major, packed) layout.
#[derive(Debug, Clone, Default)]
pub struct Contiguous;

impl Operator for Contiguous {
    fn name(&self) -> &str {
        "contiguous"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("contiguous", inputs).has(1)?;
        Ok(inputs[0].as_standard())
    }

    fn compute(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].make_standard())
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Reinterprets a standard input under new dimensions. One dimension may be
/// -1 and is inferred from the element count.
#[derive(Debug, Clone)]
pub struct Reshape {
    pub dims: Vec<i64>,
}

impl Reshape {
    pub fn new<D: Into<Vec<i64>>>(dims: D) -> Self {
        Reshape { dims: dims.into() }
    }

    fn resolve(&self, elements: usize) -> Result<Vec<usize>> {
        let wildcards = self.dims.iter().filter(|&&d| d == -1).count();
        if wildcards > 1 {
            return Err(Error::invalid_shape("reshape", "at most one -1 dimension"));
        }
        if self.dims.iter().any(|&d| d < -1 || d == 0) {
            return Err(Error::invalid_shape(
                "reshape",
                format!("invalid dimensions {:?}", self.dims),
            ));
        }
        let known: usize = self
            .dims
            .iter()
            .filter(|&&d| d != -1)
            .map(|&d| d as usize)
            .product();
        let mut lens = Vec::with_capacity(self.dims.len());
        for &d in &self.dims {
            if d == -1 {
                if known == 0 || elements % known != 0 {
                    return Err(Error::invalid_shape("reshape", "cannot infer -1 dimension"));
                }
                lens.push(elements / known);
            } else {
                lens.push(d as usize);
            }
        }
        if lens.iter().product::<usize>() != elements {
            return Err(Error::invalid_shape(
                "reshape",
                format!("{:?} does not cover {elements} elements", self.dims),
            ));
        }
        Ok(lens)
    }
}

impl Operator for Reshape {
    fn name(&self) -> &str {
        "reshape"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("reshape", inputs).has(1)?.standard()?;
        let lens = self.resolve(inputs[0].elements())?;
        Ok(Shape::new(inputs[0].dtype(), lens))
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("dims", FieldValue::Ints(self.dims.clone()));
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].reshaped(output.clone()))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Removes unit axes. With no axes listed, removes them all.
#[derive(Debug, Clone, Default)]
pub struct Squeeze {
    pub axes: Vec<usize>,
}

impl Operator for Squeeze {
    fn name(&self) -> &str {
        "squeeze"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("squeeze", inputs).has(1)?.standard()?;
        let input = &inputs[0];
        for &axis in &self.axes {
            if axis >= input.rank() {
                return Err(Error::invalid_shape("squeeze", format!("axis {axis} out of range")));
            }
            if input.lens()[axis] != 1 {
                return Err(Error::invalid_shape(
                    "squeeze",
                    format!("axis {axis} has length {}", input.lens()[axis]),
                ));
            }
        }
        let lens: Vec<usize> = input
            .lens()
            .iter()
            .enumerate()
            .filter(|&(axis, &len)| {
                if self.axes.is_empty() {
                    len != 1
                } else {
                    !self.axes.contains(&axis)
                }
            })
            .map(|(_, &len)| len)
            .collect();
        Ok(Shape::new(input.dtype(), lens))
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("axes", FieldValue::from(self.axes.as_slice()));
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].reshaped(output.clone()))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Inserts unit axes at the given output positions.
#[derive(Debug, Clone)]
pub struct Unsqueeze {
    pub axes: Vec<usize>,
}

impl Operator for Unsqueeze {
    fn name(&self) -> &str {
        "unsqueeze"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("unsqueeze", inputs).has(1)?.standard()?;
        let input = &inputs[0];
        let rank = input.rank() + self.axes.len();
        let mut lens = vec![0usize; rank];
        for &axis in &self.axes {
            if axis >= rank {
                return Err(Error::invalid_shape(
                    "unsqueeze",
                    format!("axis {axis} out of range for rank {rank}"),
                ));
            }
            lens[axis] = 1;
        }
        let mut source = input.lens().iter();
        for len in lens.iter_mut() {
            if *len == 0 {
                *len = *source.next().ok_or_else(|| {
                    Error::invalid_shape("unsqueeze", "duplicate axes")
                })?;
            }
        }
        Ok(Shape::new(input.dtype(), lens))
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("axes", FieldValue::from(self.axes.as_slice()));
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].reshaped(output.clone()))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

/// Restricts axes to index ranges; a view keeping the input strides.
#[derive(Debug, Clone)]
pub struct Slice {
    pub axes: Vec<usize>,
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
}

impl Operator for Slice {
    fn name(&self) -> &str {
        "slice"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("slice", inputs).has(1)?;
        let input = &inputs[0];
        if self.axes.len() != self.starts.len() || self.axes.len() != self.ends.len() {
            return Err(Error::invalid_shape("slice", "axes/starts/ends must align"));
        }
        let mut lens = input.lens().to_vec();
        for ((&axis, &start), &end) in self.axes.iter().zip(&self.starts).zip(&self.ends) {
            if axis >= input.rank() {
                return Err(Error::invalid_shape("slice", format!("axis {axis} out of range")));
            }
            if start >= end || end > input.lens()[axis] {
                return Err(Error::invalid_shape(
                    "slice",
                    format!("range {start}..{end} invalid for axis {axis}"),
                ));
            }
            lens[axis] = end - start;
        }
        Ok(Shape::with_strides(input.dtype(), lens, input.strides().to_vec()))
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("axes", FieldValue::from(self.axes.as_slice()));
        visit("starts", FieldValue::from(self.starts.as_slice()));
        visit("ends", FieldValue::from(self.ends.as_slice()));
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        let input = args[0].shape();
        let offset_elems: usize = self
            .axes
            .iter()
            .zip(&self.starts)
            .map(|(&axis, &start)| start * input.strides()[axis])
            .sum();
        let offset = offset_elems * input.dtype().size_in_bytes();
        Ok(Argument::view(&args[0], output.clone(), offset))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}

fn is_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    for &axis in perm {
        if axis >= perm.len() || seen[axis] {
            return false;
        }
        seen[axis] = true;
    }
    true
}
