use crate::argument::Argument;
use crate::error::{Error, Result};
use crate::op::{FieldValue, Operator};
use crate::shape::{Shape, ShapeCheck};

/// Joins inputs along one axis into a standard output.
#[derive(Debug, Clone)]
pub struct Concat {
    pub axis: usize,
}

impl Operator for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("concat", inputs).at_least(1)?.same_dtype()?;
        let first = &inputs[0];
        if self.axis >= first.rank() {
            return Err(Error::invalid_shape(
                "concat",
                format!("axis {} out of range for rank {}", self.axis, first.rank()),
            ));
        }
        let mut lens = first.lens().to_vec();
        for input in &inputs[1..] {
            if input.rank() != first.rank() {
                return Err(Error::invalid_shape("concat", "inputs must share a rank"));
            }
            for (axis, (&a, &b)) in first.lens().iter().zip(input.lens()).enumerate() {
                if axis != self.axis && a != b {
                    return Err(Error::invalid_shape(
                        "concat",
                        format!("axis {axis} lengths differ ({a} vs {b})"),
                    ));
                }
            }
            lens[self.axis] += input.lens()[self.axis];
        }
        Ok(Shape::new(first.dtype(), lens))
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("axis", FieldValue::UInt(self.axis as u64));
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        let elem = output.dtype().size_in_bytes();
        let mut data = vec![0u8; output.bytes()];
        let mut axis_base = 0;
        for arg in args {
            let shape = arg.shape();
            let src = arg.bytes();
            for position in 0..shape.elements() {
                let mut index = shape.multi_index(position);
                let src_at = shape.index_of(&index) * elem;
                index[self.axis] += axis_base;
                let dst_at = output.index_of(&index) * elem;
                data[dst_at..dst_at + elem].copy_from_slice(&src[src_at..src_at + elem]);
            }
            axis_base += shape.lens()[self.axis];
        }
        Ok(Argument::from_bytes(output.clone(), data))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}
