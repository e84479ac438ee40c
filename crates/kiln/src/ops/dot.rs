use crate::error::{Error, Result};
use crate::op::Operator;
use crate::shape::{Shape, ShapeCheck};

/// Batched matrix product shape contract.
///
/// Carries no compute; targets lower it to a device kernel. Inputs may be
/// non-standard (a transposed operand is handed straight to the kernel),
/// which is what lets `eliminate_contiguous` drop copies feeding it.
#[derive(Debug, Clone, Default)]
pub struct Dot;

impl Operator for Dot {
    fn name(&self) -> &str {
        "dot"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("dot", inputs).has(2)?.same_dtype()?;
        let (a, b) = (&inputs[0], &inputs[1]);
        if a.rank() < 2 || b.rank() != a.rank() {
            return Err(Error::invalid_shape(
                "dot",
                format!("expected equal ranks >= 2, got {} and {}", a.rank(), b.rank()),
            ));
        }
        let rank = a.rank();
        if a.lens()[..rank - 2] != b.lens()[..rank - 2] {
            return Err(Error::invalid_shape("dot", "batch dimensions differ"));
        }
        if a.lens()[rank - 1] != b.lens()[rank - 2] {
            return Err(Error::invalid_shape(
                "dot",
                format!(
                    "inner dimensions do not match ({} vs {})",
                    a.lens()[rank - 1],
                    b.lens()[rank - 2]
                ),
            ));
        }
        let mut lens = a.lens()[..rank - 2].to_vec();
        lens.push(a.lens()[rank - 2]);
        lens.push(b.lens()[rank - 1]);
        Ok(Shape::new(a.dtype(), lens))
    }
}
