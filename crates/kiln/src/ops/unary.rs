use crate::argument::Argument;
use crate::error::{Error, Result};
use crate::op::Operator;
use crate::shape::{DType, Shape, ShapeCheck};

/// Elementwise sine.
///
/// A packed input keeps its shape (the output reuses the layout); a
/// non-packed input produces a standard output, since the kernel writes a
/// dense result.
#[derive(Debug, Clone, Default)]
pub struct Sin;

impl Operator for Sin {
    fn name(&self) -> &str {
        "sin"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        ShapeCheck::new("sin", inputs).has(1)?;
        let input = &inputs[0];
        if input.packed() {
            Ok(input.clone())
        } else {
            Ok(input.as_standard())
        }
    }

    fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        let input = args[0].shape();
        if input.dtype() != DType::Float32 {
            return Err(Error::runtime("sin", "only f32 is supported"));
        }
        let src = args[0].bytes();
        let mut data = vec![0u8; output.bytes()];
        for position in 0..input.elements() {
            let index = input.multi_index(position);
            let src_at = input.index_of(&index) * 4;
            let value = f32::from_le_bytes([
                src[src_at],
                src[src_at + 1],
                src[src_at + 2],
                src[src_at + 3],
            ]);
            let dst_at = output.index_of(&index) * 4;
            data[dst_at..dst_at + 4].copy_from_slice(&value.sin().to_le_bytes());
        }
        Ok(Argument::from_bytes(output.clone(), data))
    }

    fn is_context_free(&self) -> bool {
        true
    }
}
