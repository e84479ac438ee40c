use crate::argument::Argument;
use crate::context::Context;
use crate::error::Result;
use crate::op::{FieldValue, Operator};
use crate::shape::{DType, Shape};

/// Scheduling marker: subsequent instructions submit to `stream`.
///
/// Carries no data (rank-0 shape, or its first input's shape when used as a
/// pass-through). Only computable with a context, since stream switching is
/// device state.
#[derive(Debug, Clone)]
pub struct SetStream {
    pub stream: u32,
}

impl Operator for SetStream {
    fn name(&self) -> &str {
        "set_stream"
    }

    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        Ok(inputs
            .first()
            .cloned()
            .unwrap_or_else(|| Shape::none(DType::Float32)))
    }

    fn reflect(&self, visit: &mut dyn FnMut(&'static str, FieldValue)) {
        visit("stream", FieldValue::UInt(u64::from(self.stream)));
    }

    fn compute_with_context(
        &self,
        _ctx: &mut Context,
        output: &Shape,
        args: &[Argument],
    ) -> Result<Argument> {
        Ok(args
            .first()
            .cloned()
            .unwrap_or_else(|| Argument::empty(output.clone())))
    }

    fn needs_context(&self) -> bool {
        true
    }
}
