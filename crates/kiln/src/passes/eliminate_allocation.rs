use crate::context::Context;
use crate::error::Result;
use crate::instruction::InsRef;
use crate::ops::Load;
use crate::pass::Pass;
use crate::program::Program;
use crate::shape::{DType, Shape};

/// Replaces every allocation with an offset view into one `memory`
/// parameter, laid out sequentially.
///
/// The running total is rounded up to the alignment before each placement;
/// the final parameter size is the last running total, not rounded. Assumes
/// every allocation stays live for the whole program (no live-range
/// analysis); this is the planner used when memory coloring is disabled.
#[derive(Debug)]
pub struct EliminateAllocation {
    allocation_op: String,
    alignment: usize,
}

impl EliminateAllocation {
    pub fn new(allocation_op: &str, alignment: usize) -> Self {
        EliminateAllocation {
            allocation_op: allocation_op.to_string(),
            alignment: alignment.max(1),
        }
    }
}

impl Default for EliminateAllocation {
    fn default() -> Self {
        EliminateAllocation::new("allocate", 32)
    }
}

impl Pass for EliminateAllocation {
    fn name(&self) -> &'static str {
        "eliminate_allocation"
    }

    fn apply(&self, prog: &mut Program, _ctx: &mut Context) -> Result<()> {
        let allocs: Vec<(InsRef, Shape)> = prog
            .iter()
            .filter(|(_, ins)| ins.name() == self.allocation_op)
            .map(|(r, ins)| (r, ins.shape().clone()))
            .collect();
        if allocs.is_empty() {
            return Ok(());
        }

        let mut total = 0usize;
        let mut placements = Vec::with_capacity(allocs.len());
        for (r, shape) in allocs {
            let offset = total.next_multiple_of(self.alignment);
            total = offset + shape.bytes();
            placements.push((r, shape, offset));
        }

        let first = prog.refs()[0];
        let memory = prog.insert_parameter(first, "memory", Shape::new(DType::Uint8, [total]))?;
        for (r, shape, offset) in placements {
            prog.replace_instruction(r, Load { shape, offset }, &[memory])?;
        }
        Ok(())
    }
}
