use crate::context::Context;
use crate::error::Result;
use crate::instruction::Instruction;
use crate::pass::Pass;
use crate::program::Program;

/// Removes instructions nobody reads, to a fixed point.
///
/// Parameters, the program terminal, and side-effecting instructions
/// (scheduling markers, anything carrying an event mask) survive even when
/// dead.
#[derive(Debug, Default)]
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead_code_elimination"
    }

    fn apply(&self, prog: &mut Program, _ctx: &mut Context) -> Result<()> {
        loop {
            let mut removed = 0;
            for r in prog.refs().into_iter().rev() {
                if !prog.has_instruction(r) || prog.last() == Some(r) {
                    continue;
                }
                let ins = prog.instruction(r).expect("ref was just checked live");
                if !ins.outputs().is_empty() || is_pinned(ins) {
                    continue;
                }
                prog.remove_instruction(r)?;
                removed += 1;
            }
            if removed == 0 {
                return Ok(());
            }
        }
    }
}

fn is_pinned(ins: &Instruction) -> bool {
    ins.name() == "@param" || ins.name() == "set_stream" || ins.mask() != 0
}
