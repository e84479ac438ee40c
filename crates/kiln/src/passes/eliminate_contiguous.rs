use std::collections::HashMap;

use crate::argument::Argument;
use crate::context::Context;
use crate::error::Result;
use crate::instruction::InsRef;
use crate::ops::LiteralOp;
use crate::pass::Pass;
use crate::program::Program;
use crate::shape::Shape;

/// Drops `contiguous` copies whose consumers can take the non-standard
/// input directly.
///
/// A removal is accepted only if shape inference still succeeds at every
/// downstream instruction and the program's terminal shape is unchanged.
/// When a removal is rejected but the copy is constant (literal-rooted,
/// context-free chain), the copy is folded into a literal instead. Run
/// dead-code elimination afterwards to collect the detached producers.
#[derive(Debug, Default)]
pub struct EliminateContiguous;

impl Pass for EliminateContiguous {
    fn name(&self) -> &'static str {
        "eliminate_contiguous"
    }

    fn apply(&self, prog: &mut Program, _ctx: &mut Context) -> Result<()> {
        for r in prog.refs() {
            if !prog.has_instruction(r) {
                continue;
            }
            let ins = prog.instruction(r).expect("ref was just checked live");
            if ins.name() != "contiguous" || prog.last() == Some(r) {
                continue;
            }
            let input = ins.inputs()[0];
            if can_rewire(prog, r, input) {
                prog.replace_with(r, input)?;
                continue;
            }
            let mut memo = HashMap::new();
            if let Some(folded) = eval_const(prog, r, &mut memo) {
                let literal = prog.insert_instruction(
                    r,
                    LiteralOp {
                        literal: folded.to_literal(),
                    },
                    &[],
                )?;
                prog.replace_with(r, literal)?;
            }
        }
        Ok(())
    }
}

/// Simulates replacing the copy with its input: every downstream shape must
/// still infer, and a shape change must not reach the terminal.
fn can_rewire(prog: &Program, contiguous: InsRef, input: InsRef) -> bool {
    let input_shape = prog
        .instruction(input)
        .expect("input must be live")
        .shape()
        .clone();
    let mut updated: HashMap<InsRef, Shape> = HashMap::new();
    if prog.instruction(contiguous).expect("ref must be live").shape() != &input_shape {
        updated.insert(contiguous, input_shape);
    }
    let order = prog.refs();
    let start = prog.position(contiguous).expect("live ref must have a position");
    let last = prog.last();
    for &r in &order[start + 1..] {
        let node = prog.instruction(r).expect("ref must be live");
        if !node.inputs().iter().any(|i| updated.contains_key(i)) {
            continue;
        }
        let shapes: Vec<Shape> = node
            .inputs()
            .iter()
            .map(|i| {
                updated
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| prog.instruction(*i).expect("input must be live").shape().clone())
            })
            .collect();
        let Ok(new_shape) = node.op().compute_shape(&shapes) else {
            return false;
        };
        if &new_shape != node.shape() {
            if last == Some(r) {
                return false;
            }
            updated.insert(r, new_shape);
        }
    }
    true
}

/// Evaluates a literal-rooted, context-free subgraph, or gives up.
fn eval_const(
    prog: &Program,
    r: InsRef,
    memo: &mut HashMap<InsRef, Option<Argument>>,
) -> Option<Argument> {
    if let Some(cached) = memo.get(&r) {
        return cached.clone();
    }
    let ins = prog.instruction(r).expect("ref must be live");
    let result = if let Some(lit) = ins.op().downcast_ref::<LiteralOp>() {
        Some(Argument::from_literal(&lit.literal))
    } else if !ins.op().is_context_free() {
        None
    } else {
        let args: Option<Vec<Argument>> = ins
            .inputs()
            .iter()
            .map(|&i| eval_const(prog, i, memo))
            .collect();
        args.and_then(|args| ins.op().compute(ins.shape(), &args).ok())
    };
    memo.insert(r, result.clone());
    result
}
