//! Reshape and transpose simplification.
//!
//! Four rewrites run over every live instruction: shape-preserving reshapers
//! collapse onto their input, reshape chains collapse between equal shapes,
//! transpose chains fold into one composed transpose (or disappear when the
//! composition is the identity), and a concat of transposes becomes a
//! transpose of a concat. Running the pass twice changes nothing.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::context::Context;
use crate::error::Result;
use crate::instruction::InsRef;
use crate::matcher::{
    all_of_inputs, any_of_outputs, arg, find_matches, name, none_of, same_input_shapes,
    same_shape, skip_output, transpose_shape, Matcher, MatcherResult, Rewrite,
};
use crate::ops::{Concat, Transpose};
use crate::pass::Pass;
use crate::program::Program;

static RESHAPER_NAMES: Lazy<HashSet<String>> = Lazy::new(|| {
    ["reshape", "contiguous", "squeeze", "unsqueeze"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

fn is_reshaper(prog: &Program, ins: InsRef) -> bool {
    prog.instruction(ins)
        .map_or(false, |node| RESHAPER_NAMES.contains(node.name()))
}

/// Drops any reshaper (plus transpose/slice) that keeps its input's shape.
struct FindNopReshapes;

impl Rewrite for FindNopReshapes {
    fn matcher(&self) -> Matcher {
        let mut names = RESHAPER_NAMES.clone();
        names.insert("transpose".to_string());
        names.insert("slice".to_string());
        name(names).and(same_shape(arg(0)))
    }

    fn apply(&self, prog: &mut Program, m: MatcherResult) -> Result<()> {
        let input = prog
            .instruction(m.result)
            .expect("matched ref must be live")
            .inputs()[0];
        prog.replace_with(m.result, input)
    }
}

/// Collapses a run of reshapers between two equal shapes.
struct FindReshaper;

impl Rewrite for FindReshaper {
    fn matcher(&self) -> Matcher {
        name(&*RESHAPER_NAMES).and(any_of_outputs(name(&*RESHAPER_NAMES)))
    }

    fn apply(&self, prog: &mut Program, m: MatcherResult) -> Result<()> {
        // The chain from the anchor up through its reshaper inputs, ending at
        // the first non-reshaper source.
        let mut chain = vec![m.result];
        while is_reshaper(prog, *chain.last().expect("chain is non-empty")) {
            let back = *chain.last().expect("chain is non-empty");
            let input = prog
                .instruction(back)
                .expect("chain ref must be live")
                .inputs()[0];
            chain.push(input);
        }

        for (i, &start) in chain.iter().enumerate() {
            let start_shape = prog
                .instruction(start)
                .expect("chain ref must be live")
                .shape()
                .clone();
            let deepest = chain
                .iter()
                .rev()
                .find(|&&other| {
                    other != start
                        && prog
                            .instruction(other)
                            .map_or(false, |node| node.shape() == &start_shape)
                })
                .copied();
            if let Some(deepest) = deepest {
                // Only rewire forward: the replacement must be deeper in the
                // chain than the instruction it replaces.
                if chain[i + 1..].contains(&deepest) {
                    return prog.replace_with(start, deepest);
                }
            }
        }
        Ok(())
    }
}

/// Folds a transpose chain (allowing interleaved contiguous copies) into one
/// composed transpose, or into nothing when the composition is the identity.
struct FindTranspose;

impl Rewrite for FindTranspose {
    fn matcher(&self) -> Matcher {
        // Anchor only at the topmost transpose of a chain.
        name("transpose").and(none_of(skip_output(name("contiguous"), name("transpose"))))
    }

    fn apply(&self, prog: &mut Program, m: MatcherResult) -> Result<()> {
        let ins = m.result;
        let rank = prog
            .instruction(ins)
            .expect("matched ref must be live")
            .shape()
            .rank();
        let mut dims: Vec<usize> = (0..rank).collect();
        let mut x = ins;
        let mut t = ins;
        loop {
            let perm = transpose_perm(prog, t);
            dims = dims.iter().map(|&axis| perm[axis]).collect();
            x = t;
            t = find_transpose_input(prog, x);
            if x == t || !is_transpose(prog, t) {
                break;
            }
        }
        if t == ins || !is_transpose(prog, t) {
            return Ok(());
        }
        let source = prog.instruction(t).expect("chain ref must be live").inputs()[0];
        if is_identity_perm(&dims) {
            prog.replace_with(ins, source)
        } else {
            prog.replace_instruction(ins, Transpose::new(dims), &[source])?;
            Ok(())
        }
    }
}

/// Lifts a concat of commonly-permuted transposes above the concat.
struct FindConcatTranspose;

impl Rewrite for FindConcatTranspose {
    fn matcher(&self) -> Matcher {
        name("concat")
            .and(same_input_shapes())
            .and(all_of_inputs(transpose_shape()))
    }

    fn apply(&self, prog: &mut Program, m: MatcherResult) -> Result<()> {
        let ins = m.result;
        let node = prog.instruction(ins).expect("matched ref must be live");
        let inputs = node.inputs().to_vec();
        let input_shape = prog
            .instruction(inputs[0])
            .expect("input must be live")
            .shape()
            .clone();
        let axis = node.op().downcast::<Concat>()?.axis;

        let permutation = find_permutation(input_shape.strides());
        let ipermutation = invert_permutation(&permutation);
        let lifted_axis = ipermutation[axis];

        let mut lifted_inputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let source = pre_transpose_source(prog, input);
            let lifted = match source {
                Some(source) => source,
                None => prog.insert_instruction(ins, Transpose::new(permutation.clone()), &[input])?,
            };
            lifted_inputs.push(lifted);
        }
        let concat = prog.insert_instruction(ins, Concat { axis: lifted_axis }, &lifted_inputs)?;
        let transpose =
            prog.insert_instruction(ins, Transpose::new(ipermutation), &[concat])?;
        prog.replace_with(ins, transpose)
    }
}

fn pre_transpose_source(prog: &Program, input: InsRef) -> Option<InsRef> {
    let node = prog.instruction(input)?;
    if node.name() != "transpose" {
        return None;
    }
    let source = node.inputs()[0];
    prog.instruction(source)?
        .shape()
        .standard()
        .then_some(source)
}

fn is_transpose(prog: &Program, ins: InsRef) -> bool {
    prog.instruction(ins).map_or(false, |n| n.name() == "transpose")
}

fn transpose_perm(prog: &Program, ins: InsRef) -> Vec<usize> {
    prog.instruction(ins)
        .and_then(|n| n.op().downcast_ref::<Transpose>())
        .map(|t| t.perm.clone())
        .expect("instruction must be a transpose")
}

/// Walks up through contiguous copies to the next transpose; yields the
/// starting instruction when there is none.
fn find_transpose_input(prog: &Program, ins: InsRef) -> InsRef {
    let Some(node) = prog.instruction(ins) else {
        return ins;
    };
    if node.inputs().len() != 1 {
        return ins;
    }
    let input = node.inputs()[0];
    let Some(input_node) = prog.instruction(input) else {
        return ins;
    };
    match input_node.name() {
        "contiguous" => find_transpose_input(prog, input),
        "transpose" => input,
        _ => ins,
    }
}

fn is_identity_perm(perm: &[usize]) -> bool {
    perm.iter().copied().eq(0..perm.len())
}

/// Axis order by decreasing stride: the permutation a transpose applied.
fn find_permutation(strides: &[usize]) -> Vec<usize> {
    let mut axes: Vec<usize> = (0..strides.len()).collect();
    axes.sort_by(|&a, &b| strides[b].cmp(&strides[a]));
    axes
}

fn invert_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inverse: Vec<usize> = (0..perm.len()).collect();
    inverse.sort_by_key(|&axis| perm[axis]);
    inverse
}

/// The reshape simplifier; idempotent.
#[derive(Debug, Default)]
pub struct SimplifyReshapes;

impl Pass for SimplifyReshapes {
    fn name(&self) -> &'static str {
        "simplify_reshapes"
    }

    fn apply(&self, prog: &mut Program, _ctx: &mut Context) -> Result<()> {
        for r in prog.refs() {
            if !prog.has_instruction(r) {
                continue;
            }
            let is_last = prog.last() == Some(r);
            let ins = prog.instruction(r).expect("ref was just checked live");
            if is_last && ins.name() == "contiguous" {
                continue;
            }
            // Skip instructions that are already dead.
            if ins.outputs().is_empty() && !is_last {
                continue;
            }
            find_matches(
                prog,
                r,
                &[
                    &FindNopReshapes,
                    &FindReshaper,
                    &FindTranspose,
                    &FindConcatTranspose,
                ],
            )?;
        }
        Ok(())
    }
}
