mod common;

use kiln::context::Context;
use kiln::literal::Literal;
use kiln::ops::{Contiguous, Dot, Identity, Sin, Slice, Transpose};
use kiln::pass::{Pass, Target};
use kiln::passes::{DeadCodeElimination, EliminateContiguous};
use kiln::program::Program;

use common::{f32_shape, PassOp, PassStandardOp};

struct EliminateContiguousTarget;

impl Target for EliminateContiguousTarget {
    fn name(&self) -> &str {
        "eliminate_contiguous_test"
    }

    fn get_passes(&self, _ctx: &mut Context) -> Vec<Box<dyn Pass>> {
        vec![Box::new(EliminateContiguous), Box::new(DeadCodeElimination)]
    }
}

fn get_2x2() -> Literal {
    Literal::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0])
}

#[test]
fn standard_consumer_keeps_the_copy() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 2])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    p.add_instruction(PassStandardOp, &[c]).unwrap();
    let count = p.len();
    p.compile(&EliminateContiguousTarget).unwrap();
    assert_eq!(p.len(), count);
}

#[test]
fn standard_consumer_of_a_constant_folds_to_a_literal() {
    let mut p = Program::new();
    let l = p.add_literal(get_2x2()).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[l]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    p.add_instruction(PassStandardOp, &[c]).unwrap();
    p.compile(&EliminateContiguousTarget).unwrap();
    assert_eq!(p.len(), 2);
    assert_eq!(common::count_named(&p, "@literal"), 1);
}

#[test]
fn terminal_shape_change_is_rejected() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 2])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    p.add_instruction(PassOp, &[c]).unwrap();
    let count = p.len();
    p.compile(&EliminateContiguousTarget).unwrap();
    // pass would accept the transposed view, but the program's output shape
    // must not change.
    assert_eq!(p.len(), count);
}

#[test]
fn rejected_rewire_of_a_constant_still_folds() {
    let mut p = Program::new();
    let l = p.add_literal(get_2x2()).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[l]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    p.add_instruction(PassOp, &[c]).unwrap();
    p.compile(&EliminateContiguousTarget).unwrap();
    assert_eq!(p.len(), 2);
    let folded = p
        .iter()
        .find(|(_, ins)| ins.name() == "@literal")
        .expect("folded literal");
    // transpose-then-contiguous of the row-major 2x2.
    let lit = folded
        .1
        .op()
        .downcast_ref::<kiln::ops::LiteralOp>()
        .unwrap();
    assert_eq!(lit.literal.to_f32(), vec![1.0, 3.0, 2.0, 4.0]);
}

#[test]
fn copy_feeding_a_dot_through_identity_is_removed() {
    let mut p = Program::new();
    let l = p.add_literal(get_2x2()).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[l]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    let ic = p.add_instruction(Identity, &[c]).unwrap();
    p.add_instruction(Dot, &[ic, l]).unwrap();
    let count = p.len();
    p.compile(&EliminateContiguousTarget).unwrap();
    assert_eq!(p.len(), count - 1);
    assert_eq!(common::count_named(&p, "contiguous"), 0);
}

#[test]
fn unary_consumer_keeps_the_copy_for_a_standard_terminal() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 2])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    let sn = p.add_instruction(Sin, &[c]).unwrap();
    p.add_instruction(PassStandardOp, &[sn]).unwrap();
    let count = p.len();
    p.compile(&EliminateContiguousTarget).unwrap();
    // sin would pass the transposed layout through to the strict consumer.
    assert_eq!(p.len(), count);
}

#[test]
fn unary_consumer_of_a_constant_folds() {
    let mut p = Program::new();
    let l = p.add_literal(get_2x2()).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[l]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    let sn = p.add_instruction(Sin, &[c]).unwrap();
    p.add_instruction(PassStandardOp, &[sn]).unwrap();
    p.compile(&EliminateContiguousTarget).unwrap();
    assert_eq!(p.len(), 3);
}

#[test]
fn unary_normalizes_a_sliced_input() {
    let mut p = Program::new();
    let l = p.add_literal(get_2x2()).unwrap();
    let t = p
        .add_instruction(
            Slice {
                axes: vec![1],
                starts: vec![1],
                ends: vec![2],
            },
            &[l],
        )
        .unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    let sn = p.add_instruction(Sin, &[c]).unwrap();
    p.add_instruction(PassStandardOp, &[sn]).unwrap();
    let count = p.len();
    p.compile(&EliminateContiguousTarget).unwrap();
    // sin produces a standard output from the non-packed slice, so the copy
    // is redundant.
    assert_eq!(p.len(), count - 1);
    assert_eq!(common::count_named(&p, "contiguous"), 0);
}
