mod common;

use std::collections::HashMap;

use kiln::argument::Argument;
use kiln::error::Error;
use kiln::literal::Literal;
use kiln::ops::{Concat, Contiguous, Identity, Sin, Transpose};
use kiln::program::Program;

use common::{f32_shape, PassOp};

#[test]
fn add_instruction_wires_symmetric_edges() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 2])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    assert_eq!(p.instruction(x).unwrap().outputs(), &[t]);
    assert_eq!(p.instruction(t).unwrap().inputs(), &[x]);
    assert_eq!(p.instruction(t).unwrap().outputs(), &[c]);
    p.validate().unwrap();
}

#[test]
fn shape_cache_matches_inference() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let shape = p.instruction(t).unwrap().shape().clone();
    assert_eq!(shape.lens(), &[3, 2]);
    assert_eq!(shape.strides(), &[1, 3]);
    assert!(shape.transposed());
}

#[test]
fn invalid_shapes_are_rejected_at_construction() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let err = p.add_instruction(Transpose::new([0, 2, 1]), &[x]);
    assert!(matches!(err, Err(Error::InvalidShape { .. })));
    // Nothing was published.
    assert_eq!(p.len(), 1);
    p.validate().unwrap();
}

#[test]
fn refs_to_removed_instructions_are_rejected() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let id = p.add_instruction(Identity, &[x]).unwrap();
    p.remove_instruction(id).unwrap();
    assert!(matches!(
        p.add_instruction(Identity, &[id]),
        Err(Error::Edge(_))
    ));
    assert!(matches!(p.remove_instruction(id), Err(Error::Edge(_))));
    p.validate().unwrap();
}

#[test]
fn remove_with_live_outputs_fails() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    p.add_instruction(Contiguous, &[t]).unwrap();
    assert!(matches!(p.remove_instruction(t), Err(Error::Edge(_))));
    p.validate().unwrap();
    p.remove_instruction(p.last().unwrap()).unwrap();
    p.remove_instruction(t).unwrap();
    assert_eq!(p.len(), 1);
    p.validate().unwrap();
}

#[test]
fn duplicate_parameter_names_are_rejected() {
    let mut p = Program::new();
    p.add_parameter("x", f32_shape([2, 3])).unwrap();
    assert!(matches!(
        p.add_parameter("x", f32_shape([4usize; 1])),
        Err(Error::Edge(_))
    ));
}

#[test]
fn replace_instruction_rewires_and_reinfers() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    p.replace_instruction(t, Identity, &[x]).unwrap();
    assert_eq!(p.instruction(t).unwrap().name(), "identity");
    assert_eq!(p.instruction(t).unwrap().shape(), &f32_shape([2, 3]));
    // The contiguous downstream re-inferred over the new input shape.
    assert_eq!(p.instruction(c).unwrap().shape(), &f32_shape([2, 3]));
    p.validate().unwrap();
}

#[test]
fn replace_with_redirects_users_and_removes_the_dead_node() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let id = p.add_instruction(Identity, &[x]).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[id]).unwrap();
    p.add_instruction(Contiguous, &[t]).unwrap();
    p.replace_with(id, x).unwrap();
    assert!(!p.has_instruction(id));
    assert_eq!(p.instruction(t).unwrap().inputs(), &[x]);
    p.validate().unwrap();
}

#[test]
fn replacing_the_terminal_keeps_a_produced_value() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let id = p.add_instruction(Identity, &[x]).unwrap();
    p.replace_with(id, x).unwrap();
    let last = p.last().unwrap();
    assert_eq!(p.instruction(last).unwrap().name(), "identity");
    assert_eq!(p.instruction(last).unwrap().inputs(), &[x]);
    p.validate().unwrap();
}

#[test]
fn replace_with_mismatched_lens_fails() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let y = p.add_parameter("y", f32_shape([3, 3])).unwrap();
    let id = p.add_instruction(Identity, &[x]).unwrap();
    p.add_instruction(Contiguous, &[id]).unwrap();
    assert!(matches!(p.replace_with(id, y), Err(Error::Edge(_))));
    p.validate().unwrap();
}

#[test]
fn move_instruction_preserves_topological_order() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let y = p.add_parameter("y", f32_shape([2, 3])).unwrap();
    let id = p.add_instruction(Identity, &[y]).unwrap();
    p.add_instruction(Concat { axis: 0 }, &[x, id]).unwrap();
    // Moving a parameter later is fine while its users still follow it.
    p.move_instruction(x, id).unwrap();
    p.validate().unwrap();
    // Moving a user before its input must fail and roll back.
    assert!(matches!(p.move_instruction(id, y), Err(Error::Edge(_))));
    p.validate().unwrap();
}

#[test]
fn refs_stay_stable_across_unrelated_edits() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let a = p.add_instruction(Identity, &[x]).unwrap();
    let b = p.add_instruction(Identity, &[a]).unwrap();
    let inserted = p.insert_instruction(b, Identity, &[a]).unwrap();
    p.remove_instruction(p.last().unwrap()).unwrap();
    // `a` and `inserted` survive insertion and removal of other nodes.
    assert_eq!(p.instruction(a).unwrap().name(), "identity");
    assert_eq!(p.instruction(inserted).unwrap().inputs(), &[a]);
    p.validate().unwrap();
}

#[test]
fn programs_compare_structurally() {
    let build = |perm: Vec<usize>| {
        let mut p = Program::new();
        let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
        p.add_instruction(Transpose::new(perm), &[x]).unwrap();
        p
    };
    let a = build(vec![1, 0]);
    let b = build(vec![1, 0]);
    let c = build(vec![0, 1]);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a, a.clone());
}

#[test]
fn display_prints_operators_with_fields() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let text = p.to_string();
    assert!(text.contains("transpose[perm=[1, 0]](%0)"), "got:\n{text}");
    assert!(text.contains("f32[3,2]{1,3}"), "got:\n{text}");
}

#[test]
fn eval_binds_parameters_and_runs_context_free_ops() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([4usize; 1])).unwrap();
    p.add_instruction(Sin, &[x]).unwrap();
    let lit = Literal::from_f32([4], &[0.0, 1.0, 2.0, 3.0]);
    let mut params = HashMap::new();
    params.insert("x".to_string(), Argument::from_literal(&lit));
    let result = p.eval(&params).unwrap();
    let values = result.to_literal().to_f32();
    for (v, e) in values.iter().zip([0.0f32, 1.0, 2.0, 3.0]) {
        assert!((v - e.sin()).abs() < 1e-6);
    }
}

#[test]
fn eval_reports_missing_parameters() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([4usize; 1])).unwrap();
    p.add_instruction(Identity, &[x]).unwrap();
    let err = p.eval(&HashMap::new());
    assert!(matches!(err, Err(Error::Runtime { .. })));
}

#[test]
fn eval_passes_literals_through() {
    let mut p = Program::new();
    let lit = Literal::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0]);
    let l = p.add_literal(lit.clone()).unwrap();
    p.add_instruction(PassOp, &[l]).unwrap();
    let result = p.eval(&HashMap::new()).unwrap();
    assert_eq!(result.to_literal(), lit);
}
