mod common;

use kiln::error::Result;
use kiln::matcher::{
    all_of, all_of_inputs, any, any_of, any_of_outputs, arg, find_matches, name, none_of,
    same_input_shapes, same_shape, skip_output, standard_shape, transpose_shape, Matcher,
    MatcherResult, Rewrite,
};
use kiln::ops::{Concat, Contiguous, Identity, Transpose};
use kiln::program::Program;

use common::f32_shape;

fn transpose_pair() -> (Program, kiln::InsRef, kiln::InsRef, kiln::InsRef) {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let t = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let c = p.add_instruction(Contiguous, &[t]).unwrap();
    (p, x, t, c)
}

#[test]
fn name_matches_membership() {
    let (p, x, t, _) = transpose_pair();
    assert!(name("transpose").matches(&p, t).is_some());
    assert!(name("transpose").matches(&p, x).is_none());
    assert!(name(["transpose", "contiguous"]).matches(&p, t).is_some());
}

#[test]
fn arg_descends_to_inputs() {
    let (p, x, t, c) = transpose_pair();
    assert_eq!(arg(0).matches(&p, t), Some(x));
    assert_eq!(arg(0).matches(&p, c), Some(t));
    assert!(arg(1).matches(&p, t).is_none());
    assert_eq!(arg(0).then(name("transpose")).matches(&p, c), Some(t));
}

#[test]
fn shape_predicates() {
    let (p, x, t, c) = transpose_pair();
    assert!(standard_shape().matches(&p, x).is_some());
    assert!(standard_shape().matches(&p, t).is_none());
    assert!(transpose_shape().matches(&p, t).is_some());
    // contiguous restores the standard layout but not the same strides as
    // its input.
    assert!(same_shape(arg(0)).matches(&p, c).is_none());
}

#[test]
fn same_shape_on_an_identity() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let id = p.add_instruction(Identity, &[x]).unwrap();
    assert!(same_shape(arg(0)).matches(&p, id).is_some());
}

#[test]
fn same_input_shapes_requires_agreement() {
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let y = p.add_parameter("y", f32_shape([2, 3])).unwrap();
    let z = p.add_parameter("z", f32_shape([4, 3])).unwrap();
    let both = p.add_instruction(Concat { axis: 0 }, &[x, y]).unwrap();
    let mixed = p.add_instruction(Concat { axis: 0 }, &[y, z]).unwrap();
    assert!(same_input_shapes().matches(&p, both).is_some());
    assert!(same_input_shapes().matches(&p, mixed).is_none());
}

#[test]
fn boolean_combinators() {
    let (p, _, t, _) = transpose_pair();
    assert!(any_of([name("concat"), name("transpose")]).matches(&p, t).is_some());
    assert!(all_of([name("transpose"), transpose_shape()]).matches(&p, t).is_some());
    assert!(all_of([name("transpose"), standard_shape()]).matches(&p, t).is_none());
    assert!(name("transpose").and(transpose_shape()).matches(&p, t).is_some());
    assert!(none_of(name("concat")).matches(&p, t).is_some());
    assert!(none_of(any()).matches(&p, t).is_none());
}

#[test]
fn output_and_input_walkers() {
    let (p, x, t, c) = transpose_pair();
    assert!(any_of_outputs(name("transpose")).matches(&p, x).is_some());
    assert!(any_of_outputs(name("concat")).matches(&p, x).is_none());
    assert!(all_of_inputs(standard_shape()).matches(&p, t).is_some());
    assert!(all_of_inputs(standard_shape()).matches(&p, c).is_none());
}

#[test]
fn skip_output_walks_through_the_skipped_run() {
    // x -> transpose -> contiguous -> contiguous -> transpose
    let mut p = Program::new();
    let x = p.add_parameter("x", f32_shape([2, 3])).unwrap();
    let t1 = p.add_instruction(Transpose::new([1, 0]), &[x]).unwrap();
    let c1 = p.add_instruction(Contiguous, &[t1]).unwrap();
    let c2 = p.add_instruction(Contiguous, &[c1]).unwrap();
    let t2 = p.add_instruction(Transpose::new([1, 0]), &[c2]).unwrap();

    let downstream_transpose = skip_output(name("contiguous"), name("transpose"));
    assert_eq!(downstream_transpose.matches(&p, t1), Some(t2));
    // From the last transpose there is nothing further down.
    assert!(downstream_transpose.matches(&p, t2).is_none());
    // A non-skippable user stops the walk.
    let mut q = Program::new();
    let qx = q.add_parameter("x", f32_shape([2, 3])).unwrap();
    let qt = q.add_instruction(Transpose::new([1, 0]), &[qx]).unwrap();
    let qi = q.add_instruction(Identity, &[qt]).unwrap();
    q.add_instruction(Transpose::new([1, 0]), &[qi]).unwrap();
    assert!(downstream_transpose.matches(&q, qt).is_none());
}

struct CountingRewrite {
    matcher: Matcher,
    hits: std::cell::Cell<usize>,
}

impl Rewrite for CountingRewrite {
    fn matcher(&self) -> Matcher {
        self.matcher.clone()
    }

    fn apply(&self, _prog: &mut Program, _m: MatcherResult) -> Result<()> {
        self.hits.set(self.hits.get() + 1);
        Ok(())
    }
}

#[test]
fn find_matches_applies_only_the_first_match() {
    let (mut p, _, t, _) = transpose_pair();
    let first = CountingRewrite {
        matcher: name("transpose"),
        hits: std::cell::Cell::new(0),
    };
    let second = CountingRewrite {
        matcher: any(),
        hits: std::cell::Cell::new(0),
    };
    find_matches(&mut p, t, &[&first, &second]).unwrap();
    assert_eq!(first.hits.get(), 1);
    assert_eq!(second.hits.get(), 0);

    let miss = CountingRewrite {
        matcher: name("concat"),
        hits: std::cell::Cell::new(0),
    };
    let fallback = CountingRewrite {
        matcher: any(),
        hits: std::cell::Cell::new(0),
    };
    find_matches(&mut p, t, &[&miss, &fallback]).unwrap();
    assert_eq!(miss.hits.get(), 0);
    assert_eq!(fallback.hits.get(), 1);
}
