//! Declarative graph patterns for rewrite passes.
//!
//! A [`Matcher`] tests one instruction and either fails or yields an
//! instruction (usually the anchor, sometimes a neighbor it descended to).
//! Combinators compose matchers; direction is explicit in the names
//! (`arg`/`all_of_inputs` walk inputs, `any_of_outputs`/`skip_output` walk
//! users). Failing to match is never an error.

use std::collections::HashSet;
use std::rc::Rc;

use crate::error::Result;
use crate::instruction::InsRef;
use crate::program::Program;

/// A composable predicate over one instruction in a program.
#[derive(Clone)]
pub struct Matcher {
    f: Rc<dyn Fn(&Program, InsRef) -> Option<InsRef>>,
}

impl Matcher {
    fn from_fn(f: impl Fn(&Program, InsRef) -> Option<InsRef> + 'static) -> Self {
        Matcher { f: Rc::new(f) }
    }

    /// Applies the matcher at `ins`.
    pub fn matches(&self, prog: &Program, ins: InsRef) -> Option<InsRef> {
        (self.f)(prog, ins)
    }

    /// Both matchers must hold at the same anchor.
    pub fn and(self, other: Matcher) -> Matcher {
        Matcher::from_fn(move |prog, ins| {
            self.matches(prog, ins)?;
            other.matches(prog, ins)?;
            Some(ins)
        })
    }

    /// Descends: applies `next` at the instruction this matcher yields.
    pub fn then(self, next: Matcher) -> Matcher {
        Matcher::from_fn(move |prog, ins| {
            let at = self.matches(prog, ins)?;
            next.matches(prog, at)
        })
    }
}

/// Matches every instruction.
pub fn any() -> Matcher {
    Matcher::from_fn(|_, ins| Some(ins))
}

/// Matches when the operator name is in the given set.
pub fn name<N: IntoNames>(names: N) -> Matcher {
    let names = names.into_names();
    Matcher::from_fn(move |prog, ins| {
        let node = prog.instruction(ins)?;
        names.contains(node.name()).then_some(ins)
    })
}

/// Yields input `i` of the anchor.
pub fn arg(i: usize) -> Matcher {
    Matcher::from_fn(move |prog, ins| prog.instruction(ins)?.inputs().get(i).copied())
}

/// Matches when the instruction yielded by `m` shares the anchor's shape.
pub fn same_shape(m: Matcher) -> Matcher {
    Matcher::from_fn(move |prog, ins| {
        let other = m.matches(prog, ins)?;
        (prog.instruction(other)?.shape() == prog.instruction(ins)?.shape()).then_some(ins)
    })
}

/// Matches when all inputs share one shape (at least one input required).
pub fn same_input_shapes() -> Matcher {
    Matcher::from_fn(|prog, ins| {
        let node = prog.instruction(ins)?;
        let mut inputs = node.inputs().iter();
        let first = prog.instruction(*inputs.next()?)?.shape();
        inputs
            .all(|&i| prog.instruction(i).map(|n| n.shape()) == Some(first))
            .then_some(ins)
    })
}

/// Matches when the anchor's shape is standard.
pub fn standard_shape() -> Matcher {
    Matcher::from_fn(|prog, ins| prog.instruction(ins)?.shape().standard().then_some(ins))
}

/// Matches when the anchor's shape is transposed.
pub fn transpose_shape() -> Matcher {
    Matcher::from_fn(|prog, ins| prog.instruction(ins)?.shape().transposed().then_some(ins))
}

/// Matches when any of the alternatives holds at the anchor.
pub fn any_of<const N: usize>(matchers: [Matcher; N]) -> Matcher {
    let matchers = matchers.to_vec();
    Matcher::from_fn(move |prog, ins| {
        matchers
            .iter()
            .any(|m| m.matches(prog, ins).is_some())
            .then_some(ins)
    })
}

/// Matches when every alternative holds at the anchor.
pub fn all_of<const N: usize>(matchers: [Matcher; N]) -> Matcher {
    let matchers = matchers.to_vec();
    Matcher::from_fn(move |prog, ins| {
        matchers
            .iter()
            .all(|m| m.matches(prog, ins).is_some())
            .then_some(ins)
    })
}

/// Matches when the inner matcher fails at the anchor.
pub fn none_of(m: Matcher) -> Matcher {
    Matcher::from_fn(move |prog, ins| m.matches(prog, ins).is_none().then_some(ins))
}

/// Matches when any user of the anchor satisfies the inner matcher.
pub fn any_of_outputs(m: Matcher) -> Matcher {
    Matcher::from_fn(move |prog, ins| {
        prog.instruction(ins)?
            .outputs()
            .iter()
            .any(|&o| m.matches(prog, o).is_some())
            .then_some(ins)
    })
}

/// Matches when every input of the anchor satisfies the inner matcher.
pub fn all_of_inputs(m: Matcher) -> Matcher {
    Matcher::from_fn(move |prog, ins| {
        let node = prog.instruction(ins)?;
        if node.inputs().is_empty() {
            return None;
        }
        node.inputs()
            .iter()
            .all(|&i| m.matches(prog, i).is_some())
            .then_some(ins)
    })
}

/// Walks down through users matching `skip` and matches `inner` on the first
/// user past the skipped run, yielding that user.
pub fn skip_output(skip: Matcher, inner: Matcher) -> Matcher {
    Matcher::from_fn(move |prog, ins| {
        let mut stack: Vec<InsRef> = prog.instruction(ins)?.outputs().to_vec();
        let mut visited: HashSet<InsRef> = HashSet::new();
        while let Some(user) = stack.pop() {
            if !visited.insert(user) {
                continue;
            }
            if inner.matches(prog, user).is_some() {
                return Some(user);
            }
            if skip.matches(prog, user).is_some() {
                if let Some(node) = prog.instruction(user) {
                    stack.extend_from_slice(node.outputs());
                }
            }
        }
        None
    })
}

/// Conversion into the name set accepted by [`name`].
pub trait IntoNames {
    fn into_names(self) -> HashSet<String>;
}

impl IntoNames for &str {
    fn into_names(self) -> HashSet<String> {
        HashSet::from([self.to_string()])
    }
}

impl<const N: usize> IntoNames for [&str; N] {
    fn into_names(self) -> HashSet<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl IntoNames for &HashSet<String> {
    fn into_names(self) -> HashSet<String> {
        self.clone()
    }
}

impl IntoNames for HashSet<String> {
    fn into_names(self) -> HashSet<String> {
        self
    }
}

/// The anchor a successful match was rooted at.
#[derive(Debug, Clone, Copy)]
pub struct MatcherResult {
    pub result: InsRef,
}

/// A matcher paired with the rewrite it drives.
pub trait Rewrite {
    fn matcher(&self) -> Matcher;

    /// Rewrites the program at a match; must leave the program valid.
    fn apply(&self, prog: &mut Program, m: MatcherResult) -> Result<()>;
}

/// Tries each rewrite's matcher at `ins` in order; the first match applies
/// its rewrite and the rest are skipped.
pub fn find_matches(prog: &mut Program, ins: InsRef, rewrites: &[&dyn Rewrite]) -> Result<()> {
    for rewrite in rewrites {
        if !prog.has_instruction(ins) {
            break;
        }
        if rewrite.matcher().matches(prog, ins).is_some() {
            rewrite.apply(prog, MatcherResult { result: ins })?;
            break;
        }
    }
    Ok(())
}
