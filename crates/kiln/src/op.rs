//! Value-semantic polymorphic operators.
//!
//! Concrete operators implement [`Operator`]; instructions hold them through
//! the [`Operation`] handle, which shares the underlying value until a
//! mutation (only `finalize`) forces a private copy. Equality, printing, and
//! hashing all derive from the single `reflect` declaration so the three can
//! never drift apart.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::argument::Argument;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::shape::Shape;

/// A reflected operator field, the unit of structural equality and printing.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Str(String),
    Ints(Vec<i64>),
    Shape(Shape),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "{v}"),
            FieldValue::Ints(v) => write!(f, "{v:?}"),
            FieldValue::Shape(v) => write!(f, "{v}"),
        }
    }
}

impl From<&[i64]> for FieldValue {
    fn from(v: &[i64]) -> Self {
        FieldValue::Ints(v.to_vec())
    }
}

impl From<&[usize]> for FieldValue {
    fn from(v: &[usize]) -> Self {
        FieldValue::Ints(v.iter().map(|&x| x as i64).collect())
    }
}

/// The capability set every concrete operator exposes.
///
/// Only `name` and `compute_shape` are required. The defaults encode the
/// dispatch contract: `compute_with_context` falls back to the context-free
/// `compute`, and `compute` fails with `NotComputable`, so a call site always
/// resolves to the most specific overload the operator actually has. An
/// operator that implements the context-free `compute` must also override
/// `is_context_free` to return true; one that implements `finalize` must
/// override `has_finalize`.
pub trait Operator: Any + Send + Sync + fmt::Debug + DynOperator {
    /// Unique name identifying the operator.
    fn name(&self) -> &str;

    /// Infers the output shape, or fails with `Error::InvalidShape`.
    fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape>;

    /// Visits each configurable field in declaration order.
    fn reflect(&self, _visit: &mut dyn FnMut(&'static str, FieldValue)) {}

    /// Which input buffer the output aliases, if any.
    fn output_alias(&self, _inputs: &[Shape]) -> Option<usize> {
        None
    }

    /// Context-free compute.
    fn compute(&self, _output: &Shape, _args: &[Argument]) -> Result<Argument> {
        Err(Error::NotComputable {
            op: self.name().to_string(),
            needs_context: self.needs_context(),
        })
    }

    /// Context-taking compute; falls back to the context-free overload.
    fn compute_with_context(
        &self,
        _ctx: &mut Context,
        output: &Shape,
        args: &[Argument],
    ) -> Result<Argument> {
        self.compute(output, args)
    }

    /// True when the operator computes without a `Context`.
    fn is_context_free(&self) -> bool {
        false
    }

    /// True when the operator only has a context-taking compute, so the
    /// context-free entry point should report the missing context.
    fn needs_context(&self) -> bool {
        false
    }

    /// True when the operator has a `finalize` step.
    fn has_finalize(&self) -> bool {
        false
    }

    /// One-time pre-execution hook, run by `compile` after all passes.
    fn finalize(&mut self, _ctx: &mut Context, _output: &Shape, _inputs: &[Shape]) -> Result<()> {
        Ok(())
    }
}

/// Object-safe clone support for `dyn Operator`.
pub trait DynOperator {
    fn clone_dyn(&self) -> Box<dyn Operator>;
}

impl<T: Operator + Clone> DynOperator for T {
    fn clone_dyn(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Shared, copy-on-write handle to a concrete operator value.
///
/// Cloning an `Operation` (and therefore a `Program`) is cheap; the only
/// mutating entry point (`finalize`) replaces the handle with a private deep
/// copy first, so no mutation is ever observable through another handle.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<dyn Operator>,
}

impl Operation {
    pub fn new<T: Operator>(op: T) -> Self {
        Operation {
            inner: Arc::new(op),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn compute_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        self.inner.compute_shape(inputs)
    }

    pub fn output_alias(&self, inputs: &[Shape]) -> Option<usize> {
        self.inner.output_alias(inputs)
    }

    pub fn is_context_free(&self) -> bool {
        self.inner.is_context_free()
    }

    pub fn has_finalize(&self) -> bool {
        self.inner.has_finalize()
    }

    /// Context-free compute; fails with `NotComputable` when the operator
    /// only has a context-taking overload.
    pub fn compute(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        self.inner.compute(output, args)
    }

    /// Context-taking compute, resolving to the context-free overload when
    /// that is all the operator provides.
    pub fn compute_with_context(
        &self,
        ctx: &mut Context,
        output: &Shape,
        args: &[Argument],
    ) -> Result<Argument> {
        self.inner.compute_with_context(ctx, output, args)
    }

    /// Runs the operator's finalize hook on a private copy of the value.
    pub fn finalize(&mut self, ctx: &mut Context, output: &Shape, inputs: &[Shape]) -> Result<()> {
        if !self.inner.has_finalize() {
            return Ok(());
        }
        let mut owned = self.inner.clone_dyn();
        owned.finalize(ctx, output, inputs)?;
        self.inner = Arc::from(owned);
        Ok(())
    }

    /// Collects the reflected fields in declaration order.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let mut fields = Vec::new();
        self.inner.reflect(&mut |name, value| fields.push((name, value)));
        fields
    }

    /// Structural cast to the concrete operator type.
    pub fn downcast_ref<T: Operator>(&self) -> Option<&T> {
        (self.inner.as_ref() as &dyn Any).downcast_ref::<T>()
    }

    /// Structural cast that reports `Error::BadCast` on mismatch.
    pub fn downcast<T: Operator>(&self) -> Result<&T> {
        self.downcast_ref::<T>().ok_or(Error::BadCast {
            expected: std::any::type_name::<T>(),
        })
    }

    /// True when both handles share the same underlying value.
    pub fn is_shared(&self, other: &Operation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Operation) -> bool {
        self.name() == other.name() && self.fields() == other.fields()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        let fields = self.fields();
        if fields.is_empty() {
            return Ok(());
        }
        write!(f, "[")?;
        for (i, (name, value)) in fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<T: Operator> From<T> for Operation {
    fn from(op: T) -> Self {
        Operation::new(op)
    }
}
