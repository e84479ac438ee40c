//! Pass and target interfaces driving compilation.

use crate::context::Context;
use crate::error::Result;
use crate::program::Program;

/// A transformation over a program, run in target order by `compile`.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Mutates the program; must leave it satisfying the graph invariants.
    fn apply(&self, prog: &mut Program, ctx: &mut Context) -> Result<()>;
}

/// A compilation target: a name, a context factory, and an ordered pass list.
pub trait Target {
    fn name(&self) -> &str;

    fn get_context(&self) -> Context {
        Context::default()
    }

    fn get_passes(&self, ctx: &mut Context) -> Vec<Box<dyn Pass>>;
}
