//! Built-in operators.
//!
//! Internal `@`-prefixed operators are created only through `Program`
//! methods; passes match operators by name and never see the `@` namespace.

mod concat;
mod dot;
mod internal;
mod memory;
mod stream;
mod unary;
mod view;

pub use concat::Concat;
pub use dot::Dot;
pub use internal::{LiteralOp, Outline, Param};
pub use memory::{Allocate, Load};
pub use stream::SetStream;
pub use unary::Sin;
pub use view::{Contiguous, Identity, Reshape, Slice, Squeeze, Transpose, Unsqueeze};
