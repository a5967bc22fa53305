//! In-memory graph algorithms behind effective membership.
//!
//! Hierarchy edges are `(parent, member)` pairs: every effective member of
//! `member` is also an effective member of `parent`. Nothing here performs
//! I/O; callers load rows once per transaction and hand them over.

mod arena;
mod closure;
mod cycle;
mod diff;

pub use arena::{Direction, Graph};
pub use closure::{closure, groups_of, members_of, Closure, Effective};
pub use cycle::{cycle_path, would_create_cycle};
pub use diff::{diff, difference, Changes};
