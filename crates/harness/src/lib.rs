//! Test fixtures shared by the cross-crate scenario suites.

pub mod fixture;
pub mod shared;

pub use fixture::{check_invariants, Fixture};
pub use shared::SharedDatabase;
