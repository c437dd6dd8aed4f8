//! um32 — an interpreter for the UM-32 architecture (the Universal
//! Machine defined by the 2006 ICFP programming contest).
//!
//! The crate is split the way the spin cycle is split: a platter codec,
//! an array heap, machine state, and the execution core that ties them
//! together. The CLI frontend, file-reading wrapper, and console I/O
//! are deliberately thin and live in `main.rs`.

pub mod error;
pub mod heap;
pub mod io;
pub mod machine;
pub mod platter;

pub use error::UmError;
pub use machine::{HaltReason, Machine, Spin};
