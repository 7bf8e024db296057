//! Interactive debugger for an RV32IM emulator: expressions, watchpoints and
//! a small gdb-like command language.

pub mod sdb;

pub use sdb::{Debugger, SdbError};

#[cfg(test)]
mod e2e_test;
