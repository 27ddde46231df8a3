#![allow(dead_code)] // Each test binary uses a different subset of helpers

pub mod builders;
pub mod strategies;

pub use builders::*;
