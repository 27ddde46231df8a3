//! # Conversion
//!
//! Invokes the external converter on a working file and captures what it reports.

pub mod error;
pub mod outcome;
pub mod runner;

pub use error::ConversionError;
pub use outcome::{ConversionOutcome, ConvertedUnit};
pub use runner::{ConversionProcess, ConversionRunner};
