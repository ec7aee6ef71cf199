//! Code-indexed message catalogs for pointer errors and warnings.
//!
//! The engine identifies every condition it reports by a numeric code. This
//! module turns those codes into the human readable text the listeners
//! print. Error templates may contain typed placeholders, see
//! [`PointerError`] for how arguments are checked against them.

mod error;
mod warning;

pub use self::{
    error::{ArgKind, ArgumentMismatch, ErrorCode, FormatArg, PointerError, Segment},
    warning::{CorruptionLocation, PointerWarning, WarningCode},
};
