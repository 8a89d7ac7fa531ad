//! Shared types

pub mod error;

pub use error::{ProblemDetails, ProblemKind, Result, VerdictError};
