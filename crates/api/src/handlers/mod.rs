//! Request handlers.
//!
//! Each submodule provides async handler functions for one resource and maps
//! domain errors via [`AppError`](crate::error::AppError).

pub mod frames;
