//! The `utils` module provides the shared error types and logging setup used
//! across `devicelink`.

pub mod error;
pub mod logging;
