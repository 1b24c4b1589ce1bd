//! Database models split into separate files.
//! This module re-exports individual model modules so call sites can
//! `use crate::db::models::*;`.

pub mod dlq;
pub mod notification;

pub use self::dlq::*;
pub use self::notification::*;
