//! Reusable numerical building blocks.

pub mod spline;
pub mod stats;
