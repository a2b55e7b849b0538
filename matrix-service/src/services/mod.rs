// Services Module
// High-level entry points combining parsing, expansion, and execution

pub mod matrix_service;

pub use matrix_service::{JobSelection, MatrixService};
