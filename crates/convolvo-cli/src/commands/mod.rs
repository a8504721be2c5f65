//! CLI command implementations.

pub mod bench;
pub mod common;
pub mod plan;
pub mod render;
pub mod verify;
