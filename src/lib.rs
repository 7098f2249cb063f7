//! Bit-packed Conway's Game of Life engine (B3/S23) over a fixed grid
//! with hard dead borders.

pub mod wordlife;

pub use wordlife::{ConfigError, KernelBackend, WordLife, WordLifeConfig};
