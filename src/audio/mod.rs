//! Audio file input.

pub mod wav;
