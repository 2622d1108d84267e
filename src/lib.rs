//! Route Simulation Library
//!
//! A microscopic road traffic simulator that runs headless and is driven by
//! an external clock.

pub mod simulation;
