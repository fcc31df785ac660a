//! Domain layer - Object model and port definitions
//!
//! This module defines the CIM value types the client passes around and the
//! port trait the WBEM transport implements, following hexagonal
//! architecture principles.

pub mod model;
pub mod ports;

pub use model::*;
pub use ports::*;
