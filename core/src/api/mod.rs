//! Message surface used by hosts embedding the engine.
//!
//! Versioned modules (currently `v1`) keep the payload contract stable while
//! the engine evolves.

pub mod v1;
