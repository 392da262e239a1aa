//! Row structs for the forgewatch tables.
//!
//! Each submodule contains a `FromRow` struct matching the table row and a
//! conversion into the corresponding `forgewatch-core` domain type.

pub mod audit;
pub mod incident;
pub mod security;
