//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are inserted, a create DTO.

pub mod job_application;
pub mod resume;
pub mod status;
