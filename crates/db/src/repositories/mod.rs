//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod job_application_repo;
pub mod resume_repo;

pub use job_application_repo::JobApplicationRepo;
pub use resume_repo::ResumeRepo;
