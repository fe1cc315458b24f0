//! Record keeping for a school: teachers, students, courses, and enrollments.
//!
//! The `records` module holds the referential-integrity core (one manager per
//! entity kind over a shared storage interface) together with the storage
//! backends and the HTTP router that front it. `config`, `telemetry`, and
//! `error` carry the process-level plumbing shared with the API service.

pub mod config;
pub mod error;
pub mod records;
pub mod telemetry;
