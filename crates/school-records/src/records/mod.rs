//! Teachers, students, courses and enrollments, with the referential
//! integrity rules that keep them consistent.
//!
//! Managers are stateless: every operation re-reads what it needs from the
//! shared [`SchoolStore`] and issues at most one write. Uniqueness is checked
//! up front and backed by the store's unique indexes, so a racing writer ends
//! in a `Conflict` rather than a duplicate row.

pub mod courses;
pub mod domain;
pub mod enrollments;
pub mod error;
pub mod memory;
pub mod router;
pub mod seed;
pub mod sqlite;
pub mod store;
pub mod students;
pub mod teachers;
pub mod validation;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use courses::CourseManager;
pub use domain::{
    Course, CourseDetail, CourseId, CourseWithTeacher, EmailPolicy, Enrollment, EnrollmentId,
    EnrollmentView, Grade, NewCourse, NewEnrollment, NewStudent, NewTeacher, Student, StudentId,
    StudentWithEnrollments, Teacher, TeacherId, TeacherWithCourses,
};
pub use enrollments::EnrollmentManager;
pub use error::RecordError;
pub use memory::MemoryStore;
pub use router::records_router;
pub use seed::{seed_if_empty, SeedSummary};
pub use sqlite::SqliteStore;
pub use store::{SchoolStore, StorageError, Table, ENROLLMENT_PAIR_INDEX, TEACHER_EMAIL_INDEX};
pub use students::StudentManager;
pub use teachers::TeacherManager;
pub use validation::{FieldError, Validate, ValidationErrors};

/// The four managers wired to one store.
pub struct SchoolRecords<S> {
    pub teachers: TeacherManager<S>,
    pub students: StudentManager<S>,
    pub courses: CourseManager<S>,
    pub enrollments: EnrollmentManager<S>,
}

impl<S> SchoolRecords<S>
where
    S: SchoolStore + 'static,
{
    pub fn new(store: Arc<S>, email_policy: EmailPolicy) -> Self {
        Self {
            teachers: TeacherManager::new(store.clone(), email_policy),
            students: StudentManager::new(store.clone()),
            courses: CourseManager::new(store.clone()),
            enrollments: EnrollmentManager::new(store),
        }
    }
}
