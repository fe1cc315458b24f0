use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{Course, EmailPolicy, NewTeacher, Teacher, TeacherId, TeacherWithCourses};
use super::error::RecordError;
use super::store::{CourseFilter, SchoolStore, StorageError, TeacherFilter, TEACHER_EMAIL_INDEX};

const DUPLICATE_EMAIL: &str = "A teacher with this email already exists.";
const EMAIL_NOT_UNIQUE: &str = "Email must be unique.";
const HAS_COURSES: &str = "Cannot delete a teacher who still has courses assigned.";

/// Enforces the teacher contract: unique email, and no delete while courses
/// still reference the teacher.
pub struct TeacherManager<S> {
    store: Arc<S>,
    email_policy: EmailPolicy,
}

impl<S> TeacherManager<S>
where
    S: SchoolStore + 'static,
{
    pub fn new(store: Arc<S>, email_policy: EmailPolicy) -> Self {
        Self {
            store,
            email_policy,
        }
    }

    pub fn list(&self) -> Result<Vec<TeacherWithCourses>, RecordError> {
        let teachers = self.store.teachers().find_all()?;
        let mut courses_by_teacher: BTreeMap<TeacherId, Vec<Course>> = BTreeMap::new();
        for course in self.store.courses().find_all()? {
            courses_by_teacher
                .entry(course.teacher_id)
                .or_default()
                .push(course);
        }
        debug!(count = teachers.len(), "listed teachers");

        Ok(teachers
            .into_iter()
            .map(|teacher| TeacherWithCourses {
                courses: courses_by_teacher.remove(&teacher.id).unwrap_or_default(),
                teacher,
            })
            .collect())
    }

    pub fn get(&self, id: TeacherId) -> Result<TeacherWithCourses, RecordError> {
        let teacher = self.require(id)?;
        let courses = self.store.courses().find_where(&CourseFilter::Teacher(id))?;
        Ok(TeacherWithCourses { teacher, courses })
    }

    pub fn create(&self, draft: NewTeacher) -> Result<Teacher, RecordError> {
        if self.email_taken(&draft.email, None)? {
            warn!(email = %draft.email, "teacher create rejected: email in use");
            return Err(RecordError::Conflict(DUPLICATE_EMAIL.to_string()));
        }

        let teacher = self
            .store
            .teachers()
            .insert(draft)
            .map_err(|err| translate_email_conflict(err, DUPLICATE_EMAIL))?;
        info!(teacher_id = %teacher.id, "teacher created");
        Ok(teacher)
    }

    /// Replace full name, email and hire date of an existing teacher.
    pub fn update(&self, id: TeacherId, teacher: Teacher) -> Result<Teacher, RecordError> {
        if teacher.id != id {
            return Err(RecordError::id_mismatch());
        }
        let mut existing = self.require(id)?;

        if self.email_taken(&teacher.email, Some(id))? {
            warn!(teacher_id = %id, email = %teacher.email, "teacher update rejected: email in use");
            return Err(RecordError::Conflict(EMAIL_NOT_UNIQUE.to_string()));
        }

        existing.full_name = teacher.full_name;
        existing.email = teacher.email;
        existing.hire_date = teacher.hire_date;

        match self.store.teachers().update(&existing) {
            Ok(()) => {
                info!(teacher_id = %id, "teacher updated");
                Ok(existing)
            }
            Err(StorageError::MissingRecord { .. }) => Err(RecordError::not_found("Teacher", id)),
            Err(err) => Err(translate_email_conflict(err, EMAIL_NOT_UNIQUE)),
        }
    }

    pub fn delete(&self, id: TeacherId) -> Result<(), RecordError> {
        self.require(id)?;
        if self.store.courses().exists(&CourseFilter::Teacher(id))? {
            warn!(teacher_id = %id, "teacher delete blocked by assigned courses");
            return Err(RecordError::BadRequest(HAS_COURSES.to_string()));
        }

        match self.store.teachers().delete(id) {
            Ok(()) => {
                info!(teacher_id = %id, "teacher deleted");
                Ok(())
            }
            Err(StorageError::MissingRecord { .. }) => Err(RecordError::not_found("Teacher", id)),
            Err(err) => Err(err.into()),
        }
    }

    fn require(&self, id: TeacherId) -> Result<Teacher, RecordError> {
        self.store
            .teachers()
            .find_by_id(id)?
            .ok_or_else(|| RecordError::not_found("Teacher", id))
    }

    fn email_taken(&self, email: &str, excluding: Option<TeacherId>) -> Result<bool, RecordError> {
        let filter = TeacherFilter::Email {
            address: email.to_string(),
            policy: self.email_policy,
            excluding,
        };
        Ok(self.store.teachers().exists(&filter)?)
    }
}

/// A unique-index hit on the email column means another writer got there
/// between our pre-check and the write.
fn translate_email_conflict(err: StorageError, message: &str) -> RecordError {
    if err.violates(TEACHER_EMAIL_INDEX) {
        warn!("teacher email conflict reported by store");
        RecordError::Conflict(message.to_string())
    } else {
        RecordError::Storage(err)
    }
}
