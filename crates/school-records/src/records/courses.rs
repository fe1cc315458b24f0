use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{
    Course, CourseDetail, CourseId, Enrollment, EnrollmentView, NewCourse, Teacher, TeacherId,
};
use super::error::RecordError;
use super::store::{EnrollmentFilter, SchoolStore, StorageError, TeacherFilter};

const HAS_ENROLLMENTS: &str =
    "Cannot delete a course that still has enrollments. Please remove enrollments first.";

/// Enforces the course contract: every course points at an existing teacher
/// and cannot be removed while students are enrolled in it.
pub struct CourseManager<S> {
    store: Arc<S>,
}

impl<S> CourseManager<S>
where
    S: SchoolStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every course with its teacher and bare enrollments.
    pub fn list(&self) -> Result<Vec<CourseDetail>, RecordError> {
        let courses = self.store.courses().find_all()?;
        let teachers: BTreeMap<TeacherId, Teacher> = self
            .store
            .teachers()
            .find_all()?
            .into_iter()
            .map(|teacher| (teacher.id, teacher))
            .collect();
        let mut enrollments_by_course: BTreeMap<CourseId, Vec<Enrollment>> = BTreeMap::new();
        for enrollment in self.store.enrollments().find_all()? {
            enrollments_by_course
                .entry(enrollment.course_id)
                .or_default()
                .push(enrollment);
        }
        debug!(count = courses.len(), "listed courses");

        Ok(courses
            .into_iter()
            .map(|course| CourseDetail {
                teacher: teachers.get(&course.teacher_id).cloned(),
                enrollments: enrollments_by_course
                    .remove(&course.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(EnrollmentView::bare)
                    .collect(),
                course,
            })
            .collect())
    }

    /// One course with its teacher and enrollments, each enrollment carrying its student.
    pub fn get(&self, id: CourseId) -> Result<CourseDetail, RecordError> {
        let course = self.require(id)?;
        let teacher = self.store.teachers().find_by_id(course.teacher_id)?;
        let enrollments = self
            .store
            .enrollments()
            .find_where(&EnrollmentFilter::Course(id))?;

        let mut students = BTreeMap::new();
        for student_id in enrollments.iter().map(|enrollment| enrollment.student_id) {
            if let Entry::Vacant(slot) = students.entry(student_id) {
                slot.insert(self.store.students().find_by_id(student_id)?);
            }
        }

        let enrollments = enrollments
            .into_iter()
            .map(|enrollment| EnrollmentView {
                student: students.get(&enrollment.student_id).cloned().flatten(),
                course: None,
                enrollment,
            })
            .collect();

        Ok(CourseDetail {
            course,
            teacher,
            enrollments,
        })
    }

    pub fn create(&self, draft: NewCourse) -> Result<Course, RecordError> {
        self.require_teacher(draft.teacher_id)?;
        let course = self.store.courses().insert(draft)?;
        info!(course_id = %course.id, teacher_id = %course.teacher_id, "course created");
        Ok(course)
    }

    /// Replace title, description, start date and teacher of an existing course.
    pub fn update(&self, id: CourseId, course: Course) -> Result<Course, RecordError> {
        if course.id != id {
            return Err(RecordError::id_mismatch());
        }
        let mut existing = self.require(id)?;
        self.require_teacher(course.teacher_id)?;

        existing.title = course.title;
        existing.description = course.description;
        existing.start_date = course.start_date;
        existing.teacher_id = course.teacher_id;

        match self.store.courses().update(&existing) {
            Ok(()) => {
                info!(course_id = %id, teacher_id = %existing.teacher_id, "course updated");
                Ok(existing)
            }
            Err(StorageError::MissingRecord { .. }) => Err(RecordError::not_found("Course", id)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn delete(&self, id: CourseId) -> Result<(), RecordError> {
        self.require(id)?;
        if self
            .store
            .enrollments()
            .exists(&EnrollmentFilter::Course(id))?
        {
            warn!(course_id = %id, "course delete blocked by enrollments");
            return Err(RecordError::BadRequest(HAS_ENROLLMENTS.to_string()));
        }

        match self.store.courses().delete(id) {
            Ok(()) => {
                info!(course_id = %id, "course deleted");
                Ok(())
            }
            Err(StorageError::MissingRecord { .. }) => Err(RecordError::not_found("Course", id)),
            Err(err) => Err(err.into()),
        }
    }

    fn require(&self, id: CourseId) -> Result<Course, RecordError> {
        self.store
            .courses()
            .find_by_id(id)?
            .ok_or_else(|| RecordError::not_found("Course", id))
    }

    fn require_teacher(&self, teacher_id: TeacherId) -> Result<(), RecordError> {
        if self
            .store
            .teachers()
            .exists(&TeacherFilter::Id(teacher_id))?
        {
            Ok(())
        } else {
            warn!(teacher_id = %teacher_id, "course references unknown teacher");
            Err(RecordError::missing_reference("Teacher", teacher_id))
        }
    }
}
