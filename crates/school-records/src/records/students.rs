use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{
    Course, CourseId, CourseWithTeacher, Enrollment, EnrollmentView, NewStudent, Student,
    StudentId, StudentWithEnrollments,
};
use super::error::RecordError;
use super::store::{EnrollmentFilter, SchoolStore, StorageError};

const HAS_ENROLLMENTS: &str =
    "Cannot delete a student who still has enrollments. Please remove enrollments first.";

pub struct StudentManager<S> {
    store: Arc<S>,
}

impl<S> StudentManager<S>
where
    S: SchoolStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<StudentWithEnrollments>, RecordError> {
        let students = self.store.students().find_all()?;
        let courses = self.courses_by_id()?;
        let mut enrollments_by_student: BTreeMap<StudentId, Vec<Enrollment>> = BTreeMap::new();
        for enrollment in self.store.enrollments().find_all()? {
            enrollments_by_student
                .entry(enrollment.student_id)
                .or_default()
                .push(enrollment);
        }
        debug!(count = students.len(), "listed students");

        Ok(students
            .into_iter()
            .map(|student| {
                let enrollments = enrollments_by_student
                    .remove(&student.id)
                    .unwrap_or_default();
                with_courses(student, enrollments, &courses)
            })
            .collect())
    }

    pub fn get(&self, id: StudentId) -> Result<StudentWithEnrollments, RecordError> {
        let student = self.require(id)?;
        let enrollments = self
            .store
            .enrollments()
            .find_where(&EnrollmentFilter::Student(id))?;
        let courses = self.courses_by_id()?;
        Ok(with_courses(student, enrollments, &courses))
    }

    pub fn create(&self, draft: NewStudent) -> Result<Student, RecordError> {
        let student = self.store.students().insert(draft)?;
        info!(student_id = %student.id, "student created");
        Ok(student)
    }

    /// Replace full name, birth date and active flag of an existing student.
    pub fn update(&self, id: StudentId, student: Student) -> Result<Student, RecordError> {
        if student.id != id {
            return Err(RecordError::id_mismatch());
        }
        let mut existing = self.require(id)?;
        existing.full_name = student.full_name;
        existing.birth_date = student.birth_date;
        existing.is_active = student.is_active;

        match self.store.students().update(&existing) {
            Ok(()) => {
                info!(student_id = %id, "student updated");
                Ok(existing)
            }
            Err(StorageError::MissingRecord { .. }) => Err(RecordError::not_found("Student", id)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn delete(&self, id: StudentId) -> Result<(), RecordError> {
        self.require(id)?;
        if self
            .store
            .enrollments()
            .exists(&EnrollmentFilter::Student(id))?
        {
            warn!(student_id = %id, "student delete blocked by enrollments");
            return Err(RecordError::BadRequest(HAS_ENROLLMENTS.to_string()));
        }

        match self.store.students().delete(id) {
            Ok(()) => {
                info!(student_id = %id, "student deleted");
                Ok(())
            }
            Err(StorageError::MissingRecord { .. }) => Err(RecordError::not_found("Student", id)),
            Err(err) => Err(err.into()),
        }
    }

    fn require(&self, id: StudentId) -> Result<Student, RecordError> {
        self.store
            .students()
            .find_by_id(id)?
            .ok_or_else(|| RecordError::not_found("Student", id))
    }

    fn courses_by_id(&self) -> Result<BTreeMap<CourseId, Course>, RecordError> {
        Ok(self
            .store
            .courses()
            .find_all()?
            .into_iter()
            .map(|course| (course.id, course))
            .collect())
    }
}

fn with_courses(
    student: Student,
    enrollments: Vec<Enrollment>,
    courses: &BTreeMap<CourseId, Course>,
) -> StudentWithEnrollments {
    let enrollments = enrollments
        .into_iter()
        .map(|enrollment| EnrollmentView {
            course: courses
                .get(&enrollment.course_id)
                .cloned()
                .map(|course| CourseWithTeacher {
                    course,
                    teacher: None,
                }),
            student: None,
            enrollment,
        })
        .collect();
    StudentWithEnrollments {
        student,
        enrollments,
    }
}
