use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{
    Course, CourseId, CourseWithTeacher, Enrollment, EnrollmentId, EnrollmentView, NewEnrollment,
    Student, StudentId, Teacher, TeacherId,
};
use super::error::RecordError;
use super::store::{
    CourseFilter, EnrollmentFilter, SchoolStore, StorageError, StudentFilter,
    ENROLLMENT_PAIR_INDEX,
};

const ALREADY_ENROLLED: &str = "This student is already enrolled in this course.";

/// Enforces the enrollment contract: both ends exist, and a student appears
/// at most once per course.
pub struct EnrollmentManager<S> {
    store: Arc<S>,
}

impl<S> EnrollmentManager<S>
where
    S: SchoolStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every enrollment with its student and its course (and the course's teacher).
    pub fn list(&self) -> Result<Vec<EnrollmentView>, RecordError> {
        let enrollments = self.store.enrollments().find_all()?;
        let related = self.related()?;
        debug!(count = enrollments.len(), "listed enrollments");
        Ok(enrollments
            .into_iter()
            .map(|enrollment| related.full(enrollment))
            .collect())
    }

    pub fn get(&self, id: EnrollmentId) -> Result<EnrollmentView, RecordError> {
        let enrollment = self.require(id)?;
        let student = self.store.students().find_by_id(enrollment.student_id)?;
        let course = self.course_with_teacher(enrollment.course_id)?;
        Ok(EnrollmentView {
            enrollment,
            student,
            course,
        })
    }

    /// Enrollments of one student, each with its course and teacher.
    pub fn list_by_student(&self, student_id: StudentId) -> Result<Vec<EnrollmentView>, RecordError> {
        if !self
            .store
            .students()
            .exists(&StudentFilter::Id(student_id))?
        {
            return Err(RecordError::not_found("Student", student_id));
        }
        let enrollments = self
            .store
            .enrollments()
            .find_where(&EnrollmentFilter::Student(student_id))?;
        let related = self.related()?;
        debug!(student_id = %student_id, count = enrollments.len(), "listed student enrollments");

        Ok(enrollments
            .into_iter()
            .map(|enrollment| EnrollmentView {
                course: related.course(enrollment.course_id),
                student: None,
                enrollment,
            })
            .collect())
    }

    /// Enrollments of one course, each with its student.
    pub fn list_by_course(&self, course_id: CourseId) -> Result<Vec<EnrollmentView>, RecordError> {
        if !self.store.courses().exists(&CourseFilter::Id(course_id))? {
            return Err(RecordError::not_found("Course", course_id));
        }
        let enrollments = self
            .store
            .enrollments()
            .find_where(&EnrollmentFilter::Course(course_id))?;
        let students: BTreeMap<StudentId, Student> = self
            .store
            .students()
            .find_all()?
            .into_iter()
            .map(|student| (student.id, student))
            .collect();
        debug!(course_id = %course_id, count = enrollments.len(), "listed course enrollments");

        Ok(enrollments
            .into_iter()
            .map(|enrollment| EnrollmentView {
                student: students.get(&enrollment.student_id).cloned(),
                course: None,
                enrollment,
            })
            .collect())
    }

    pub fn create(&self, draft: NewEnrollment) -> Result<Enrollment, RecordError> {
        self.require_student(draft.student_id)?;
        self.require_course(draft.course_id)?;
        if self.pair_taken(draft.student_id, draft.course_id, None)? {
            warn!(
                student_id = %draft.student_id,
                course_id = %draft.course_id,
                "enrollment create rejected: already enrolled"
            );
            return Err(RecordError::Conflict(ALREADY_ENROLLED.to_string()));
        }

        let enrollment = self
            .store
            .enrollments()
            .insert(draft)
            .map_err(translate_pair_conflict)?;
        info!(
            enrollment_id = %enrollment.id,
            student_id = %enrollment.student_id,
            course_id = %enrollment.course_id,
            "enrollment created"
        );
        Ok(enrollment)
    }

    /// Replace student, course, enroll date and grade of an existing enrollment.
    pub fn update(&self, id: EnrollmentId, enrollment: Enrollment) -> Result<Enrollment, RecordError> {
        if enrollment.id != id {
            return Err(RecordError::id_mismatch());
        }
        let mut existing = self.require(id)?;
        self.require_student(enrollment.student_id)?;
        self.require_course(enrollment.course_id)?;

        if existing.pair() != enrollment.pair()
            && self.pair_taken(enrollment.student_id, enrollment.course_id, Some(id))?
        {
            warn!(
                enrollment_id = %id,
                student_id = %enrollment.student_id,
                course_id = %enrollment.course_id,
                "enrollment update rejected: already enrolled"
            );
            return Err(RecordError::Conflict(ALREADY_ENROLLED.to_string()));
        }

        existing.student_id = enrollment.student_id;
        existing.course_id = enrollment.course_id;
        existing.enroll_date = enrollment.enroll_date;
        existing.grade = enrollment.grade;

        match self.store.enrollments().update(&existing) {
            Ok(()) => {
                info!(enrollment_id = %id, grade = %existing.grade, "enrollment updated");
                Ok(existing)
            }
            Err(StorageError::MissingRecord { .. }) => {
                Err(RecordError::not_found("Enrollment", id))
            }
            Err(err) => Err(translate_pair_conflict(err)),
        }
    }

    pub fn delete(&self, id: EnrollmentId) -> Result<(), RecordError> {
        self.require(id)?;
        match self.store.enrollments().delete(id) {
            Ok(()) => {
                info!(enrollment_id = %id, "enrollment deleted");
                Ok(())
            }
            Err(StorageError::MissingRecord { .. }) => {
                Err(RecordError::not_found("Enrollment", id))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn require(&self, id: EnrollmentId) -> Result<Enrollment, RecordError> {
        self.store
            .enrollments()
            .find_by_id(id)?
            .ok_or_else(|| RecordError::not_found("Enrollment", id))
    }

    fn require_student(&self, student_id: StudentId) -> Result<(), RecordError> {
        if self
            .store
            .students()
            .exists(&StudentFilter::Id(student_id))?
        {
            return Ok(());
        }
        warn!(student_id = %student_id, "enrollment references unknown student");
        Err(RecordError::missing_reference("Student", student_id))
    }

    fn require_course(&self, course_id: CourseId) -> Result<(), RecordError> {
        if self.store.courses().exists(&CourseFilter::Id(course_id))? {
            return Ok(());
        }
        warn!(course_id = %course_id, "enrollment references unknown course");
        Err(RecordError::missing_reference("Course", course_id))
    }

    fn pair_taken(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        excluding: Option<EnrollmentId>,
    ) -> Result<bool, RecordError> {
        let filter = EnrollmentFilter::Pair {
            student_id,
            course_id,
            excluding,
        };
        Ok(self.store.enrollments().exists(&filter)?)
    }

    fn course_with_teacher(
        &self,
        course_id: CourseId,
    ) -> Result<Option<CourseWithTeacher>, RecordError> {
        let Some(course) = self.store.courses().find_by_id(course_id)? else {
            return Ok(None);
        };
        let teacher = self.store.teachers().find_by_id(course.teacher_id)?;
        Ok(Some(CourseWithTeacher { course, teacher }))
    }

    fn related(&self) -> Result<Related, RecordError> {
        Ok(Related {
            students: self
                .store
                .students()
                .find_all()?
                .into_iter()
                .map(|student| (student.id, student))
                .collect(),
            courses: self
                .store
                .courses()
                .find_all()?
                .into_iter()
                .map(|course| (course.id, course))
                .collect(),
            teachers: self
                .store
                .teachers()
                .find_all()?
                .into_iter()
                .map(|teacher| (teacher.id, teacher))
                .collect(),
        })
    }
}

/// Lookup tables loaded once per listing.
struct Related {
    students: BTreeMap<StudentId, Student>,
    courses: BTreeMap<CourseId, Course>,
    teachers: BTreeMap<TeacherId, Teacher>,
}

impl Related {
    fn course(&self, course_id: CourseId) -> Option<CourseWithTeacher> {
        self.courses.get(&course_id).map(|course| CourseWithTeacher {
            teacher: self.teachers.get(&course.teacher_id).cloned(),
            course: course.clone(),
        })
    }

    fn full(&self, enrollment: Enrollment) -> EnrollmentView {
        EnrollmentView {
            student: self.students.get(&enrollment.student_id).cloned(),
            course: self.course(enrollment.course_id),
            enrollment,
        }
    }
}

/// The pair index fires when a concurrent writer enrolled the same student
/// between our pre-check and the write.
fn translate_pair_conflict(err: StorageError) -> RecordError {
    if err.violates(ENROLLMENT_PAIR_INDEX) {
        warn!("enrollment pair conflict reported by store");
        RecordError::Conflict(ALREADY_ENROLLED.to_string())
    } else {
        RecordError::Storage(err)
    }
}
