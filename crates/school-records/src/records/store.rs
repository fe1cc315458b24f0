use std::fmt;

use super::domain::{
    Course, CourseId, EmailPolicy, Enrollment, EnrollmentId, NewCourse, NewEnrollment,
    NewStudent, NewTeacher, RecordId, Student, StudentId, Teacher, TeacherId,
};

/// Unique index over teacher emails.
pub const TEACHER_EMAIL_INDEX: &str = "ix_teachers_email";
/// Unique index over the (student, course) pair of an enrollment.
pub const ENROLLMENT_PAIR_INDEX: &str = "ix_enrollments_student_course";

/// A persisted record kind.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    type Id: RecordId;
    type Draft: Clone + fmt::Debug + Send + Sync + 'static;
    type Filter: RecordFilter<Self>;

    /// Human readable kind, used in messages ("Teacher with ID 3 not found.").
    const KIND: &'static str;

    fn id(&self) -> Self::Id;
    fn from_draft(id: Self::Id, draft: Self::Draft) -> Self;
}

/// Declarative predicate over one record kind. Backends either evaluate
/// `matches` directly or translate the filter into their own query language.
pub trait RecordFilter<E>: fmt::Debug + Send + Sync {
    fn matches(&self, record: &E) -> bool;
}

/// Storage contract shared by every record kind.
pub trait Table<E: Entity>: Send + Sync {
    fn find_all(&self) -> Result<Vec<E>, StorageError>;
    fn find_by_id(&self, id: E::Id) -> Result<Option<E>, StorageError>;
    fn find_where(&self, filter: &E::Filter) -> Result<Vec<E>, StorageError>;
    fn insert(&self, draft: E::Draft) -> Result<E, StorageError>;
    fn update(&self, record: &E) -> Result<(), StorageError>;
    fn delete(&self, id: E::Id) -> Result<(), StorageError>;

    fn exists(&self, filter: &E::Filter) -> Result<bool, StorageError> {
        Ok(!self.find_where(filter)?.is_empty())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.find_all()?.len())
    }
}

/// The four tables the record managers work against.
pub trait SchoolStore: Send + Sync {
    fn teachers(&self) -> &dyn Table<Teacher>;
    fn students(&self) -> &dyn Table<Student>;
    fn courses(&self) -> &dyn Table<Course>;
    fn enrollments(&self) -> &dyn Table<Enrollment>;
}

/// Failures surfaced by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unique index {index} violated")]
    UniqueViolation { index: String },
    #[error("{kind} {id} no longer exists")]
    MissingRecord { kind: &'static str, id: i64 },
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn violates(&self, index: &str) -> bool {
        matches!(self, StorageError::UniqueViolation { index: violated } if violated == index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeacherFilter {
    Id(TeacherId),
    Email {
        address: String,
        policy: EmailPolicy,
        excluding: Option<TeacherId>,
    },
}

impl RecordFilter<Teacher> for TeacherFilter {
    fn matches(&self, record: &Teacher) -> bool {
        match self {
            TeacherFilter::Id(id) => record.id == *id,
            TeacherFilter::Email {
                address,
                policy,
                excluding,
            } => Some(record.id) != *excluding && policy.same(&record.email, address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentFilter {
    Id(StudentId),
}

impl RecordFilter<Student> for StudentFilter {
    fn matches(&self, record: &Student) -> bool {
        match self {
            StudentFilter::Id(id) => record.id == *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseFilter {
    Id(CourseId),
    Teacher(TeacherId),
}

impl RecordFilter<Course> for CourseFilter {
    fn matches(&self, record: &Course) -> bool {
        match self {
            CourseFilter::Id(id) => record.id == *id,
            CourseFilter::Teacher(teacher_id) => record.teacher_id == *teacher_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentFilter {
    Id(EnrollmentId),
    Student(StudentId),
    Course(CourseId),
    Pair {
        student_id: StudentId,
        course_id: CourseId,
        excluding: Option<EnrollmentId>,
    },
}

impl RecordFilter<Enrollment> for EnrollmentFilter {
    fn matches(&self, record: &Enrollment) -> bool {
        match self {
            EnrollmentFilter::Id(id) => record.id == *id,
            EnrollmentFilter::Student(student_id) => record.student_id == *student_id,
            EnrollmentFilter::Course(course_id) => record.course_id == *course_id,
            EnrollmentFilter::Pair {
                student_id,
                course_id,
                excluding,
            } => {
                Some(record.id) != *excluding
                    && record.student_id == *student_id
                    && record.course_id == *course_id
            }
        }
    }
}

impl Entity for Teacher {
    type Id = TeacherId;
    type Draft = NewTeacher;
    type Filter = TeacherFilter;

    const KIND: &'static str = "Teacher";

    fn id(&self) -> TeacherId {
        self.id
    }

    fn from_draft(id: TeacherId, draft: NewTeacher) -> Self {
        Self {
            id,
            full_name: draft.full_name,
            email: draft.email,
            hire_date: draft.hire_date,
        }
    }
}

impl Entity for Student {
    type Id = StudentId;
    type Draft = NewStudent;
    type Filter = StudentFilter;

    const KIND: &'static str = "Student";

    fn id(&self) -> StudentId {
        self.id
    }

    fn from_draft(id: StudentId, draft: NewStudent) -> Self {
        Self {
            id,
            full_name: draft.full_name,
            birth_date: draft.birth_date,
            is_active: draft.is_active,
        }
    }
}

impl Entity for Course {
    type Id = CourseId;
    type Draft = NewCourse;
    type Filter = CourseFilter;

    const KIND: &'static str = "Course";

    fn id(&self) -> CourseId {
        self.id
    }

    fn from_draft(id: CourseId, draft: NewCourse) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            start_date: draft.start_date,
            teacher_id: draft.teacher_id,
        }
    }
}

impl Entity for Enrollment {
    type Id = EnrollmentId;
    type Draft = NewEnrollment;
    type Filter = EnrollmentFilter;

    const KIND: &'static str = "Enrollment";

    fn id(&self) -> EnrollmentId {
        self.id
    }

    fn from_draft(id: EnrollmentId, draft: NewEnrollment) -> Self {
        Self {
            id,
            enroll_date: draft.enroll_date,
            grade: draft.grade,
            student_id: draft.student_id,
            course_id: draft.course_id,
        }
    }
}
