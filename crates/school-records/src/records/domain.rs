use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Conversion between a typed identifier and the raw integer the store assigns.
pub trait RecordId:
    Copy + Eq + Ord + std::hash::Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    fn from_raw(raw: i64) -> Self;
    fn raw(self) -> i64;
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl RecordId for $name {
            fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            fn raw(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier assigned to a teacher by the store.
    TeacherId
);
record_id!(
    /// Identifier assigned to a student by the store.
    StudentId
);
record_id!(
    /// Identifier assigned to a course by the store.
    CourseId
);
record_id!(
    /// Identifier assigned to an enrollment by the store.
    EnrollmentId
);

/// How teacher emails are compared when enforcing uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailPolicy {
    #[default]
    CaseSensitive,
    /// ASCII case folding, matching SQLite's `NOCASE` collation.
    CaseInsensitive,
}

impl EmailPolicy {
    pub fn same(self, left: &str, right: &str) -> bool {
        match self {
            EmailPolicy::CaseSensitive => left == right,
            EmailPolicy::CaseInsensitive => left.eq_ignore_ascii_case(right),
        }
    }

    /// Key under which an address is indexed.
    pub fn index_key(self, email: &str) -> String {
        match self {
            EmailPolicy::CaseSensitive => email.to_string(),
            EmailPolicy::CaseInsensitive => email.to_ascii_lowercase(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EmailPolicy::CaseSensitive => "case_sensitive",
            EmailPolicy::CaseInsensitive => "case_insensitive",
        }
    }
}

/// Course grade kept in hundredths so it round-trips the `decimal(5,2)` column exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Grade(i64);

impl Grade {
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Round a decimal value to two fractional digits.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value * 100.0).round();
        if scaled.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self(scaled as i64))
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", magnitude / 100, magnitude % 100)
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Grade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Grade::from_f64(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("grade {raw} is not a finite number")))
    }
}

/// An instructor. Courses point at teachers, never the other way round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub full_name: String,
    pub email: String,
    pub hire_date: NaiveDate,
}

/// Teacher payload before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeacher {
    pub full_name: String,
    pub email: String,
    pub hire_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub full_name: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub teacher_id: TeacherId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub teacher_id: TeacherId,
}

/// Join record linking one student to one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub enroll_date: NaiveDate,
    #[serde(default)]
    pub grade: Grade,
    pub student_id: StudentId,
    pub course_id: CourseId,
}

impl Enrollment {
    pub fn pair(&self) -> (StudentId, CourseId) {
        (self.student_id, self.course_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEnrollment {
    pub enroll_date: NaiveDate,
    #[serde(default)]
    pub grade: Grade,
    pub student_id: StudentId,
    pub course_id: CourseId,
}

/// Teacher together with the courses currently assigned to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeacherWithCourses {
    #[serde(flatten)]
    pub teacher: Teacher,
    pub courses: Vec<Course>,
}

/// Student together with their enrollments, each carrying its course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentWithEnrollments {
    #[serde(flatten)]
    pub student: Student,
    pub enrollments: Vec<EnrollmentView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseWithTeacher {
    #[serde(flatten)]
    pub course: Course,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<Teacher>,
}

/// Course together with its teacher and enrollments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub teacher: Option<Teacher>,
    pub enrollments: Vec<EnrollmentView>,
}

/// Enrollment with whichever related records the calling operation loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentView {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<Student>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseWithTeacher>,
}

impl EnrollmentView {
    pub fn bare(enrollment: Enrollment) -> Self {
        Self {
            enrollment,
            student: None,
            course: None,
        }
    }
}
