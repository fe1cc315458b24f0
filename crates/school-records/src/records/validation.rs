//! Field-shape rules checked by the HTTP layer before a manager is called.
//!
//! Each payload type lists its rules as a static table of
//! `{field, rule, message}` entries. Relational checks (does the teacher
//! exist, is the email taken) live in the managers, never here.

use serde::Serialize;

use super::domain::{
    Course, Enrollment, Grade, NewCourse, NewEnrollment, NewStudent, NewTeacher, Student, Teacher,
};

/// A single shape constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Present and not blank.
    Required,
    /// Character count lower bound.
    MinLength(usize),
    /// Character count upper bound.
    MaxLength(usize),
    Email,
    /// Inclusive bounds in hundredths.
    Range { min: i64, max: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: &'static str,
    pub rule: Rule,
    pub message: &'static str,
}

const fn rule(field: &'static str, rule: Rule, message: &'static str) -> FieldRule {
    FieldRule {
        field,
        rule,
        message,
    }
}

/// Value of a field as the rules see it.
#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    Text(Option<&'a str>),
    Grade(Grade),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Every rule a payload broke, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("payload failed {} field rule(s)", .errors.len())]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.errors.iter().map(|error| error.field)
    }
}

/// A payload that carries a rule table.
pub trait Validate {
    const RULES: &'static [FieldRule];

    fn field(&self, name: &str) -> Option<FieldValue<'_>>;

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        let mut blank_fields: Vec<&str> = Vec::new();

        for entry in Self::RULES {
            if blank_fields.contains(&entry.field) {
                continue;
            }
            let Some(value) = self.field(entry.field) else {
                continue;
            };
            if let (Rule::Required, FieldValue::Text(text)) = (entry.rule, value) {
                if text.map_or(true, |text| text.trim().is_empty()) {
                    blank_fields.push(entry.field);
                    errors.push(FieldError {
                        field: entry.field,
                        message: entry.message,
                    });
                }
                continue;
            }
            if !satisfies(entry.rule, value) {
                errors.push(FieldError {
                    field: entry.field,
                    message: entry.message,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors { errors })
        }
    }
}

fn satisfies(rule: Rule, value: FieldValue<'_>) -> bool {
    match (rule, value) {
        // An absent optional value passes every non-required rule.
        (_, FieldValue::Text(None)) => true,
        (Rule::Required, FieldValue::Text(Some(text))) => !text.trim().is_empty(),
        (Rule::MinLength(min), FieldValue::Text(Some(text))) => text.chars().count() >= min,
        (Rule::MaxLength(max), FieldValue::Text(Some(text))) => text.chars().count() <= max,
        (Rule::Email, FieldValue::Text(Some(text))) => looks_like_email(text),
        (Rule::Range { min, max }, FieldValue::Grade(grade)) => {
            (min..=max).contains(&grade.hundredths())
        }
        (_, FieldValue::Grade(_)) | (Rule::Range { .. }, FieldValue::Text(_)) => true,
    }
}

/// Accepts `local@domain` with exactly one `@`, non-empty parts and no
/// whitespace.
pub fn looks_like_email(text: &str) -> bool {
    let mut parts = text.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && !text.chars().any(char::is_whitespace)
}

pub const TEACHER_RULES: &[FieldRule] = &[
    rule("full_name", Rule::Required, "Full name is required"),
    rule(
        "full_name",
        Rule::MaxLength(100),
        "Full name cannot exceed 100 characters",
    ),
    rule(
        "full_name",
        Rule::MinLength(2),
        "Full name must be at least 2 characters",
    ),
    rule("email", Rule::Required, "Email is required"),
    rule("email", Rule::Email, "Invalid email format"),
    rule(
        "email",
        Rule::MaxLength(100),
        "Email cannot exceed 100 characters",
    ),
];

pub const STUDENT_RULES: &[FieldRule] = &[
    rule("full_name", Rule::Required, "Full name is required"),
    rule(
        "full_name",
        Rule::MaxLength(100),
        "Full name cannot exceed 100 characters",
    ),
    rule(
        "full_name",
        Rule::MinLength(2),
        "Full name must be at least 2 characters",
    ),
];

pub const COURSE_RULES: &[FieldRule] = &[
    rule("title", Rule::Required, "Course title is required"),
    rule(
        "title",
        Rule::MaxLength(200),
        "Title cannot exceed 200 characters",
    ),
    rule(
        "title",
        Rule::MinLength(3),
        "Title must be at least 3 characters",
    ),
    rule(
        "description",
        Rule::MaxLength(1000),
        "Description cannot exceed 1000 characters",
    ),
];

pub const ENROLLMENT_RULES: &[FieldRule] = &[rule(
    "grade",
    Rule::Range { min: 0, max: 10_000 },
    "Grade must be between 0 and 100",
)];

macro_rules! teacher_fields {
    ($($ty:ty),*) => {$(
        impl Validate for $ty {
            const RULES: &'static [FieldRule] = TEACHER_RULES;

            fn field(&self, name: &str) -> Option<FieldValue<'_>> {
                match name {
                    "full_name" => Some(FieldValue::Text(Some(&self.full_name))),
                    "email" => Some(FieldValue::Text(Some(&self.email))),
                    _ => None,
                }
            }
        }
    )*};
}

macro_rules! student_fields {
    ($($ty:ty),*) => {$(
        impl Validate for $ty {
            const RULES: &'static [FieldRule] = STUDENT_RULES;

            fn field(&self, name: &str) -> Option<FieldValue<'_>> {
                match name {
                    "full_name" => Some(FieldValue::Text(Some(&self.full_name))),
                    _ => None,
                }
            }
        }
    )*};
}

macro_rules! course_fields {
    ($($ty:ty),*) => {$(
        impl Validate for $ty {
            const RULES: &'static [FieldRule] = COURSE_RULES;

            fn field(&self, name: &str) -> Option<FieldValue<'_>> {
                match name {
                    "title" => Some(FieldValue::Text(Some(&self.title))),
                    "description" => Some(FieldValue::Text(self.description.as_deref())),
                    _ => None,
                }
            }
        }
    )*};
}

macro_rules! enrollment_fields {
    ($($ty:ty),*) => {$(
        impl Validate for $ty {
            const RULES: &'static [FieldRule] = ENROLLMENT_RULES;

            fn field(&self, name: &str) -> Option<FieldValue<'_>> {
                match name {
                    "grade" => Some(FieldValue::Grade(self.grade)),
                    _ => None,
                }
            }
        }
    )*};
}

teacher_fields!(Teacher, NewTeacher);
student_fields!(Student, NewStudent);
course_fields!(Course, NewCourse);
enrollment_fields!(Enrollment, NewEnrollment);
