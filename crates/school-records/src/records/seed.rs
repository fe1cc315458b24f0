use chrono::NaiveDate;
use tracing::info;

use super::domain::{Grade, NewCourse, NewEnrollment, NewStudent, NewTeacher};
use super::store::{SchoolStore, StorageError};

/// Row counts per table, as reported after seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    pub teachers: usize,
    pub students: usize,
    pub courses: usize,
    pub enrollments: usize,
}

impl SeedSummary {
    pub fn collect(store: &dyn SchoolStore) -> Result<Self, StorageError> {
        Ok(Self {
            teachers: store.teachers().count()?,
            students: store.students().count()?,
            courses: store.courses().count()?,
            enrollments: store.enrollments().count()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.teachers + self.students + self.courses + self.enrollments == 0
    }
}

/// Load the starter data set into a store that holds no records at all.
/// Returns `false` without writing when any table already has rows.
pub fn seed_if_empty(store: &dyn SchoolStore) -> Result<bool, StorageError> {
    if !SeedSummary::collect(store)?.is_empty() {
        return Ok(false);
    }

    let teachers = [
        ("Dr. John Smith", "john.smith@school.edu", (2020, 1, 15)),
        ("Prof. Sarah Johnson", "sarah.johnson@school.edu", (2019, 8, 20)),
    ];
    let mut teacher_ids = Vec::with_capacity(teachers.len());
    for (full_name, email, hired) in teachers {
        let teacher = store.teachers().insert(NewTeacher {
            full_name: full_name.to_string(),
            email: email.to_string(),
            hire_date: day(hired)?,
        })?;
        teacher_ids.push(teacher.id);
    }

    let students = [
        ("Alice Williams", (2000, 5, 10)),
        ("Bob Brown", (1999, 12, 25)),
        ("Charlie Davis", (2001, 3, 18)),
    ];
    let mut student_ids = Vec::with_capacity(students.len());
    for (full_name, born) in students {
        let student = store.students().insert(NewStudent {
            full_name: full_name.to_string(),
            birth_date: day(born)?,
            is_active: true,
        })?;
        student_ids.push(student.id);
    }

    let courses = [
        (
            "Introduction to Programming",
            "Learn the basics of programming with C#",
            0,
            (2024, 9, 1),
        ),
        (
            "Database Design",
            "Master database design principles and SQL",
            1,
            (2024, 9, 1),
        ),
        (
            "Web Development",
            "Build modern web applications with ASP.NET",
            0,
            (2024, 10, 1),
        ),
    ];
    let mut course_ids = Vec::with_capacity(courses.len());
    for (title, description, teacher, starts) in courses {
        let course = store.courses().insert(NewCourse {
            title: title.to_string(),
            description: Some(description.to_string()),
            start_date: day(starts)?,
            teacher_id: pick(&teacher_ids, teacher)?,
        })?;
        course_ids.push(course.id);
    }

    let enrollments = [
        (0, 0, (2024, 8, 25), 8550),
        (0, 1, (2024, 8, 26), 9200),
        (1, 0, (2024, 8, 25), 7800),
        (2, 1, (2024, 8, 26), 8850),
        (2, 2, (2024, 9, 28), 0),
    ];
    for (student, course, enrolled, grade) in enrollments {
        store.enrollments().insert(NewEnrollment {
            enroll_date: day(enrolled)?,
            grade: Grade::from_hundredths(grade),
            student_id: pick(&student_ids, student)?,
            course_id: pick(&course_ids, course)?,
        })?;
    }

    let summary = SeedSummary::collect(store)?;
    info!(
        teachers = summary.teachers,
        students = summary.students,
        courses = summary.courses,
        enrollments = summary.enrollments,
        "seeded empty store"
    );
    Ok(true)
}

fn day((year, month, date): (i32, u32, u32)) -> Result<NaiveDate, StorageError> {
    NaiveDate::from_ymd_opt(year, month, date)
        .ok_or_else(|| StorageError::Constraint(format!("invalid seed date {year}-{month}-{date}")))
}

fn pick<I: Copy>(ids: &[I], index: usize) -> Result<I, StorageError> {
    ids.get(index)
        .copied()
        .ok_or_else(|| StorageError::Constraint(format!("seed reference {index} out of range")))
}
