use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::records::domain::{
    Course, CourseId, EmailPolicy, Enrollment, Grade, NewCourse, NewEnrollment, NewStudent,
    NewTeacher, Student, StudentId, Teacher, TeacherId,
};
use crate::records::memory::{MemoryTable, UniqueIndex};
use crate::records::store::{
    Entity, SchoolStore, StorageError, Table, ENROLLMENT_PAIR_INDEX, TEACHER_EMAIL_INDEX,
};
use crate::records::{records_router, seed_if_empty, MemoryStore, SchoolRecords};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Managers over a memory store loaded with the starter data set.
pub(super) fn seeded() -> (Arc<MemoryStore>, SchoolRecords<MemoryStore>) {
    seeded_with(EmailPolicy::CaseSensitive)
}

pub(super) fn seeded_with(policy: EmailPolicy) -> (Arc<MemoryStore>, SchoolRecords<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(policy));
    assert!(seed_if_empty(store.as_ref()).expect("seed succeeds"));
    let records = SchoolRecords::new(store.clone(), policy);
    (store, records)
}

pub(super) fn empty() -> (Arc<MemoryStore>, SchoolRecords<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let records = SchoolRecords::new(store.clone(), EmailPolicy::CaseSensitive);
    (store, records)
}

pub(super) fn seeded_router() -> (Arc<MemoryStore>, axum::Router) {
    let (store, records) = seeded();
    (store, records_router(Arc::new(records)))
}

pub(super) fn new_teacher(full_name: &str, email: &str) -> NewTeacher {
    NewTeacher {
        full_name: full_name.to_string(),
        email: email.to_string(),
        hire_date: date(2022, 1, 10),
    }
}

pub(super) fn new_student(full_name: &str) -> NewStudent {
    NewStudent {
        full_name: full_name.to_string(),
        birth_date: date(2002, 6, 1),
        is_active: true,
    }
}

pub(super) fn new_course(title: &str, teacher_id: TeacherId) -> NewCourse {
    NewCourse {
        title: title.to_string(),
        description: Some("Elective".to_string()),
        start_date: date(2025, 1, 15),
        teacher_id,
    }
}

pub(super) fn new_enrollment(student_id: StudentId, course_id: CourseId) -> NewEnrollment {
    NewEnrollment {
        enroll_date: date(2024, 9, 2),
        grade: Grade::from_hundredths(0),
        student_id,
        course_id,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Table that lets a rival writer slip in a row right after the manager's
/// existence check, simulating a concurrent request.
pub(super) struct RacingTable<E: Entity> {
    inner: MemoryTable<E>,
    rival: Mutex<Option<E::Draft>>,
}

impl<E: Entity> RacingTable<E> {
    fn new(indexes: Vec<UniqueIndex<E>>) -> Self {
        Self {
            inner: MemoryTable::new(indexes),
            rival: Mutex::new(None),
        }
    }

    pub(super) fn arm(&self, draft: E::Draft) {
        *self.rival.lock().expect("rival lock") = Some(draft);
    }
}

impl<E: Entity> Table<E> for RacingTable<E> {
    fn find_all(&self) -> Result<Vec<E>, StorageError> {
        self.inner.find_all()
    }

    fn find_by_id(&self, id: E::Id) -> Result<Option<E>, StorageError> {
        self.inner.find_by_id(id)
    }

    fn find_where(&self, filter: &E::Filter) -> Result<Vec<E>, StorageError> {
        self.inner.find_where(filter)
    }

    fn exists(&self, filter: &E::Filter) -> Result<bool, StorageError> {
        let found = self.inner.exists(filter)?;
        if let Some(draft) = self.rival.lock().expect("rival lock").take() {
            self.inner.insert(draft)?;
        }
        Ok(found)
    }

    fn insert(&self, draft: E::Draft) -> Result<E, StorageError> {
        self.inner.insert(draft)
    }

    fn update(&self, record: &E) -> Result<(), StorageError> {
        self.inner.update(record)
    }

    fn delete(&self, id: E::Id) -> Result<(), StorageError> {
        self.inner.delete(id)
    }
}

pub(super) struct RacingStore {
    pub(super) teachers: RacingTable<Teacher>,
    students: MemoryTable<Student>,
    courses: MemoryTable<Course>,
    pub(super) enrollments: RacingTable<Enrollment>,
}

impl RacingStore {
    pub(super) fn new() -> Self {
        Self {
            teachers: RacingTable::new(vec![UniqueIndex::new(
                TEACHER_EMAIL_INDEX,
                |teacher: &Teacher| teacher.email.clone(),
            )]),
            students: MemoryTable::new(Vec::new()),
            courses: MemoryTable::new(Vec::new()),
            enrollments: RacingTable::new(vec![UniqueIndex::new(
                ENROLLMENT_PAIR_INDEX,
                |enrollment: &Enrollment| {
                    format!("{}:{}", enrollment.student_id, enrollment.course_id)
                },
            )]),
        }
    }
}

impl SchoolStore for RacingStore {
    fn teachers(&self) -> &dyn Table<Teacher> {
        &self.teachers
    }

    fn students(&self) -> &dyn Table<Student> {
        &self.students
    }

    fn courses(&self) -> &dyn Table<Course> {
        &self.courses
    }

    fn enrollments(&self) -> &dyn Table<Enrollment> {
        &self.enrollments
    }
}

/// Table whose backend has gone away.
pub(super) struct UnavailableTable;

fn unavailable() -> StorageError {
    StorageError::Unavailable("connection refused".to_string())
}

impl<E: Entity> Table<E> for UnavailableTable {
    fn find_all(&self) -> Result<Vec<E>, StorageError> {
        Err(unavailable())
    }

    fn find_by_id(&self, _id: E::Id) -> Result<Option<E>, StorageError> {
        Err(unavailable())
    }

    fn find_where(&self, _filter: &E::Filter) -> Result<Vec<E>, StorageError> {
        Err(unavailable())
    }

    fn insert(&self, _draft: E::Draft) -> Result<E, StorageError> {
        Err(unavailable())
    }

    fn update(&self, _record: &E) -> Result<(), StorageError> {
        Err(unavailable())
    }

    fn delete(&self, _id: E::Id) -> Result<(), StorageError> {
        Err(unavailable())
    }
}

pub(super) struct UnavailableStore;

impl SchoolStore for UnavailableStore {
    fn teachers(&self) -> &dyn Table<Teacher> {
        &UnavailableTable
    }

    fn students(&self) -> &dyn Table<Student> {
        &UnavailableTable
    }

    fn courses(&self) -> &dyn Table<Course> {
        &UnavailableTable
    }

    fn enrollments(&self) -> &dyn Table<Enrollment> {
        &UnavailableTable
    }
}
