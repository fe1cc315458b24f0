use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use school_records::records::{
    seed_if_empty, CourseId, EmailPolicy, Grade, NewEnrollment, NewTeacher, RecordError,
    SchoolRecords, SchoolStore, SeedSummary, SqliteStore, StorageError, StudentId, TeacherId,
};

fn scratch_database(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("school-records-{name}-{}-{nanos}", std::process::id()))
        .join("school.sqlite")
}

fn seeded(policy: EmailPolicy) -> (Arc<SqliteStore>, SchoolRecords<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory(policy).expect("open sqlite"));
    seed_if_empty(store.as_ref()).expect("seed sqlite");
    let records = SchoolRecords::new(store.clone(), policy);
    (store, records)
}

#[test]
fn file_store_persists_seed_across_reopen() {
    let path = scratch_database("reopen");
    {
        let store = SqliteStore::open(&path, EmailPolicy::default()).expect("create file");
        assert!(seed_if_empty(&store).expect("seed file"));
    }

    let reopened = SqliteStore::open(&path, EmailPolicy::default()).expect("reopen file");
    assert!(!seed_if_empty(&reopened).expect("already seeded"));
    let summary = SeedSummary::collect(&reopened).expect("count rows");
    assert_eq!(
        summary,
        SeedSummary {
            teachers: 2,
            students: 3,
            courses: 3,
            enrollments: 5,
        }
    );

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn managers_enforce_the_same_rules_over_sqlite() {
    let (_, records) = seeded(EmailPolicy::default());

    match records.teachers.delete(TeacherId(2)) {
        Err(RecordError::BadRequest(_)) => {}
        other => panic!("expected bad request, got {other:?}"),
    }
    match records.enrollments.create(NewEnrollment {
        enroll_date: NaiveDate::from_ymd_opt(2024, 8, 25).unwrap(),
        grade: Grade::from_hundredths(0),
        student_id: StudentId(2),
        course_id: CourseId(1),
    }) {
        Err(RecordError::Conflict(_)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }

    let view = records.enrollments.list_by_student(StudentId(1)).unwrap();
    assert_eq!(view[0].enrollment.grade, Grade::from_hundredths(8550));
    assert_eq!(
        view[1]
            .course
            .as_ref()
            .and_then(|course| course.teacher.as_ref())
            .map(|teacher| teacher.full_name.as_str()),
        Some("Prof. Sarah Johnson")
    );
}

#[test]
fn case_insensitive_store_rejects_folded_duplicates() {
    let (store, records) = seeded(EmailPolicy::CaseInsensitive);
    let draft = NewTeacher {
        full_name: "Johnny".to_string(),
        email: "John.Smith@School.edu".to_string(),
        hire_date: NaiveDate::from_ymd_opt(2022, 2, 2).unwrap(),
    };
    match records.teachers.create(draft.clone()) {
        Err(RecordError::Conflict(_)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }

    let err = store
        .teachers()
        .insert(draft)
        .expect_err("unique index folds case");
    assert!(matches!(err, StorageError::UniqueViolation { .. }));
}

#[test]
fn foreign_keys_block_raw_deletes_of_referenced_rows() {
    let (store, _) = seeded(EmailPolicy::default());
    match store.courses().delete(CourseId(1)) {
        Err(StorageError::Constraint(_)) => {}
        other => panic!("expected constraint failure, got {other:?}"),
    }
    assert!(store.courses().find_by_id(CourseId(1)).unwrap().is_some());
}

#[test]
fn reopening_under_a_different_email_policy_is_refused() {
    let path = scratch_database("policy");
    {
        let store = SqliteStore::open(&path, EmailPolicy::CaseInsensitive).expect("create file");
        let records = SchoolRecords::new(Arc::new(store), EmailPolicy::CaseInsensitive);
        records
            .teachers
            .create(NewTeacher {
                full_name: "Ada Lovelace".to_string(),
                email: "ada@school.edu".to_string(),
                hire_date: NaiveDate::from_ymd_opt(2022, 2, 2).unwrap(),
            })
            .expect("create teacher");
    }

    match SqliteStore::open(&path, EmailPolicy::CaseSensitive) {
        Err(StorageError::Unavailable(message)) => {
            assert!(message.contains("NOCASE"), "unexpected message: {message}");
            assert!(message.contains("case_sensitive"), "unexpected message: {message}");
        }
        Err(other) => panic!("expected unavailable store, got {other:?}"),
        Ok(_) => panic!("expected reopen under case_sensitive to be refused"),
    }

    let same_policy =
        SqliteStore::open(&path, EmailPolicy::CaseInsensitive).expect("reopen with same policy");
    assert_eq!(same_policy.teachers().count().unwrap(), 1);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}
