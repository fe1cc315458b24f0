use super::common::*;
use crate::records::domain::{CourseId, Student, StudentId};
use crate::records::error::RecordError;
use crate::records::store::SchoolStore;

#[test]
fn get_includes_enrollments_with_courses() {
    let (_, records) = seeded();
    let alice = records.students.get(StudentId(1)).expect("student exists");

    assert_eq!(alice.student.full_name, "Alice Williams");
    let courses: Vec<_> = alice
        .enrollments
        .iter()
        .map(|view| view.course.as_ref().expect("course loaded").course.id)
        .collect();
    assert_eq!(courses, vec![CourseId(1), CourseId(2)]);
    assert!(alice.enrollments.iter().all(|view| view.student.is_none()));
}

#[test]
fn list_returns_every_student() {
    let (_, records) = seeded();
    let students = records.students.list().expect("list students");
    let counts: Vec<_> = students.iter().map(|s| s.enrollments.len()).collect();
    assert_eq!(counts, vec![2, 1, 2]);
}

#[test]
fn create_needs_no_cross_checks() {
    let (_, records) = empty();
    let student = records
        .students
        .create(new_student("Dana Scully"))
        .expect("create student");
    assert_eq!(student.id, StudentId(1));
    assert!(records.students.get(student.id).unwrap().enrollments.is_empty());
}

#[test]
fn update_replaces_name_birth_date_and_flag() {
    let (_, records) = seeded();
    let updated = records
        .students
        .update(
            StudentId(2),
            Student {
                id: StudentId(2),
                full_name: "Robert Brown".to_string(),
                birth_date: date(1999, 12, 24),
                is_active: false,
            },
        )
        .expect("update student");
    assert!(!updated.is_active);
    assert_eq!(records.students.get(StudentId(2)).unwrap().student, updated);
}

#[test]
fn update_guards_id_and_existence() {
    let (_, records) = seeded();
    let mut student = records.students.get(StudentId(1)).unwrap().student;
    student.id = StudentId(3);
    match records.students.update(StudentId(1), student.clone()) {
        Err(RecordError::BadRequest(message)) => assert_eq!(message, "ID mismatch."),
        other => panic!("expected bad request, got {other:?}"),
    }

    student.id = StudentId(99);
    match records.students.update(StudentId(99), student) {
        Err(RecordError::NotFound(message)) => {
            assert_eq!(message, "Student with ID 99 not found.")
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn delete_with_enrollments_is_blocked() {
    let (store, records) = seeded();
    match records.students.delete(StudentId(3)) {
        Err(RecordError::BadRequest(message)) => assert_eq!(
            message,
            "Cannot delete a student who still has enrollments. Please remove enrollments first."
        ),
        other => panic!("expected bad request, got {other:?}"),
    }
    assert_eq!(store.students().count().unwrap(), 3);
}

#[test]
fn delete_after_enrollments_removed_succeeds() {
    let (store, records) = seeded();
    let enrollment = records
        .enrollments
        .list_by_student(StudentId(2))
        .unwrap()
        .remove(0)
        .enrollment;
    records.enrollments.delete(enrollment.id).unwrap();

    records.students.delete(StudentId(2)).expect("delete student");
    assert!(store.students().find_by_id(StudentId(2)).unwrap().is_none());
}
