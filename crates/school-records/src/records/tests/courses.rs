use super::common::*;
use crate::records::domain::{Course, CourseId, StudentId, TeacherId};
use crate::records::error::RecordError;
use crate::records::store::SchoolStore;

#[test]
fn list_carries_teacher_and_bare_enrollments() {
    let (_, records) = seeded();
    let courses = records.courses.list().expect("list courses");

    assert_eq!(courses.len(), 3);
    let database = &courses[1];
    assert_eq!(
        database.teacher.as_ref().map(|t| t.full_name.as_str()),
        Some("Prof. Sarah Johnson")
    );
    assert_eq!(database.enrollments.len(), 2);
    assert!(database
        .enrollments
        .iter()
        .all(|view| view.student.is_none() && view.course.is_none()));
}

#[test]
fn get_loads_students_for_each_enrollment() {
    let (_, records) = seeded();
    let course = records.courses.get(CourseId(1)).expect("course exists");
    let students: Vec<_> = course
        .enrollments
        .iter()
        .map(|view| view.student.as_ref().expect("student loaded").full_name.clone())
        .collect();
    assert_eq!(students, vec!["Alice Williams", "Bob Brown"]);
    assert_eq!(course.teacher.map(|t| t.id), Some(TeacherId(1)));
}

#[test]
fn create_requires_existing_teacher() {
    let (store, records) = seeded();
    match records.courses.create(new_course("Compilers", TeacherId(7))) {
        Err(RecordError::BadRequest(message)) => {
            assert_eq!(message, "Teacher with ID 7 does not exist.")
        }
        other => panic!("expected bad request, got {other:?}"),
    }
    assert_eq!(store.courses().count().unwrap(), 3);

    let course = records
        .courses
        .create(new_course("Compilers", TeacherId(2)))
        .expect("create course");
    assert_eq!(course.id, CourseId(4));
}

#[test]
fn update_to_unknown_teacher_keeps_original() {
    let (_, records) = seeded();
    let mut course = records.courses.get(CourseId(1)).unwrap().course;
    course.teacher_id = TeacherId(999);
    match records.courses.update(CourseId(1), course) {
        Err(RecordError::BadRequest(message)) => {
            assert_eq!(message, "Teacher with ID 999 does not exist.")
        }
        other => panic!("expected bad request, got {other:?}"),
    }
    let stored = records.courses.get(CourseId(1)).unwrap().course;
    assert_eq!(stored.teacher_id, TeacherId(1));
}

#[test]
fn update_moves_course_between_teachers() {
    let (_, records) = seeded();
    let updated = records
        .courses
        .update(
            CourseId(3),
            Course {
                id: CourseId(3),
                title: "Modern Web Development".to_string(),
                description: None,
                start_date: date(2024, 10, 7),
                teacher_id: TeacherId(2),
            },
        )
        .expect("update course");
    assert_eq!(updated.description, None);

    let sarah = records.teachers.get(TeacherId(2)).unwrap();
    assert_eq!(sarah.courses.len(), 2);
    let john = records.teachers.get(TeacherId(1)).unwrap();
    assert_eq!(john.courses.len(), 1);
}

#[test]
fn update_guards_id_and_existence() {
    let (_, records) = seeded();
    let mut course = records.courses.get(CourseId(2)).unwrap().course;
    course.id = CourseId(1);
    match records.courses.update(CourseId(2), course.clone()) {
        Err(RecordError::BadRequest(message)) => assert_eq!(message, "ID mismatch."),
        other => panic!("expected bad request, got {other:?}"),
    }

    course.id = CourseId(50);
    match records.courses.update(CourseId(50), course) {
        Err(RecordError::NotFound(_)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn delete_with_enrollments_is_blocked() {
    let (store, records) = seeded();
    match records.courses.delete(CourseId(2)) {
        Err(RecordError::BadRequest(message)) => assert_eq!(
            message,
            "Cannot delete a course that still has enrollments. Please remove enrollments first."
        ),
        other => panic!("expected bad request, got {other:?}"),
    }
    assert!(store.courses().find_by_id(CourseId(2)).unwrap().is_some());
}

#[test]
fn delete_course_after_its_enrollment_is_removed() {
    let (store, records) = seeded();
    let course = records
        .courses
        .create(new_course("Compilers", TeacherId(2)))
        .unwrap();
    let enrollment = records
        .enrollments
        .create(new_enrollment(StudentId(1), course.id))
        .unwrap();

    records.enrollments.delete(enrollment.id).unwrap();
    records.courses.delete(course.id).expect("delete course");
    assert!(store.courses().find_by_id(course.id).unwrap().is_none());

    match records.courses.get(course.id) {
        Err(RecordError::NotFound(message)) => {
            assert_eq!(message, format!("Course with ID {} not found.", course.id))
        }
        other => panic!("expected not found, got {other:?}"),
    }
}
