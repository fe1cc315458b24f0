use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    Course, CourseId, Enrollment, EnrollmentId, NewCourse, NewEnrollment, NewStudent, NewTeacher,
    Student, StudentId, Teacher, TeacherId,
};
use super::error::RecordError;
use super::store::SchoolStore;
use super::validation::{Validate, ValidationErrors};
use super::SchoolRecords;

type Records<S> = State<Arc<SchoolRecords<S>>>;

/// Router builder exposing CRUD endpoints for all four record kinds.
pub fn records_router<S>(records: Arc<SchoolRecords<S>>) -> Router
where
    S: SchoolStore + 'static,
{
    Router::new()
        .route(
            "/api/teachers",
            get(list_teachers::<S>).post(create_teacher::<S>),
        )
        .route(
            "/api/teachers/:id",
            get(get_teacher::<S>)
                .put(update_teacher::<S>)
                .delete(delete_teacher::<S>),
        )
        .route(
            "/api/students",
            get(list_students::<S>).post(create_student::<S>),
        )
        .route(
            "/api/students/:id",
            get(get_student::<S>)
                .put(update_student::<S>)
                .delete(delete_student::<S>),
        )
        .route(
            "/api/courses",
            get(list_courses::<S>).post(create_course::<S>),
        )
        .route(
            "/api/courses/:id",
            get(get_course::<S>)
                .put(update_course::<S>)
                .delete(delete_course::<S>),
        )
        .route(
            "/api/enrollments",
            get(list_enrollments::<S>).post(create_enrollment::<S>),
        )
        .route(
            "/api/enrollments/:id",
            get(get_enrollment::<S>)
                .put(update_enrollment::<S>)
                .delete(delete_enrollment::<S>),
        )
        .route(
            "/api/enrollments/student/:student_id",
            get(enrollments_by_student::<S>),
        )
        .route(
            "/api/enrollments/course/:course_id",
            get(enrollments_by_course::<S>),
        )
        .with_state(records)
}

pub(crate) async fn list_teachers<S: SchoolStore + 'static>(
    State(records): Records<S>,
) -> Response {
    ok(records.teachers.list())
}

pub(crate) async fn get_teacher<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<TeacherId>,
) -> Response {
    ok(records.teachers.get(id))
}

pub(crate) async fn create_teacher<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Json(draft): Json<NewTeacher>,
) -> Response {
    if let Err(errors) = draft.validate() {
        return invalid(errors);
    }
    match records.teachers.create(draft) {
        Ok(teacher) => created(format!("/api/teachers/{}", teacher.id), &teacher),
        Err(err) => failure(err),
    }
}

pub(crate) async fn update_teacher<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<TeacherId>,
    Json(teacher): Json<Teacher>,
) -> Response {
    if let Err(errors) = teacher.validate() {
        return invalid(errors);
    }
    no_content(records.teachers.update(id, teacher))
}

pub(crate) async fn delete_teacher<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<TeacherId>,
) -> Response {
    no_content(records.teachers.delete(id))
}

pub(crate) async fn list_students<S: SchoolStore + 'static>(
    State(records): Records<S>,
) -> Response {
    ok(records.students.list())
}

pub(crate) async fn get_student<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<StudentId>,
) -> Response {
    ok(records.students.get(id))
}

pub(crate) async fn create_student<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Json(draft): Json<NewStudent>,
) -> Response {
    if let Err(errors) = draft.validate() {
        return invalid(errors);
    }
    match records.students.create(draft) {
        Ok(student) => created(format!("/api/students/{}", student.id), &student),
        Err(err) => failure(err),
    }
}

pub(crate) async fn update_student<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<StudentId>,
    Json(student): Json<Student>,
) -> Response {
    if let Err(errors) = student.validate() {
        return invalid(errors);
    }
    no_content(records.students.update(id, student))
}

pub(crate) async fn delete_student<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<StudentId>,
) -> Response {
    no_content(records.students.delete(id))
}

pub(crate) async fn list_courses<S: SchoolStore + 'static>(
    State(records): Records<S>,
) -> Response {
    ok(records.courses.list())
}

pub(crate) async fn get_course<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<CourseId>,
) -> Response {
    ok(records.courses.get(id))
}

pub(crate) async fn create_course<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Json(draft): Json<NewCourse>,
) -> Response {
    if let Err(errors) = draft.validate() {
        return invalid(errors);
    }
    match records.courses.create(draft) {
        Ok(course) => created(format!("/api/courses/{}", course.id), &course),
        Err(err) => failure(err),
    }
}

pub(crate) async fn update_course<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<CourseId>,
    Json(course): Json<Course>,
) -> Response {
    if let Err(errors) = course.validate() {
        return invalid(errors);
    }
    no_content(records.courses.update(id, course))
}

pub(crate) async fn delete_course<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<CourseId>,
) -> Response {
    no_content(records.courses.delete(id))
}

pub(crate) async fn list_enrollments<S: SchoolStore + 'static>(
    State(records): Records<S>,
) -> Response {
    ok(records.enrollments.list())
}

pub(crate) async fn get_enrollment<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<EnrollmentId>,
) -> Response {
    ok(records.enrollments.get(id))
}

pub(crate) async fn enrollments_by_student<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(student_id): Path<StudentId>,
) -> Response {
    ok(records.enrollments.list_by_student(student_id))
}

pub(crate) async fn enrollments_by_course<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(course_id): Path<CourseId>,
) -> Response {
    ok(records.enrollments.list_by_course(course_id))
}

pub(crate) async fn create_enrollment<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Json(draft): Json<NewEnrollment>,
) -> Response {
    if let Err(errors) = draft.validate() {
        return invalid(errors);
    }
    match records.enrollments.create(draft) {
        Ok(enrollment) => created(
            format!("/api/enrollments/{}", enrollment.id),
            &enrollment,
        ),
        Err(err) => failure(err),
    }
}

pub(crate) async fn update_enrollment<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<EnrollmentId>,
    Json(enrollment): Json<Enrollment>,
) -> Response {
    if let Err(errors) = enrollment.validate() {
        return invalid(errors);
    }
    no_content(records.enrollments.update(id, enrollment))
}

pub(crate) async fn delete_enrollment<S: SchoolStore + 'static>(
    State(records): Records<S>,
    Path(id): Path<EnrollmentId>,
) -> Response {
    no_content(records.enrollments.delete(id))
}

fn ok<T: Serialize>(result: Result<T, RecordError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => failure(err),
    }
}

fn created<T: Serialize>(location: String, body: &T) -> Response {
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(body),
    )
        .into_response()
}

fn no_content<T>(result: Result<T, RecordError>) -> Response {
    match result {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => failure(err),
    }
}

fn invalid(errors: ValidationErrors) -> Response {
    let payload = json!({
        "message": "One or more validation errors occurred.",
        "errors": errors.errors,
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

fn failure(err: RecordError) -> Response {
    let status = match &err {
        RecordError::NotFound(_) => StatusCode::NOT_FOUND,
        RecordError::BadRequest(_) => StatusCode::BAD_REQUEST,
        RecordError::Conflict(_) => StatusCode::CONFLICT,
        RecordError::Storage(storage) => {
            error!(error = %storage, "storage failure while handling request");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "message": err.to_string(),
    });
    (status, Json(payload)).into_response()
}
