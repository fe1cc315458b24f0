use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{ffi, params, params_from_iter, Connection, Error as SqlError, ErrorCode, Row};
use tracing::debug;

use super::domain::{Course, EmailPolicy, Enrollment, Grade, RecordId, Student, Teacher};
use super::store::{
    CourseFilter, Entity, EnrollmentFilter, SchoolStore, StorageError, StudentFilter, Table,
    TeacherFilter, ENROLLMENT_PAIR_INDEX, TEACHER_EMAIL_INDEX,
};

/// Mapping between a record kind and its SQLite table.
pub trait SqlRecord: Entity {
    const TABLE: &'static str;
    /// Every column except `id`, in the order used by `from_row` and the value helpers.
    const COLUMNS: &'static [&'static str];

    /// Build a record from a row selected as `id, COLUMNS...`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn draft_values(draft: &Self::Draft) -> Vec<Value>;
    fn values(&self) -> Vec<Value>;
    /// Translate a filter into a `WHERE` clause with positional parameters.
    fn filter_clause(filter: &Self::Filter) -> (String, Vec<Value>);
}

/// Store backed by a single SQLite connection with real unique indexes and
/// `ON DELETE RESTRICT` foreign keys.
pub struct SqliteStore {
    teachers: SqliteTable<Teacher>,
    students: SqliteTable<Student>,
    courses: SqliteTable<Course>,
    enrollments: SqliteTable<Enrollment>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and run the schema migration.
    pub fn open(path: impl AsRef<Path>, email_policy: EmailPolicy) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                StorageError::Unavailable(format!("failed to create data directory: {err}"))
            })?;
        }

        let conn = Connection::open(path).map_err(unavailable("failed to open SQLite database"))?;
        debug!(path = %path.display(), "opened sqlite store");
        Self::with_connection(conn, email_policy)
    }

    pub fn open_in_memory(email_policy: EmailPolicy) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(unavailable("failed to open in-memory SQLite database"))?;
        Self::with_connection(conn, email_policy)
    }

    fn with_connection(conn: Connection, email_policy: EmailPolicy) -> Result<Self, StorageError> {
        ensure_schema(&conn, email_policy)?;
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            teachers: SqliteTable::new(conn.clone()),
            students: SqliteTable::new(conn.clone()),
            courses: SqliteTable::new(conn.clone()),
            enrollments: SqliteTable::new(conn),
        })
    }
}

impl SchoolStore for SqliteStore {
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

/// Create the four tables and their indexes if they do not exist yet. Foreign
/// keys are switched on per connection so `RESTRICT` is actually enforced.
fn ensure_schema(conn: &Connection, email_policy: EmailPolicy) -> Result<(), StorageError> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .map_err(unavailable("failed to enable foreign keys"))?;

    let email_collation = match email_policy {
        EmailPolicy::CaseSensitive => "BINARY",
        EmailPolicy::CaseInsensitive => "NOCASE",
    };

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS teachers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL COLLATE {email_collation},
            hire_date TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS {TEACHER_EMAIL_INDEX} ON teachers (email);

        CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            is_active INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            start_date TEXT NOT NULL,
            teacher_id INTEGER NOT NULL REFERENCES teachers (id) ON DELETE RESTRICT
        );
        CREATE INDEX IF NOT EXISTS ix_courses_teacher_id ON courses (teacher_id);

        CREATE TABLE IF NOT EXISTS enrollments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            enroll_date TEXT NOT NULL,
            grade INTEGER NOT NULL,
            student_id INTEGER NOT NULL REFERENCES students (id) ON DELETE RESTRICT,
            course_id INTEGER NOT NULL REFERENCES courses (id) ON DELETE RESTRICT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS {ENROLLMENT_PAIR_INDEX}
            ON enrollments (student_id, course_id);
        CREATE INDEX IF NOT EXISTS ix_enrollments_course_id ON enrollments (course_id);"
    ))
    .map_err(unavailable("failed to create school schema"))?;

    let stored_collation: String = conn
        .query_row(
            &format!(
                "SELECT coll FROM pragma_index_xinfo('{TEACHER_EMAIL_INDEX}') WHERE key = 1 AND cid >= 0"
            ),
            [],
            |row| row.get(0),
        )
        .map_err(unavailable("failed to read teacher email collation"))?;
    if !stored_collation.eq_ignore_ascii_case(email_collation) {
        return Err(StorageError::Unavailable(format!(
            "database matches teacher emails with {stored_collation} but {} was configured",
            email_policy.label()
        )));
    }

    Ok(())
}

struct SqliteTable<E> {
    conn: Arc<Mutex<Connection>>,
    _kind: PhantomData<fn() -> E>,
}

impl<E: SqlRecord> SqliteTable<E> {
    fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            _kind: PhantomData,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn select_columns() -> String {
        format!("id, {}", E::COLUMNS.join(", "))
    }

    fn query(&self, clause: Option<(String, Vec<Value>)>) -> Result<Vec<E>, StorageError> {
        let conn = self.lock()?;
        let (where_sql, values) = match clause {
            Some((sql, values)) => (format!(" WHERE {sql}"), values),
            None => (String::new(), Vec::new()),
        };
        let sql = format!(
            "SELECT {} FROM {}{where_sql} ORDER BY id",
            Self::select_columns(),
            E::TABLE
        );

        let mut stmt = conn.prepare(&sql).map_err(classify)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), |row| E::from_row(row))
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        Ok(records)
    }

    fn missing(id: E::Id) -> StorageError {
        StorageError::MissingRecord {
            kind: E::KIND,
            id: id.raw(),
        }
    }
}

impl<E: SqlRecord> Table<E> for SqliteTable<E> {
    fn find_all(&self) -> Result<Vec<E>, StorageError> {
        self.query(None)
    }

    fn find_by_id(&self, id: E::Id) -> Result<Option<E>, StorageError> {
        let found = self.query(Some(("id = ?1".to_string(), vec![Value::Integer(id.raw())])))?;
        Ok(found.into_iter().next())
    }

    fn find_where(&self, filter: &E::Filter) -> Result<Vec<E>, StorageError> {
        self.query(Some(E::filter_clause(filter)))
    }

    fn exists(&self, filter: &E::Filter) -> Result<bool, StorageError> {
        let (clause, values) = E::filter_clause(filter);
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE {clause})", E::TABLE);
        let conn = self.lock()?;
        conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .map_err(classify)
    }

    fn insert(&self, draft: E::Draft) -> Result<E, StorageError> {
        let values = E::draft_values(&draft);
        let placeholders = (1..=values.len())
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            E::TABLE,
            E::COLUMNS.join(", ")
        );

        let conn = self.lock()?;
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(classify)?;
        let id = E::Id::from_raw(conn.last_insert_rowid());
        Ok(E::from_draft(id, draft))
    }

    fn update(&self, record: &E) -> Result<(), StorageError> {
        let mut values = record.values();
        let assignments = E::COLUMNS
            .iter()
            .enumerate()
            .map(|(position, column)| format!("{column} = ?{}", position + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE id = ?{}",
            E::TABLE,
            values.len() + 1
        );
        values.push(Value::Integer(record.id().raw()));

        let conn = self.lock()?;
        let updated = conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(classify)?;
        if updated == 0 {
            Err(Self::missing(record.id()))
        } else {
            Ok(())
        }
    }

    fn delete(&self, id: E::Id) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", E::TABLE);
        let conn = self.lock()?;
        let deleted = conn.execute(&sql, params![id.raw()]).map_err(classify)?;
        if deleted == 0 {
            Err(Self::missing(id))
        } else {
            Ok(())
        }
    }

    fn count(&self) -> Result<usize, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0)).map_err(classify)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn unavailable(context: &'static str) -> impl Fn(SqlError) -> StorageError {
    move |err| StorageError::Unavailable(format!("{context}: {err}"))
}

/// Sort SQLite failures into the storage taxonomy. Unique-index hits are
/// reported against the index name so managers can translate them.
fn classify(err: SqlError) -> StorageError {
    if let SqlError::SqliteFailure(failure, message) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            let message = message.clone().unwrap_or_else(|| err.to_string());
            return match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    StorageError::UniqueViolation {
                        index: unique_index_for(&message),
                    }
                }
                _ => StorageError::Constraint(message),
            };
        }
    }
    StorageError::Unavailable(err.to_string())
}

fn unique_index_for(message: &str) -> String {
    if message.contains("teachers.email") || message.contains(TEACHER_EMAIL_INDEX) {
        TEACHER_EMAIL_INDEX.to_string()
    } else if message.contains("enrollments.student_id") || message.contains(ENROLLMENT_PAIR_INDEX)
    {
        ENROLLMENT_PAIR_INDEX.to_string()
    } else {
        message.to_string()
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn date(value: chrono::NaiveDate) -> Value {
    Value::Text(value.format("%Y-%m-%d").to_string())
}

impl SqlRecord for Teacher {
    const TABLE: &'static str = "teachers";
    const COLUMNS: &'static [&'static str] = &["full_name", "email", "hire_date"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Teacher {
            id: RecordId::from_raw(row.get(0)?),
            full_name: row.get(1)?,
            email: row.get(2)?,
            hire_date: row.get(3)?,
        })
    }

    fn draft_values(draft: &Self::Draft) -> Vec<Value> {
        vec![text(&draft.full_name), text(&draft.email), date(draft.hire_date)]
    }

    fn values(&self) -> Vec<Value> {
        vec![text(&self.full_name), text(&self.email), date(self.hire_date)]
    }

    fn filter_clause(filter: &TeacherFilter) -> (String, Vec<Value>) {
        match filter {
            TeacherFilter::Id(id) => ("id = ?1".to_string(), vec![Value::Integer(id.0)]),
            TeacherFilter::Email {
                address,
                policy,
                excluding,
            } => {
                let collation = match policy {
                    EmailPolicy::CaseSensitive => "BINARY",
                    EmailPolicy::CaseInsensitive => "NOCASE",
                };
                let mut clause = format!("email = ?1 COLLATE {collation}");
                let mut values = vec![text(address)];
                if let Some(excluded) = excluding {
                    clause.push_str(" AND id <> ?2");
                    values.push(Value::Integer(excluded.0));
                }
                (clause, values)
            }
        }
    }
}

impl SqlRecord for Student {
    const TABLE: &'static str = "students";
    const COLUMNS: &'static [&'static str] = &["full_name", "birth_date", "is_active"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Student {
            id: RecordId::from_raw(row.get(0)?),
            full_name: row.get(1)?,
            birth_date: row.get(2)?,
            is_active: row.get(3)?,
        })
    }

    fn draft_values(draft: &Self::Draft) -> Vec<Value> {
        vec![
            text(&draft.full_name),
            date(draft.birth_date),
            Value::Integer(i64::from(draft.is_active)),
        ]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.full_name),
            date(self.birth_date),
            Value::Integer(i64::from(self.is_active)),
        ]
    }

    fn filter_clause(filter: &StudentFilter) -> (String, Vec<Value>) {
        match filter {
            StudentFilter::Id(id) => ("id = ?1".to_string(), vec![Value::Integer(id.0)]),
        }
    }
}

impl SqlRecord for Course {
    const TABLE: &'static str = "courses";
    const COLUMNS: &'static [&'static str] = &["title", "description", "start_date", "teacher_id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Course {
            id: RecordId::from_raw(row.get(0)?),
            title: row.get(1)?,
            description: row.get(2)?,
            start_date: row.get(3)?,
            teacher_id: RecordId::from_raw(row.get(4)?),
        })
    }

    fn draft_values(draft: &Self::Draft) -> Vec<Value> {
        vec![
            text(&draft.title),
            draft.description.as_deref().map_or(Value::Null, text),
            date(draft.start_date),
            Value::Integer(draft.teacher_id.0),
        ]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.title),
            self.description.as_deref().map_or(Value::Null, text),
            date(self.start_date),
            Value::Integer(self.teacher_id.0),
        ]
    }

    fn filter_clause(filter: &CourseFilter) -> (String, Vec<Value>) {
        match filter {
            CourseFilter::Id(id) => ("id = ?1".to_string(), vec![Value::Integer(id.0)]),
            CourseFilter::Teacher(teacher_id) => (
                "teacher_id = ?1".to_string(),
                vec![Value::Integer(teacher_id.0)],
            ),
        }
    }
}

impl SqlRecord for Enrollment {
    const TABLE: &'static str = "enrollments";
    const COLUMNS: &'static [&'static str] = &["enroll_date", "grade", "student_id", "course_id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Enrollment {
            id: RecordId::from_raw(row.get(0)?),
            enroll_date: row.get(1)?,
            grade: Grade::from_hundredths(row.get(2)?),
            student_id: RecordId::from_raw(row.get(3)?),
            course_id: RecordId::from_raw(row.get(4)?),
        })
    }

    fn draft_values(draft: &Self::Draft) -> Vec<Value> {
        vec![
            date(draft.enroll_date),
            Value::Integer(draft.grade.hundredths()),
            Value::Integer(draft.student_id.0),
            Value::Integer(draft.course_id.0),
        ]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            date(self.enroll_date),
            Value::Integer(self.grade.hundredths()),
            Value::Integer(self.student_id.0),
            Value::Integer(self.course_id.0),
        ]
    }

    fn filter_clause(filter: &EnrollmentFilter) -> (String, Vec<Value>) {
        match filter {
            EnrollmentFilter::Id(id) => ("id = ?1".to_string(), vec![Value::Integer(id.0)]),
            EnrollmentFilter::Student(student_id) => (
                "student_id = ?1".to_string(),
                vec![Value::Integer(student_id.0)],
            ),
            EnrollmentFilter::Course(course_id) => (
                "course_id = ?1".to_string(),
                vec![Value::Integer(course_id.0)],
            ),
            EnrollmentFilter::Pair {
                student_id,
                course_id,
                excluding,
            } => {
                let mut clause = "student_id = ?1 AND course_id = ?2".to_string();
                let mut values = vec![
                    Value::Integer(student_id.0),
                    Value::Integer(course_id.0),
                ];
                if let Some(excluded) = excluding {
                    clause.push_str(" AND id <> ?3");
                    values.push(Value::Integer(excluded.0));
                }
                (clause, values)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::domain::{NewCourse, NewTeacher, TeacherId};
    use chrono::NaiveDate;

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn teacher(email: &str) -> NewTeacher {
        NewTeacher {
            full_name: "Grace Hopper".to_string(),
            email: email.to_string(),
            hire_date: day(2018, 6, 1),
        }
    }

    #[test]
    fn round_trips_rows_and_assigns_ids() {
        let store = SqliteStore::open_in_memory(EmailPolicy::CaseSensitive).unwrap();
        let created = store.teachers().insert(teacher("grace@school.edu")).unwrap();
        assert_eq!(created.id, TeacherId(1));

        let loaded = store.teachers().find_by_id(created.id).unwrap();
        assert_eq!(loaded, Some(created));
    }

    #[test]
    fn unique_email_violation_names_the_index() {
        let store = SqliteStore::open_in_memory(EmailPolicy::CaseSensitive).unwrap();
        store.teachers().insert(teacher("grace@school.edu")).unwrap();
        let err = store.teachers().insert(teacher("grace@school.edu")).unwrap_err();
        assert!(err.violates(TEACHER_EMAIL_INDEX), "got {err:?}");

        // Binary collation keeps differently cased addresses distinct.
        store.teachers().insert(teacher("Grace@school.edu")).unwrap();
    }

    #[test]
    fn nocase_collation_backs_case_insensitive_policy() {
        let store = SqliteStore::open_in_memory(EmailPolicy::CaseInsensitive).unwrap();
        store.teachers().insert(teacher("grace@school.edu")).unwrap();
        let err = store.teachers().insert(teacher("GRACE@school.edu")).unwrap_err();
        assert!(err.violates(TEACHER_EMAIL_INDEX), "got {err:?}");
    }

    #[test]
    fn foreign_keys_surface_as_constraint_errors() {
        let store = SqliteStore::open_in_memory(EmailPolicy::CaseSensitive).unwrap();
        let err = store
            .courses()
            .insert(NewCourse {
                title: "Compilers".to_string(),
                description: None,
                start_date: day(2024, 9, 1),
                teacher_id: TeacherId(42),
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)), "got {err:?}");
    }

    #[test]
    fn update_of_missing_row_reports_missing_record() {
        let store = SqliteStore::open_in_memory(EmailPolicy::CaseSensitive).unwrap();
        let mut created = store.teachers().insert(teacher("grace@school.edu")).unwrap();
        store.teachers().delete(created.id).unwrap();
        created.full_name = "Rear Admiral Hopper".to_string();

        match store.teachers().update(&created) {
            Err(StorageError::MissingRecord { kind: "Teacher", .. }) => {}
            other => panic!("expected missing record, got {other:?}"),
        }
    }
}
