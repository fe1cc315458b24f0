use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::domain::{Course, EmailPolicy, Enrollment, RecordId, Student, Teacher};
use super::store::{
    Entity, RecordFilter, SchoolStore, StorageError, Table, ENROLLMENT_PAIR_INDEX,
    TEACHER_EMAIL_INDEX,
};

type IndexKey<E> = Box<dyn Fn(&E) -> String + Send + Sync>;

/// Unique index enforced atomically with every write to a [`MemoryTable`].
pub struct UniqueIndex<E> {
    name: &'static str,
    key: IndexKey<E>,
}

impl<E> UniqueIndex<E> {
    pub fn new(name: &'static str, key: impl Fn(&E) -> String + Send + Sync + 'static) -> Self {
        Self {
            name,
            key: Box::new(key),
        }
    }
}

struct Rows<E: Entity> {
    records: BTreeMap<E::Id, E>,
    next_id: i64,
}

/// Mutex-guarded table; ids start at 1 and are never reused.
pub struct MemoryTable<E: Entity> {
    rows: Mutex<Rows<E>>,
    indexes: Vec<UniqueIndex<E>>,
}

impl<E: Entity> MemoryTable<E> {
    pub fn new(indexes: Vec<UniqueIndex<E>>) -> Self {
        Self {
            rows: Mutex::new(Rows {
                records: BTreeMap::new(),
                next_id: 1,
            }),
            indexes,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Rows<E>>, StorageError> {
        self.rows
            .lock()
            .map_err(|_| StorageError::Unavailable(format!("{} table lock poisoned", E::KIND)))
    }

    fn check_indexes(&self, rows: &Rows<E>, candidate: &E) -> Result<(), StorageError> {
        for index in &self.indexes {
            let key = (index.key)(candidate);
            let taken = rows
                .records
                .values()
                .any(|existing| existing.id() != candidate.id() && (index.key)(existing) == key);
            if taken {
                return Err(StorageError::UniqueViolation {
                    index: index.name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<E: Entity> Table<E> for MemoryTable<E> {
    fn find_all(&self) -> Result<Vec<E>, StorageError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    fn find_by_id(&self, id: E::Id) -> Result<Option<E>, StorageError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    fn find_where(&self, filter: &E::Filter) -> Result<Vec<E>, StorageError> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn exists(&self, filter: &E::Filter) -> Result<bool, StorageError> {
        Ok(self
            .lock()?
            .records
            .values()
            .any(|record| filter.matches(record)))
    }

    fn insert(&self, draft: E::Draft) -> Result<E, StorageError> {
        let mut rows = self.lock()?;
        let record = E::from_draft(E::Id::from_raw(rows.next_id), draft);
        self.check_indexes(&rows, &record)?;
        rows.next_id += 1;
        rows.records.insert(record.id(), record.clone());
        Ok(record)
    }

    fn update(&self, record: &E) -> Result<(), StorageError> {
        let mut rows = self.lock()?;
        if !rows.records.contains_key(&record.id()) {
            return Err(StorageError::MissingRecord {
                kind: E::KIND,
                id: record.id().raw(),
            });
        }
        self.check_indexes(&rows, record)?;
        rows.records.insert(record.id(), record.clone());
        Ok(())
    }

    fn delete(&self, id: E::Id) -> Result<(), StorageError> {
        match self.lock()?.records.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StorageError::MissingRecord {
                kind: E::KIND,
                id: id.raw(),
            }),
        }
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.records.len())
    }
}

/// In-process store used by default and throughout the tests. Only the
/// declared unique indexes are enforced; foreign keys are left to the managers.
pub struct MemoryStore {
    teachers: MemoryTable<Teacher>,
    students: MemoryTable<Student>,
    courses: MemoryTable<Course>,
    enrollments: MemoryTable<Enrollment>,
}

impl MemoryStore {
    pub fn new(email_policy: EmailPolicy) -> Self {
        Self {
            teachers: MemoryTable::new(vec![UniqueIndex::new(
                TEACHER_EMAIL_INDEX,
                move |teacher: &Teacher| email_policy.index_key(&teacher.email),
            )]),
            students: MemoryTable::new(Vec::new()),
            courses: MemoryTable::new(Vec::new()),
            enrollments: MemoryTable::new(vec![UniqueIndex::new(
                ENROLLMENT_PAIR_INDEX,
                |enrollment: &Enrollment| {
                    format!("{}:{}", enrollment.student_id, enrollment.course_id)
                },
            )]),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(EmailPolicy::default())
    }
}

impl SchoolStore for MemoryStore {
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
