use metrics_exporter_prometheus::PrometheusHandle;
use school_records::config::{parse_email_policy, AppConfig, StorageBackend};
use school_records::error::AppError;
use school_records::records::{
    seed_if_empty, EmailPolicy, MemoryStore, SchoolStore, SeedSummary, SqliteStore,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store selected by `APP_STORAGE`, opened and ready for the managers.
pub(crate) enum OpenedStore {
    Memory(Arc<MemoryStore>),
    Sqlite(Arc<SqliteStore>),
}

pub(crate) fn open_store(config: &AppConfig) -> Result<OpenedStore, AppError> {
    let policy = config.records.email_policy;
    let opened = match config.storage.backend {
        StorageBackend::Memory => OpenedStore::Memory(Arc::new(MemoryStore::new(policy))),
        StorageBackend::Sqlite => OpenedStore::Sqlite(Arc::new(SqliteStore::open(
            &config.storage.database_path,
            policy,
        )?)),
    };
    info!(
        backend = config.storage.backend.label(),
        email_matching = policy.label(),
        "record store opened"
    );
    Ok(opened)
}

/// Seed an empty store when enabled and report the resulting row counts.
pub(crate) fn prepare_store(store: &dyn SchoolStore, seed: bool) -> Result<SeedSummary, AppError> {
    if seed && seed_if_empty(store)? {
        info!("loaded starter records into empty store");
    }
    let summary = SeedSummary::collect(store)?;
    info!(
        teachers = summary.teachers,
        students = summary.students,
        courses = summary.courses,
        enrollments = summary.enrollments,
        "record store ready"
    );
    Ok(summary)
}

pub(crate) fn parse_email_matching(raw: &str) -> Result<EmailPolicy, String> {
    parse_email_policy(raw).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_store_seeds_only_when_asked() {
        let untouched = MemoryStore::default();
        let summary = prepare_store(&untouched, false).expect("store ready");
        assert!(summary.is_empty());

        let seeded = MemoryStore::default();
        let summary = prepare_store(&seeded, true).expect("store ready");
        assert_eq!(summary.teachers, 2);
        assert_eq!(summary.enrollments, 5);

        let again = prepare_store(&seeded, true).expect("store ready");
        assert_eq!(again, summary);
    }

    #[test]
    fn email_matching_flag_parses_known_policies() {
        assert_eq!(
            parse_email_matching("case_insensitive"),
            Ok(EmailPolicy::CaseInsensitive)
        );
        assert!(parse_email_matching("fuzzy").is_err());
    }
}
