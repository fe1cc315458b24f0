use crate::infra::{parse_email_matching, prepare_store};
use clap::Args;
use school_records::error::AppError;
use school_records::records::{EmailPolicy, SqliteStore};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct SeedArgs {
    /// SQLite file to create or top up; parent directories are created
    #[arg(long)]
    pub(crate) database: PathBuf,
    /// Teacher email comparison baked into the unique index
    #[arg(long, value_parser = parse_email_matching, default_value = "case_sensitive")]
    pub(crate) email_matching: EmailPolicy,
}

pub(crate) fn run_seed(args: SeedArgs) -> Result<(), AppError> {
    let store = SqliteStore::open(&args.database, args.email_matching)?;
    let summary = prepare_store(&store, true)?;

    println!("School records database: {}", args.database.display());
    println!("- email matching: {}", args.email_matching.label());
    println!("- {} teachers", summary.teachers);
    println!("- {} students", summary.students);
    println!("- {} courses", summary.courses);
    println!("- {} enrollments", summary.enrollments);
    Ok(())
}
