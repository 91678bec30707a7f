//! Command implementations

mod core;
mod import;
mod ops;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ledgermesh_core::{
    Database, ImportService, OpsService, Reconciler, ReconcilerConfig, SmsParser, SystemClock,
};

pub use self::core::{cmd_init, cmd_reconcile, cmd_review, cmd_status};
pub use self::import::cmd_import;
pub use self::ops::{cmd_edit, cmd_history, cmd_merge, cmd_split};

/// Open the database, honoring the encryption flag
pub(crate) fn open_db(path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = path.to_string_lossy();
    let db = if no_encrypt {
        Database::new_unencrypted(&path_str)
    } else {
        Database::new(&path_str)
    };
    db.with_context(|| format!("Failed to open database at {}", path.display()))
}

/// The long-lived service set, built once per invocation
pub(crate) struct Services {
    pub db: Database,
    pub import: Arc<ImportService>,
    pub reconciler: Arc<Reconciler>,
    pub ops: OpsService,
}

pub(crate) fn build_services(
    db: Database,
    sms_source: Arc<dyn ledgermesh_core::SmsSource>,
) -> Result<Services> {
    let clock = Arc::new(SystemClock);
    let reconciler = Arc::new(Reconciler::new(
        db.clone(),
        ReconcilerConfig::default(),
        clock.clone(),
    )?);
    let sms_parser = Arc::new(SmsParser::new(ledgermesh_core::default_profiles()));
    let import = Arc::new(ImportService::new(
        db.clone(),
        sms_parser,
        sms_source,
        reconciler.clone(),
        clock.clone(),
    ));
    let ops = OpsService::new(db.clone(), clock);
    Ok(Services {
        db,
        import,
        reconciler,
        ops,
    })
}
