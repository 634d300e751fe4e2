//! Dedup & ledger coordination: decides, per URL, whether work is needed.
//!
//! Databases are consulted in registration order and the first decisive
//! answer wins:
//!
//! 1. every database says `should_process` → **proceed** (then `started` on each);
//! 2. first database with `should_process == false` and `exists` → **cached**;
//! 3. first database with `should_process == false` and `!exists` → **skip**.
//!
//! A database whose call fails is not decisive: its failure is reported and
//! the next database is consulted.

use std::sync::Arc;

use tracing::{debug, warn};

use archivist_shared::ArchiveResult;

use crate::contracts::Database;
use crate::guard::stage_call;

/// Outcome of the dedup check for one URL.
#[derive(Debug)]
pub enum Decision {
    /// Process the URL; `started` has been signalled to every database.
    Proceed,
    /// A ledger already holds the result.
    Cached { database: String, result: ArchiveResult },
    /// A ledger asked to skip the URL.
    Skip { database: String },
}

/// A ledger call that failed during coordination.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerFailure {
    pub database: String,
    pub message: String,
}

/// Consults the registered databases for one URL.
pub struct DedupCoordinator<'a> {
    databases: &'a [Arc<dyn Database>],
}

impl<'a> DedupCoordinator<'a> {
    pub fn new(databases: &'a [Arc<dyn Database>]) -> Self {
        Self { databases }
    }

    /// Decide what to do with `url`, collecting isolated ledger failures.
    pub async fn check(&self, url: &str, failures: &mut Vec<LedgerFailure>) -> Decision {
        for db in self.databases {
            let name = db.name();

            let should_process = match stage_call(db.should_process(url)).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(url, database = name, error = %e, "should_process failed, ignoring ledger");
                    failures.push(failure(name, e));
                    continue;
                }
            };
            if should_process {
                continue;
            }

            match stage_call(db.exists(url)).await {
                Ok(true) => match stage_call(db.fetch(url)).await {
                    Ok(result) => {
                        debug!(url, database = name, "serving cached result");
                        return Decision::Cached {
                            database: name.to_string(),
                            result: result.into_cached(),
                        };
                    }
                    Err(e) => {
                        warn!(url, database = name, error = %e, "fetch failed, ignoring ledger");
                        failures.push(failure(name, e));
                    }
                },
                Ok(false) => {
                    debug!(url, database = name, "ledger asked to skip");
                    return Decision::Skip {
                        database: name.to_string(),
                    };
                }
                Err(e) => {
                    warn!(url, database = name, error = %e, "exists failed, ignoring ledger");
                    failures.push(failure(name, e));
                }
            }
        }

        for db in self.databases {
            if let Err(e) = stage_call(db.started(url)).await {
                warn!(url, database = db.name(), error = %e, "started failed");
                failures.push(failure(db.name(), e));
            }
        }

        Decision::Proceed
    }
}

fn failure(database: &str, error: impl std::fmt::Display) -> LedgerFailure {
    LedgerFailure {
        database: database.to_string(),
        message: error.to_string(),
    }
}
