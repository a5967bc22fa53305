mod graph;
mod resource;

pub use graph::MariadbTx;

use sqlx::MySqlPool;

use gim_slo::{errors, Result};

#[derive(Clone, Debug)]
pub struct MariadbStore {
    pool: MySqlPool,
}

impl MariadbStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Unique-key violations surface as conflicts, everything else as an
/// infrastructure failure.
fn db_error(err: sqlx::Error) -> errors::WithBacktrace {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            errors::conflict(db.message())
        }
        _ => errors::any(err),
    }
}

fn parse_id(id: &str) -> Result<u64> {
    id.parse::<u64>().map_err(|err| errors::bad_request(&err))
}

/// Comma separated list of validated numeric ids, for `IN (...)`.
fn id_list(ids: &[String]) -> Result<String> {
    let mut parsed = ids
        .iter()
        .map(|id| parse_id(id))
        .collect::<Result<Vec<u64>>>()?;
    parsed.sort_unstable();
    parsed.dedup();
    Ok(parsed
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(","))
}
