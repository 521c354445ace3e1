//! Storage seam for the intake engine and weight history.
//!
//! Handlers and services never reach for a global pool: they receive an
//! `IntakeStore` / `WeightStore` through `AppState` and open a unit of work
//! with [`IntakeStore::begin`]. Dropping an [`IntakeTx`] without calling
//! [`IntakeTx::commit`] discards every write made through it.

use async_trait::async_trait;
use thiserror::Error;
use time::Date;

use crate::intake::repo_types::{
    DailyLog, Food, FoodLineDetail, MealReference, NewFoodLine, UpsertOutcome,
};
use crate::weights::repo_types::WeightEntry;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// SQLSTATEs a row lock can end in: serialization_failure, deadlock_detected,
/// lock_not_available. The whole transaction is safe to retry after any of them.
const LOCK_CONTENTION_STATES: [&str; 3] = ["40001", "40P01", "55P03"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    /// Lock acquisition failed; nothing was written.
    #[error("lock contention: {0}")]
    Contended(#[source] sqlx::Error),
    /// The get-or-insert primitive found neither a fresh nor an existing row.
    #[error("could not resolve a unique {0}")]
    UniqueGuard(&'static str),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub fn is_lock_contention(sqlstate: &str) -> bool {
    LOCK_CONTENTION_STATES.contains(&sqlstate)
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let contended = e
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| is_lock_contention(&code));
        if contended {
            StoreError::Contended(e)
        } else {
            StoreError::Database(e)
        }
    }
}

#[async_trait]
pub trait IntakeStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn IntakeTx>>;

    async fn find_daily_log(&self, user_id: i64, log_date: Date) -> StoreResult<Option<DailyLog>>;

    /// Food lines of one day joined with catalog and meal data, ordered by meal then food.
    async fn food_lines_for_day(&self, daily_log_id: i64) -> StoreResult<Vec<FoodLineDetail>>;

    async fn foods_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Food>>;

    async fn meal_types(&self) -> StoreResult<Vec<MealReference>>;
}

/// One all-or-nothing unit of work.
#[async_trait]
pub trait IntakeTx: Send {
    /// Atomic get-or-insert keyed by (user_id, log_date). The returned row stays
    /// locked until the transaction ends.
    async fn get_or_create_daily_log(&mut self, user_id: i64, log_date: Date)
        -> StoreResult<DailyLog>;

    /// Atomic get-or-insert keyed by meal type name.
    async fn get_or_create_meal(&mut self, meal_type: &str) -> StoreResult<MealReference>;

    async fn meal_by_id(&mut self, meal_id: i64) -> StoreResult<Option<MealReference>>;

    /// Loads a daily log by id and locks it for the rest of the transaction.
    async fn lock_daily_log(&mut self, daily_log_id: i64) -> StoreResult<Option<DailyLog>>;

    async fn upsert_food_line(&mut self, line: &NewFoodLine) -> StoreResult<UpsertOutcome>;

    async fn delete_food_line(
        &mut self,
        daily_log_id: i64,
        meal_id: i64,
        food_id: i64,
    ) -> StoreResult<u64>;

    async fn delete_meal_lines(&mut self, daily_log_id: i64, meal_id: i64) -> StoreResult<u64>;

    async fn delete_day_lines(&mut self, daily_log_id: i64) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait WeightStore: Send + Sync {
    async fn insert_weight(
        &self,
        user_id: i64,
        measured_on: Date,
        weight: f64,
    ) -> StoreResult<WeightEntry>;

    /// Newest first.
    async fn list_weights(&self, user_id: i64) -> StoreResult<Vec<WeightEntry>>;

    /// Returns false when no entry with that id belongs to the user.
    async fn delete_weight(&self, user_id: i64, id: i64) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    #[derive(Debug, Error)]
    #[error("{message}")]
    struct PgFailure {
        code: &'static str,
        message: &'static str,
    }

    impl DatabaseError for PgFailure {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(PgFailure {
            code,
            message: "canceling statement",
        }))
    }

    #[test]
    fn lock_failures_are_contention() {
        for code in ["40001", "40P01", "55P03"] {
            assert!(
                matches!(StoreError::from(db_error(code)), StoreError::Contended(_)),
                "{code}"
            );
        }
    }

    #[test]
    fn other_database_errors_stay_plain() {
        assert!(matches!(
            StoreError::from(db_error("23503")),
            StoreError::Database(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Database(_)
        ));
    }
}
