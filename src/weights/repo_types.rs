use sqlx::FromRow;
use time::Date;

/// One weight measurement. Several per day are allowed.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct WeightEntry {
    pub id: i64,
    pub user_id: i64,
    pub measured_on: Date,
    pub weight: f64,
}
