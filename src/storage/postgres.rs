use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use time::Date;
use tracing::debug;

use super::{IntakeStore, IntakeTx, StoreError, StoreResult, WeightStore};
use crate::intake::repo_types::{
    DailyLog, Food, FoodLineDetail, MealReference, NewFoodLine, UpsertOutcome,
};
use crate::weights::repo_types::WeightEntry;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

pub struct PgIntakeTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IntakeStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn IntakeTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgIntakeTx { tx }))
    }

    async fn find_daily_log(&self, user_id: i64, log_date: Date) -> StoreResult<Option<DailyLog>> {
        let log = sqlx::query_as::<_, DailyLog>(
            r#"
            SELECT id, user_id, log_date
            FROM daily_logs
            WHERE user_id = $1 AND log_date = $2
            "#,
        )
        .bind(user_id)
        .bind(log_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(log)
    }

    async fn food_lines_for_day(&self, daily_log_id: i64) -> StoreResult<Vec<FoodLineDetail>> {
        let rows = sqlx::query_as::<_, FoodLineDetail>(
            r#"
            SELECT dlf.daily_log_id, dlf.food_id, dlf.meal_id, m.meal_type, dlf.meal_name,
                   dlf.mass_grams, f.name, f.calories, f.proteins, f.fats, f.carbohydrates,
                   f.sugars, f.fiber, f.salt, f.image_url
              FROM daily_log_foods dlf
              JOIN foods f ON f.id = dlf.food_id
              JOIN meals m ON m.id = dlf.meal_id
             WHERE dlf.daily_log_id = $1
             ORDER BY dlf.meal_id, dlf.food_id
            "#,
        )
        .bind(daily_log_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn foods_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Food>> {
        let foods = sqlx::query_as::<_, Food>(
            r#"
            SELECT id, name, calories, proteins, fats, carbohydrates, sugars, fiber, salt, image_url
              FROM foods
             WHERE id = ANY($1)
             ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(foods)
    }

    async fn meal_types(&self) -> StoreResult<Vec<MealReference>> {
        let meals = sqlx::query_as::<_, MealReference>(
            r#"SELECT id, meal_type FROM meals ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(meals)
    }
}

#[async_trait]
impl IntakeTx for PgIntakeTx {
    async fn get_or_create_daily_log(
        &mut self,
        user_id: i64,
        log_date: Date,
    ) -> StoreResult<DailyLog> {
        // A concurrent insert of the same pair blocks here until the other
        // transaction finishes, then falls through to the locking select.
        let created = sqlx::query_as::<_, DailyLog>(
            r#"
            INSERT INTO daily_logs (user_id, log_date)
            VALUES ($1, $2)
            ON CONFLICT (user_id, log_date) DO NOTHING
            RETURNING id, user_id, log_date
            "#,
        )
        .bind(user_id)
        .bind(log_date)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(log) = created {
            debug!(daily_log_id = log.id, user_id, %log_date, "daily log created");
            return Ok(log);
        }

        sqlx::query_as::<_, DailyLog>(
            r#"
            SELECT id, user_id, log_date
              FROM daily_logs
             WHERE user_id = $1 AND log_date = $2
               FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(log_date)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::UniqueGuard("daily log"))
    }

    async fn get_or_create_meal(&mut self, meal_type: &str) -> StoreResult<MealReference> {
        let created = sqlx::query_as::<_, MealReference>(
            r#"
            INSERT INTO meals (meal_type)
            VALUES ($1)
            ON CONFLICT (meal_type) DO NOTHING
            RETURNING id, meal_type
            "#,
        )
        .bind(meal_type)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(meal) = created {
            debug!(meal_id = meal.id, meal_type, "meal type created");
            return Ok(meal);
        }

        // Meal rows are shared by every user; a key-share lock keeps the row
        // alive without serializing unrelated users.
        sqlx::query_as::<_, MealReference>(
            r#"
            SELECT id, meal_type
              FROM meals
             WHERE meal_type = $1
               FOR KEY SHARE
            "#,
        )
        .bind(meal_type)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::UniqueGuard("meal type"))
    }

    async fn meal_by_id(&mut self, meal_id: i64) -> StoreResult<Option<MealReference>> {
        let meal = sqlx::query_as::<_, MealReference>(
            r#"SELECT id, meal_type FROM meals WHERE id = $1 FOR KEY SHARE"#,
        )
        .bind(meal_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(meal)
    }

    async fn lock_daily_log(&mut self, daily_log_id: i64) -> StoreResult<Option<DailyLog>> {
        let log = sqlx::query_as::<_, DailyLog>(
            r#"
            SELECT id, user_id, log_date
              FROM daily_logs
             WHERE id = $1
               FOR UPDATE
            "#,
        )
        .bind(daily_log_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(log)
    }

    async fn upsert_food_line(&mut self, line: &NewFoodLine) -> StoreResult<UpsertOutcome> {
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO daily_log_foods (daily_log_id, food_id, meal_id, meal_name, mass_grams)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (daily_log_id, food_id, meal_id)
            DO UPDATE SET mass_grams = EXCLUDED.mass_grams,
                          meal_name = EXCLUDED.meal_name
            RETURNING (xmax = 0)
            "#,
        )
        .bind(line.daily_log_id)
        .bind(line.food_id)
        .bind(line.meal_id)
        .bind(line.meal_name.as_deref())
        .bind(line.mass_grams)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn delete_food_line(
        &mut self,
        daily_log_id: i64,
        meal_id: i64,
        food_id: i64,
    ) -> StoreResult<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM daily_log_foods
             WHERE daily_log_id = $1 AND meal_id = $2 AND food_id = $3
            "#,
        )
        .bind(daily_log_id)
        .bind(meal_id)
        .bind(food_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn delete_meal_lines(&mut self, daily_log_id: i64, meal_id: i64) -> StoreResult<u64> {
        let res = sqlx::query(
            r#"DELETE FROM daily_log_foods WHERE daily_log_id = $1 AND meal_id = $2"#,
        )
        .bind(daily_log_id)
        .bind(meal_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn delete_day_lines(&mut self, daily_log_id: i64) -> StoreResult<u64> {
        let res = sqlx::query(r#"DELETE FROM daily_log_foods WHERE daily_log_id = $1"#)
            .bind(daily_log_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WeightStore for PgStore {
    async fn insert_weight(
        &self,
        user_id: i64,
        measured_on: Date,
        weight: f64,
    ) -> StoreResult<WeightEntry> {
        let entry = sqlx::query_as::<_, WeightEntry>(
            r#"
            INSERT INTO weights (user_id, measured_on, weight)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, measured_on, weight
            "#,
        )
        .bind(user_id)
        .bind(measured_on)
        .bind(weight)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list_weights(&self, user_id: i64) -> StoreResult<Vec<WeightEntry>> {
        let rows = sqlx::query_as::<_, WeightEntry>(
            r#"
            SELECT id, user_id, measured_on, weight
              FROM weights
             WHERE user_id = $1
             ORDER BY measured_on DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_weight(&self, user_id: i64, id: i64) -> StoreResult<bool> {
        let res = sqlx::query(r#"DELETE FROM weights WHERE id = $1 AND user_id = $2"#)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    //! Run against a real database with
    //! `DATABASE_URL=postgres://... cargo test -- --ignored`.

    use std::time::Duration;

    use super::*;
    use crate::intake::commands::{IntakeItem, MealSelector, RecordIntake};
    use crate::intake::services::record_intake;
    use time::macros::date;

    async fn seed_food(pool: &PgPool, id: i64) {
        sqlx::query(
            r#"
            INSERT INTO foods (id, name, calories, proteins, fats, carbohydrates)
            VALUES ($1, 'Oats', 50, 5, 1, 10)
            "#,
        )
        .bind(id)
        .execute(pool)
        .await
        .expect("seed food");
    }

    fn elevenses(log_date: Date, food_id: i64) -> RecordIntake {
        RecordIntake {
            log_date,
            meal: MealSelector::ByType("Elevenses".into()),
            display_name: None,
            items: vec![IntakeItem {
                food_id,
                mass_grams: 100.0,
            }],
        }
    }

    async fn row_counts(pool: &PgPool, user_id: i64, log_date: Date) -> (i64, i64) {
        let days: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM daily_logs WHERE user_id = $1 AND log_date = $2",
        )
        .bind(user_id)
        .bind(log_date)
        .fetch_one(pool)
        .await
        .expect("count days");
        let meals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meals WHERE meal_type = 'Elevenses'")
            .fetch_one(pool)
            .await
            .expect("count meals");
        (days, meals)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn daily_log_get_or_create_is_idempotent(pool: PgPool) {
        let store = PgStore::new(pool);
        let day = date!(2025 - 01 - 10);

        let mut tx = store.begin().await.unwrap();
        let first = tx.get_or_create_daily_log(1, day).await.unwrap();
        let again = tx.get_or_create_daily_log(1, day).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(first, again);

        let mut tx = store.begin().await.unwrap();
        let later = tx.get_or_create_daily_log(1, day).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(first.id, later.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn upsert_updates_existing_triple(pool: PgPool) {
        seed_food(&pool, 7).await;
        let store = PgStore::new(pool.clone());
        let mut tx = store.begin().await.unwrap();
        let log = tx.get_or_create_daily_log(1, date!(2025 - 01 - 10)).await.unwrap();
        let meal = tx.get_or_create_meal("Breakfast").await.unwrap();
        let mut line = NewFoodLine {
            daily_log_id: log.id,
            food_id: 7,
            meal_id: meal.id,
            meal_name: None,
            mass_grams: 100.0,
        };
        assert_eq!(tx.upsert_food_line(&line).await.unwrap(), UpsertOutcome::Inserted);
        line.mass_grams = 250.0;
        assert_eq!(tx.upsert_food_line(&line).await.unwrap(), UpsertOutcome::Updated);
        tx.commit().await.unwrap();

        let lines = store.food_lines_for_day(log.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].mass_grams, 250.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn dropped_transaction_rolls_back(pool: PgPool) {
        let store = PgStore::new(pool);
        let day = date!(2025 - 02 - 01);
        {
            let mut tx = store.begin().await.unwrap();
            tx.get_or_create_daily_log(9, day).await.unwrap();
        }
        assert!(store.find_daily_log(9, day).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn writer_blocked_on_uncommitted_insert_reuses_its_rows(pool: PgPool) {
        seed_food(&pool, 7).await;
        let store = PgStore::new(pool.clone());
        let day = date!(2025 - 03 - 01);

        let mut first = store.begin().await.unwrap();
        let log = first.get_or_create_daily_log(1, day).await.unwrap();
        let meal = first.get_or_create_meal("Elevenses").await.unwrap();

        let racing = store.clone();
        let second = tokio::spawn(async move { record_intake(&racing, 1, &elevenses(day, 7)).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!second.is_finished(), "second writer should wait on the unique key");

        first.commit().await.unwrap();
        let recorded = second.await.unwrap().unwrap();
        assert_eq!(recorded.daily_log_id, log.id);
        assert_eq!(recorded.meal_id, meal.id);
        assert_eq!(row_counts(&pool, 1, day).await, (1, 1));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_record_intake_creates_one_day_and_one_meal(pool: PgPool) {
        seed_food(&pool, 7).await;
        seed_food(&pool, 8).await;
        let store = PgStore::new(pool.clone());
        let day = date!(2025 - 03 - 02);

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    record_intake(&store, 1, &elevenses(day, 7 + i % 2)).await
                })
            })
            .collect();
        let mut day_ids = Vec::new();
        for handle in handles {
            day_ids.push(handle.await.unwrap().unwrap().daily_log_id);
        }
        day_ids.dedup();
        assert_eq!(day_ids.len(), 1);
        assert_eq!(row_counts(&pool, 1, day).await, (1, 1));
        assert_eq!(store.food_lines_for_day(day_ids[0]).await.unwrap().len(), 2);
    }
}
