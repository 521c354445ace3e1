use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::Date;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{IntakeStore, IntakeTx, StoreError, StoreResult, WeightStore};
use crate::intake::commands::MEAL_VOCABULARY;
use crate::intake::repo_types::{
    DailyLog, Food, FoodLineDetail, MealReference, NewFoodLine, UpsertOutcome,
};
use crate::weights::repo_types::WeightEntry;

#[derive(Debug, Clone)]
struct StoredLine {
    meal_name: Option<String>,
    mass_grams: f64,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    foods: BTreeMap<i64, Food>,
    meals: BTreeMap<i64, MealReference>,
    daily_logs: BTreeMap<i64, DailyLog>,
    // keyed (daily_log_id, meal_id, food_id) so a range scan yields meal-then-food order
    food_lines: BTreeMap<(i64, i64, i64), StoredLine>,
    weights: BTreeMap<i64, WeightEntry>,
    last_id: i64,
    failing_food: Option<i64>,
}

impl Tables {
    /// Empty tables holding the seeded meal vocabulary, like a fresh migration.
    fn seeded() -> Self {
        let mut tables = Tables::default();
        for meal_type in MEAL_VOCABULARY {
            let id = tables.next_id();
            tables.meals.insert(
                id,
                MealReference {
                    id,
                    meal_type: meal_type.to_string(),
                },
            );
        }
        tables
    }

    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// In-process store used by tests and `AppState::fake()`.
///
/// Every transaction holds the single table lock from `begin` until it is
/// committed or dropped, and works on a private copy that replaces the shared
/// tables on commit. That makes each unit of work serializable at the cost of
/// all parallelism, which is fine for the workloads it serves.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_foods(Vec::new())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_foods(foods: impl IntoIterator<Item = Food>) -> Self {
        let tables = Tables {
            foods: foods.into_iter().map(|f| (f.id, f)).collect(),
            ..Tables::seeded()
        };
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }

    /// Replaces a catalog entry, as an external catalog correction would.
    pub async fn put_food(&self, food: Food) {
        self.tables.lock().await.foods.insert(food.id, food);
    }

    /// Makes every later write of `food_id` fail with [`StoreError::Unavailable`].
    pub async fn fail_writes_for_food(&self, food_id: i64) {
        self.tables.lock().await.failing_food = Some(food_id);
    }

    pub async fn daily_log_count(&self, user_id: i64, log_date: Date) -> usize {
        self.tables
            .lock()
            .await
            .daily_logs
            .values()
            .filter(|l| l.user_id == user_id && l.log_date == log_date)
            .count()
    }

    pub async fn meal_count(&self, meal_type: &str) -> usize {
        self.tables
            .lock()
            .await
            .meals
            .values()
            .filter(|m| m.meal_type == meal_type)
            .count()
    }

    pub async fn food_line_count(&self, daily_log_id: i64) -> usize {
        self.tables
            .lock()
            .await
            .food_lines
            .range((daily_log_id, i64::MIN, i64::MIN)..=(daily_log_id, i64::MAX, i64::MAX))
            .count()
    }
}

#[async_trait]
impl IntakeStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn IntakeTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn find_daily_log(&self, user_id: i64, log_date: Date) -> StoreResult<Option<DailyLog>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .daily_logs
            .values()
            .find(|l| l.user_id == user_id && l.log_date == log_date)
            .cloned())
    }

    async fn food_lines_for_day(&self, daily_log_id: i64) -> StoreResult<Vec<FoodLineDetail>> {
        let tables = self.tables.lock().await;
        let range = (daily_log_id, i64::MIN, i64::MIN)..=(daily_log_id, i64::MAX, i64::MAX);
        let mut rows = Vec::new();
        for (&(daily_log_id, meal_id, food_id), line) in tables.food_lines.range(range) {
            // inner join semantics: lines whose food or meal vanished are skipped
            let (Some(food), Some(meal)) = (tables.foods.get(&food_id), tables.meals.get(&meal_id))
            else {
                continue;
            };
            rows.push(FoodLineDetail {
                daily_log_id,
                food_id,
                meal_id,
                meal_type: meal.meal_type.clone(),
                meal_name: line.meal_name.clone(),
                mass_grams: line.mass_grams,
                name: food.name.clone(),
                calories: food.calories,
                proteins: food.proteins,
                fats: food.fats,
                carbohydrates: food.carbohydrates,
                sugars: food.sugars,
                fiber: food.fiber,
                salt: food.salt,
                image_url: food.image_url.clone(),
            });
        }
        Ok(rows)
    }

    async fn foods_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Food>> {
        let tables = self.tables.lock().await;
        let mut foods: Vec<Food> = ids
            .iter()
            .filter_map(|id| tables.foods.get(id).cloned())
            .collect();
        foods.sort_by_key(|f| f.id);
        foods.dedup_by_key(|f| f.id);
        Ok(foods)
    }

    async fn meal_types(&self) -> StoreResult<Vec<MealReference>> {
        Ok(self.tables.lock().await.meals.values().cloned().collect())
    }
}

#[async_trait]
impl IntakeTx for MemoryTx {
    async fn get_or_create_daily_log(
        &mut self,
        user_id: i64,
        log_date: Date,
    ) -> StoreResult<DailyLog> {
        if let Some(log) = self
            .work
            .daily_logs
            .values()
            .find(|l| l.user_id == user_id && l.log_date == log_date)
        {
            return Ok(log.clone());
        }
        let log = DailyLog {
            id: self.work.next_id(),
            user_id,
            log_date,
        };
        self.work.daily_logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn get_or_create_meal(&mut self, meal_type: &str) -> StoreResult<MealReference> {
        if let Some(meal) = self.work.meals.values().find(|m| m.meal_type == meal_type) {
            return Ok(meal.clone());
        }
        let meal = MealReference {
            id: self.work.next_id(),
            meal_type: meal_type.to_string(),
        };
        self.work.meals.insert(meal.id, meal.clone());
        Ok(meal)
    }

    async fn meal_by_id(&mut self, meal_id: i64) -> StoreResult<Option<MealReference>> {
        Ok(self.work.meals.get(&meal_id).cloned())
    }

    async fn lock_daily_log(&mut self, daily_log_id: i64) -> StoreResult<Option<DailyLog>> {
        Ok(self.work.daily_logs.get(&daily_log_id).cloned())
    }

    async fn upsert_food_line(&mut self, line: &NewFoodLine) -> StoreResult<UpsertOutcome> {
        if self.work.failing_food == Some(line.food_id) {
            return Err(StoreError::Unavailable(format!(
                "write of food {} rejected",
                line.food_id
            )));
        }
        let previous = self.work.food_lines.insert(
            (line.daily_log_id, line.meal_id, line.food_id),
            StoredLine {
                meal_name: line.meal_name.clone(),
                mass_grams: line.mass_grams,
            },
        );
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn delete_food_line(
        &mut self,
        daily_log_id: i64,
        meal_id: i64,
        food_id: i64,
    ) -> StoreResult<u64> {
        let removed = self
            .work
            .food_lines
            .remove(&(daily_log_id, meal_id, food_id))
            .is_some();
        Ok(u64::from(removed))
    }

    async fn delete_meal_lines(&mut self, daily_log_id: i64, meal_id: i64) -> StoreResult<u64> {
        let before = self.work.food_lines.len();
        self.work
            .food_lines
            .retain(|&(log, meal, _), _| !(log == daily_log_id && meal == meal_id));
        Ok((before - self.work.food_lines.len()) as u64)
    }

    async fn delete_day_lines(&mut self, daily_log_id: i64) -> StoreResult<u64> {
        let before = self.work.food_lines.len();
        self.work
            .food_lines
            .retain(|&(log, _, _), _| log != daily_log_id);
        Ok((before - self.work.food_lines.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl WeightStore for MemoryStore {
    async fn insert_weight(
        &self,
        user_id: i64,
        measured_on: Date,
        weight: f64,
    ) -> StoreResult<WeightEntry> {
        let mut tables = self.tables.lock().await;
        let entry = WeightEntry {
            id: tables.next_id(),
            user_id,
            measured_on,
            weight,
        };
        tables.weights.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list_weights(&self, user_id: i64) -> StoreResult<Vec<WeightEntry>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<WeightEntry> = tables
            .weights
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.measured_on.cmp(&a.measured_on).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn delete_weight(&self, user_id: i64, id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.weights.get(&id) {
            Some(w) if w.user_id == user_id => {
                tables.weights.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[tokio::test]
    async fn uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();
        let day = date!(2025 - 01 - 10);
        {
            let mut tx = store.begin().await.unwrap();
            tx.get_or_create_daily_log(1, day).await.unwrap();
            tx.get_or_create_meal("Brunch").await.unwrap();
        }
        assert_eq!(store.daily_log_count(1, day).await, 0);
        assert_eq!(store.meal_count("Brunch").await, 0);
    }

    #[tokio::test]
    async fn fresh_store_holds_the_meal_vocabulary() {
        let store = MemoryStore::new();
        let names: Vec<String> = store
            .meal_types()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.meal_type)
            .collect();
        assert_eq!(names, ["Breakfast", "Lunch", "Dinner", "Snack", "Other"]);

        let mut tx = store.begin().await.unwrap();
        let lunch = tx.get_or_create_meal("Lunch").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(lunch.id, 2);
        assert_eq!(store.meal_count("Lunch").await, 1);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let day = date!(2025 - 01 - 10);
        let mut tx = store.begin().await.unwrap();
        let log = tx.get_or_create_daily_log(1, day).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_daily_log(1, day).await.unwrap(), Some(log));
    }

    #[tokio::test]
    async fn weights_list_newest_first_and_keep_same_day_entries() {
        let store = MemoryStore::new();
        store.insert_weight(1, date!(2025 - 01 - 01), 80.0).await.unwrap();
        store.insert_weight(1, date!(2025 - 01 - 03), 79.5).await.unwrap();
        store.insert_weight(1, date!(2025 - 01 - 03), 79.2).await.unwrap();
        store.insert_weight(2, date!(2025 - 01 - 02), 60.0).await.unwrap();

        let rows = store.list_weights(1).await.unwrap();
        let weights: Vec<f64> = rows.iter().map(|w| w.weight).collect();
        assert_eq!(weights, vec![79.2, 79.5, 80.0]);
    }

    #[tokio::test]
    async fn delete_weight_is_scoped_to_owner() {
        let store = MemoryStore::new();
        let entry = store.insert_weight(1, date!(2025 - 01 - 01), 80.0).await.unwrap();
        assert!(!store.delete_weight(2, entry.id).await.unwrap());
        assert!(store.delete_weight(1, entry.id).await.unwrap());
        assert!(store.list_weights(1).await.unwrap().is_empty());
    }
}
