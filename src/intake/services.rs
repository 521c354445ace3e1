//! The intake log engine.
//!
//! Write operations run as a single storage transaction: every early return
//! drops the open [`IntakeTx`](crate::storage::IntakeTx), which discards the
//! partial work. Reads never open a transaction.

use std::collections::{BTreeMap, BTreeSet};

use time::Date;
use tracing::{debug, info, instrument, warn};

use crate::error::AppError;
use crate::intake::commands::{IntakeItem, MealSelector, RecordIntake, ReplaceMeal, ReplaceScope};
use crate::intake::dto::{MealGroup, ScaledFoodLine};
use crate::intake::repo_types::{DailyLog, FoodLineDetail, MealReference, NewFoodLine};
use crate::storage::{IntakeStore, IntakeTx};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedIntake {
    pub daily_log_id: i64,
    pub meal_id: i64,
    pub meal_type: String,
    pub meal_display_name: String,
}

/// Result of reading one day. `NoEntries` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DayView {
    NoEntries,
    Logged {
        daily_log: DailyLog,
        meal_groups: Vec<MealGroup>,
    },
}

/// Merges items into the user's log for the day: existing (food, meal) lines
/// get the new mass and display name, new ones are inserted.
#[instrument(skip(store, cmd), fields(date = %cmd.log_date, items = cmd.items.len()))]
pub async fn record_intake(
    store: &dyn IntakeStore,
    user_id: i64,
    cmd: &RecordIntake,
) -> Result<RecordedIntake, AppError> {
    ensure_foods_exist(store, cmd.items.iter().map(|i| i.food_id)).await?;

    let mut tx = store.begin().await?;
    let daily_log = tx.get_or_create_daily_log(user_id, cmd.log_date).await?;
    let meal = match &cmd.meal {
        MealSelector::ById(meal_id) => tx
            .meal_by_id(*meal_id)
            .await?
            .ok_or_else(|| AppError::validation("mealId", format!("unknown meal {meal_id}")))?,
        MealSelector::ByType(meal_type) => tx.get_or_create_meal(meal_type).await?,
    };
    let display_name = cmd
        .display_name
        .clone()
        .unwrap_or_else(|| meal.meal_type.clone());

    for IntakeItem { food_id, mass_grams } in &cmd.items {
        let line = NewFoodLine {
            daily_log_id: daily_log.id,
            food_id: *food_id,
            meal_id: meal.id,
            meal_name: Some(display_name.clone()),
            mass_grams: *mass_grams,
        };
        let outcome = tx.upsert_food_line(&line).await?;
        debug!(food_id, mass_grams, ?outcome, "food line written");
    }
    tx.commit().await?;

    info!(
        user_id,
        daily_log_id = daily_log.id,
        meal_id = meal.id,
        "intake recorded"
    );
    Ok(RecordedIntake {
        daily_log_id: daily_log.id,
        meal_id: meal.id,
        meal_type: meal.meal_type,
        meal_display_name: display_name,
    })
}

/// Wipes a scope of the day and inserts `cmd.items` in its place.
///
/// With [`ReplaceScope::WholeDay`] every food line of the day is removed first,
/// whatever meal it belongs to. Unlike [`record_intake`] this is not safe to
/// retry blindly if the desired contents changed in between.
#[instrument(skip(store, cmd), fields(scope = ?cmd.scope, items = cmd.items.len()))]
pub async fn replace_meal(
    store: &dyn IntakeStore,
    user_id: i64,
    daily_log_id: i64,
    cmd: &ReplaceMeal,
) -> Result<(), AppError> {
    ensure_foods_exist(store, cmd.items.iter().map(|i| i.food_id)).await?;

    let mut tx = store.begin().await?;
    owned_daily_log(tx.as_mut(), user_id, daily_log_id).await?;

    let deleted = match cmd.scope {
        ReplaceScope::Meal(meal_id) => {
            existing_meal(tx.as_mut(), meal_id).await?;
            tx.delete_meal_lines(daily_log_id, meal_id).await?
        }
        ReplaceScope::WholeDay => {
            warn!(user_id, daily_log_id, "replacing every meal of the day");
            tx.delete_day_lines(daily_log_id).await?
        }
    };

    let mut meals: BTreeMap<i64, MealReference> = BTreeMap::new();
    for item in &cmd.items {
        let meal_type = match meals.get(&item.meal_id) {
            Some(meal) => meal.meal_type.clone(),
            None => {
                let meal = existing_meal(tx.as_mut(), item.meal_id).await?;
                let meal_type = meal.meal_type.clone();
                meals.insert(meal.id, meal);
                meal_type
            }
        };
        let line = NewFoodLine {
            daily_log_id,
            food_id: item.food_id,
            meal_id: item.meal_id,
            meal_name: Some(item.display_name.clone().unwrap_or(meal_type)),
            mass_grams: item.mass_grams,
        };
        tx.upsert_food_line(&line).await?;
    }
    tx.commit().await?;

    info!(
        user_id,
        daily_log_id,
        deleted,
        inserted = cmd.items.len(),
        "food lines replaced"
    );
    Ok(())
}

#[instrument(skip(store))]
pub async fn delete_food_line(
    store: &dyn IntakeStore,
    user_id: i64,
    daily_log_id: i64,
    meal_id: i64,
    food_id: i64,
) -> Result<u64, AppError> {
    let mut tx = store.begin().await?;
    owned_daily_log(tx.as_mut(), user_id, daily_log_id).await?;
    let deleted = tx.delete_food_line(daily_log_id, meal_id, food_id).await?;
    if deleted == 0 {
        return Err(AppError::NotFound("food line"));
    }
    tx.commit().await?;
    info!(user_id, daily_log_id, meal_id, food_id, "food line deleted");
    Ok(deleted)
}

#[instrument(skip(store))]
pub async fn delete_meal_lines(
    store: &dyn IntakeStore,
    user_id: i64,
    daily_log_id: i64,
    meal_id: i64,
) -> Result<u64, AppError> {
    let mut tx = store.begin().await?;
    owned_daily_log(tx.as_mut(), user_id, daily_log_id).await?;
    let deleted = tx.delete_meal_lines(daily_log_id, meal_id).await?;
    tx.commit().await?;
    info!(user_id, daily_log_id, meal_id, deleted, "meal cleared");
    Ok(deleted)
}

/// Removes every food line of the day. The day record itself stays.
#[instrument(skip(store))]
pub async fn clear_day(
    store: &dyn IntakeStore,
    user_id: i64,
    daily_log_id: i64,
) -> Result<u64, AppError> {
    let mut tx = store.begin().await?;
    owned_daily_log(tx.as_mut(), user_id, daily_log_id).await?;
    let deleted = tx.delete_day_lines(daily_log_id).await?;
    tx.commit().await?;
    info!(user_id, daily_log_id, deleted, "day cleared");
    Ok(deleted)
}

/// Reads a day back with nutrients scaled to each line's mass, grouped by meal.
/// Totals across meals are left to the caller.
#[instrument(skip(store))]
pub async fn get_day(
    store: &dyn IntakeStore,
    user_id: i64,
    log_date: Date,
) -> Result<DayView, AppError> {
    let Some(daily_log) = store.find_daily_log(user_id, log_date).await? else {
        return Ok(DayView::NoEntries);
    };
    let lines = store.food_lines_for_day(daily_log.id).await?;
    Ok(DayView::Logged {
        daily_log,
        meal_groups: group_by_meal(lines),
    })
}

pub async fn list_meal_types(store: &dyn IntakeStore) -> Result<Vec<MealReference>, AppError> {
    Ok(store.meal_types().await?)
}

pub fn scale_line(line: FoodLineDetail) -> ScaledFoodLine {
    ScaledFoodLine {
        food_id: line.food_id,
        meal_display_name: line.display_name().to_string(),
        mass_grams: line.mass_grams,
        nutrients: line.per_hundred().scaled(line.mass_grams),
        name: line.name,
        image_url: line.image_url,
    }
}

/// Groups in meal-id order. A group is labelled with its first line's display name.
pub fn group_by_meal(lines: Vec<FoodLineDetail>) -> Vec<MealGroup> {
    let mut groups: BTreeMap<i64, MealGroup> = BTreeMap::new();
    for line in lines {
        let group = groups.entry(line.meal_id).or_insert_with(|| MealGroup {
            meal_id: line.meal_id,
            meal_type: line.meal_type.clone(),
            meal_display_name: line.display_name().to_string(),
            food_lines: Vec::new(),
        });
        group.food_lines.push(scale_line(line));
    }
    groups.into_values().collect()
}

async fn ensure_foods_exist(
    store: &dyn IntakeStore,
    food_ids: impl Iterator<Item = i64>,
) -> Result<(), AppError> {
    let wanted: Vec<i64> = food_ids.collect::<BTreeSet<_>>().into_iter().collect();
    if wanted.is_empty() {
        return Ok(());
    }
    let found: BTreeSet<i64> = store
        .foods_by_ids(&wanted)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();
    match wanted.iter().find(|id| !found.contains(id)) {
        Some(missing) => {
            warn!(food_id = missing, "unknown food");
            Err(AppError::validation(
                "foodId",
                format!("unknown food {missing}"),
            ))
        }
        None => Ok(()),
    }
}

/// Locks the day for the rest of the transaction. Someone else's day reads as missing.
async fn owned_daily_log(
    tx: &mut dyn IntakeTx,
    user_id: i64,
    daily_log_id: i64,
) -> Result<DailyLog, AppError> {
    match tx.lock_daily_log(daily_log_id).await? {
        Some(log) if log.user_id == user_id => Ok(log),
        _ => Err(AppError::NotFound("daily log")),
    }
}

async fn existing_meal(tx: &mut dyn IntakeTx, meal_id: i64) -> Result<MealReference, AppError> {
    tx.meal_by_id(meal_id)
        .await?
        .ok_or(AppError::NotFound("meal"))
}
