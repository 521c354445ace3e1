//! Validated forms of the intake requests. Nothing here touches storage.

use time::Date;

use crate::error::AppError;
use crate::intake::dto::{FoodItemRequest, RecordIntakeRequest, ReplaceMealRequest};
use crate::validation::{mass_or_default, optional_text, parse_date, positive_id, required_text};

/// Meal types every store starts out with.
pub const MEAL_VOCABULARY: [&str; 5] = ["Breakfast", "Lunch", "Dinner", "Snack", "Other"];

/// Trims the name and maps vocabulary entries to their canonical spelling.
pub fn canonical_meal_type(raw: &str) -> String {
    let trimmed = raw.trim();
    MEAL_VOCABULARY
        .iter()
        .find(|known| known.eq_ignore_ascii_case(trimmed))
        .map(|known| known.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntakeItem {
    pub food_id: i64,
    pub mass_grams: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MealSelector {
    ById(i64),
    ByType(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordIntake {
    pub log_date: Date,
    pub meal: MealSelector,
    pub display_name: Option<String>,
    pub items: Vec<IntakeItem>,
}

impl TryFrom<RecordIntakeRequest> for RecordIntake {
    type Error = AppError;

    fn try_from(req: RecordIntakeRequest) -> Result<Self, Self::Error> {
        let log_date = parse_date("date", req.date.as_deref())?;
        let meal = match req.meal_id {
            Some(_) => MealSelector::ById(positive_id("mealId", req.meal_id)?),
            None => MealSelector::ByType(canonical_meal_type(&required_text(
                "mealType",
                req.meal_type.as_deref(),
            )?)),
        };
        if req.items.is_empty() {
            return Err(AppError::validation("items", "at least one item is required"));
        }
        let items = req
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| intake_item(i, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            log_date,
            meal,
            display_name: optional_text(req.meal_display_name.as_deref()),
            items,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceItem {
    pub food_id: i64,
    pub mass_grams: f64,
    pub meal_id: i64,
    pub display_name: Option<String>,
}

/// Which food lines a replace wipes before inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceScope {
    Meal(i64),
    WholeDay,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceMeal {
    pub scope: ReplaceScope,
    pub items: Vec<ReplaceItem>,
}

impl TryFrom<ReplaceMealRequest> for ReplaceMeal {
    type Error = AppError;

    fn try_from(req: ReplaceMealRequest) -> Result<Self, Self::Error> {
        let scope = match req.meal_id {
            Some(_) => ReplaceScope::Meal(positive_id("mealId", req.meal_id)?),
            None => ReplaceScope::WholeDay,
        };
        let shared_name = optional_text(req.meal_display_name.as_deref());
        let mut items = Vec::with_capacity(req.items.len());
        for (i, item) in req.items.iter().enumerate() {
            let base = intake_item(i, item)?;
            let field = format!("items[{i}].mealId");
            let meal_id = match (scope, item.meal_id) {
                (ReplaceScope::Meal(scoped), None) => scoped,
                (ReplaceScope::Meal(scoped), Some(own)) if own == scoped => scoped,
                (ReplaceScope::Meal(_), Some(_)) => {
                    return Err(AppError::validation(field, "must match the replaced mealId"));
                }
                (ReplaceScope::WholeDay, own) => positive_id(&field, own)?,
            };
            items.push(ReplaceItem {
                food_id: base.food_id,
                mass_grams: base.mass_grams,
                meal_id,
                display_name: optional_text(item.meal_display_name.as_deref())
                    .or_else(|| shared_name.clone()),
            });
        }
        Ok(Self { scope, items })
    }
}

fn intake_item(index: usize, item: &FoodItemRequest) -> Result<IntakeItem, AppError> {
    Ok(IntakeItem {
        food_id: positive_id(&format!("items[{index}].foodId"), item.food_id)?,
        mass_grams: mass_or_default(&format!("items[{index}].massGrams"), item.mass_grams)?,
    })
}
