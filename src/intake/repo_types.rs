use serde::Serialize;
use sqlx::FromRow;
use time::Date;

/// Mass assumed for a food line when the caller does not supply one.
pub const DEFAULT_MASS_GRAMS: f64 = 100.0;

/// Per-user-per-date aggregate root. Unique on (user_id, log_date).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DailyLog {
    pub id: i64,
    pub user_id: i64,
    pub log_date: Date,
}

/// Canonical meal type shared by every user's logs.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MealReference {
    pub id: i64,
    pub meal_type: String,
}

/// A food line as the engine writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFoodLine {
    pub daily_log_id: i64,
    pub food_id: i64,
    pub meal_id: i64,
    pub meal_name: Option<String>,
    pub mass_grams: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Catalog entry. Nutrient values are per 100 g.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Food {
    pub id: i64,
    pub name: String,
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbohydrates: f64,
    pub sugars: Option<f64>,
    pub fiber: Option<f64>,
    pub salt: Option<f64>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Nutrients {
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbohydrates: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sugars: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<f64>,
}

impl Nutrients {
    /// Linear scaling of per-100 g values to `mass_grams`. No rounding.
    pub fn scaled(&self, mass_grams: f64) -> Self {
        let factor = mass_grams / 100.0;
        Self {
            calories: self.calories * factor,
            proteins: self.proteins * factor,
            fats: self.fats * factor,
            carbohydrates: self.carbohydrates * factor,
            sugars: self.sugars.map(|v| v * factor),
            fiber: self.fiber.map(|v| v * factor),
            salt: self.salt.map(|v| v * factor),
        }
    }
}

impl Food {
    pub fn per_hundred(&self) -> Nutrients {
        Nutrients {
            calories: self.calories,
            proteins: self.proteins,
            fats: self.fats,
            carbohydrates: self.carbohydrates,
            sugars: self.sugars,
            fiber: self.fiber,
            salt: self.salt,
        }
    }
}

/// A stored food line joined with its catalog entry and meal reference.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FoodLineDetail {
    pub daily_log_id: i64,
    pub food_id: i64,
    pub meal_id: i64,
    pub meal_type: String,
    pub meal_name: Option<String>,
    pub mass_grams: f64,
    pub name: String,
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbohydrates: f64,
    pub sugars: Option<f64>,
    pub fiber: Option<f64>,
    pub salt: Option<f64>,
    pub image_url: Option<String>,
}

impl FoodLineDetail {
    pub fn per_hundred(&self) -> Nutrients {
        Nutrients {
            calories: self.calories,
            proteins: self.proteins,
            fats: self.fats,
            carbohydrates: self.carbohydrates,
            sugars: self.sugars,
            fiber: self.fiber,
            salt: self.salt,
        }
    }

    /// Per-line display name, falling back to the meal type.
    pub fn display_name(&self) -> &str {
        self.meal_name.as_deref().unwrap_or(&self.meal_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per_hundred() -> Nutrients {
        Nutrients {
            calories: 50.0,
            proteins: 20.0,
            fats: 1.0,
            carbohydrates: 10.0,
            sugars: Some(4.0),
            fiber: None,
            salt: Some(0.5),
        }
    }

    #[test]
    fn scales_linearly_by_mass() {
        let scaled = per_hundred().scaled(150.0);
        assert!((scaled.proteins - 30.0).abs() < 1e-9);
        assert!((scaled.calories - 75.0).abs() < 1e-9);
        assert_eq!(scaled.sugars, Some(6.0));
        assert_eq!(scaled.fiber, None);
    }

    #[test]
    fn zero_mass_yields_zero_nutrients() {
        let scaled = per_hundred().scaled(0.0);
        assert_eq!(scaled.calories, 0.0);
        assert_eq!(scaled.proteins, 0.0);
        assert_eq!(scaled.fats, 0.0);
        assert_eq!(scaled.carbohydrates, 0.0);
        assert_eq!(scaled.salt, Some(0.0));
    }

    #[test]
    fn optional_nutrients_are_omitted_from_json() {
        let json = serde_json::to_value(per_hundred()).unwrap();
        assert!(json.get("fiber").is_none());
        assert_eq!(json["sugars"], 4.0);
        assert_eq!(json["carbohydrates"], 10.0);
    }
}
