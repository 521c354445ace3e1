use serde::{Deserialize, Serialize};

use crate::intake::repo_types::Nutrients;

/// Body of `POST /logs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIntakeRequest {
    pub date: Option<String>,
    pub meal_type: Option<String>,
    pub meal_display_name: Option<String>,
    pub meal_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<FoodItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItemRequest {
    pub food_id: Option<i64>,
    pub mass_grams: Option<f64>,
    /// Only read by the replace path, where the request may span several meals.
    pub meal_id: Option<i64>,
    pub meal_display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIntakeResponse {
    pub daily_log_id: i64,
    pub meal_id: i64,
    pub meal_type: String,
    pub meal_display_name: String,
}

/// Body of `PUT /logs/:daily_log_id/foods`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceMealRequest {
    pub meal_id: Option<i64>,
    /// Applied to every item that does not name its own.
    pub meal_display_name: Option<String>,
    #[serde(default)]
    pub items: Vec<FoodItemRequest>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayResponse {
    /// `None` means nothing has been logged for that date yet.
    pub daily_log_id: Option<i64>,
    pub date: String,
    pub meal_groups: Vec<MealGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealGroup {
    pub meal_id: i64,
    pub meal_type: String,
    pub meal_display_name: String,
    pub food_lines: Vec<ScaledFoodLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaledFoodLine {
    pub food_id: i64,
    pub name: String,
    pub meal_display_name: String,
    pub mass_grams: f64,
    #[serde(flatten)]
    pub nutrients: Nutrients,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealTypeResponse {
    pub id: i64,
    pub meal_type: String,
}
