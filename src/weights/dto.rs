use serde::{Deserialize, Serialize};

use crate::weights::repo_types::WeightEntry;

#[derive(Debug, Deserialize)]
pub struct RecordWeightRequest {
    pub date: Option<String>,
    pub weight: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct WeightResponse {
    pub id: i64,
    pub date: String,
    pub weight: f64,
}

impl From<WeightEntry> for WeightResponse {
    fn from(w: WeightEntry) -> Self {
        Self {
            id: w.id,
            date: w.measured_on.to_string(),
            weight: w.weight,
        }
    }
}
