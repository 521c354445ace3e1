//! Weight history: append-only, several entries per day allowed, no locking.

use tracing::{info, instrument};

use crate::error::AppError;
use crate::storage::WeightStore;
use crate::validation::{parse_date, positive_number};
use crate::weights::dto::RecordWeightRequest;
use crate::weights::repo_types::WeightEntry;

#[instrument(skip(store, req))]
pub async fn record_weight(
    store: &dyn WeightStore,
    user_id: i64,
    req: &RecordWeightRequest,
) -> Result<WeightEntry, AppError> {
    let measured_on = parse_date("date", req.date.as_deref())?;
    let weight = req
        .weight
        .ok_or_else(|| AppError::validation("weight", "is required"))
        .and_then(|w| positive_number("weight", w))?;
    let entry = store.insert_weight(user_id, measured_on, weight).await?;
    info!(user_id, weight_id = entry.id, %measured_on, "weight recorded");
    Ok(entry)
}

pub async fn list_weights(
    store: &dyn WeightStore,
    user_id: i64,
) -> Result<Vec<WeightEntry>, AppError> {
    Ok(store.list_weights(user_id).await?)
}

#[instrument(skip(store))]
pub async fn delete_weight(store: &dyn WeightStore, user_id: i64, id: i64) -> Result<(), AppError> {
    if !store.delete_weight(user_id, id).await? {
        return Err(AppError::NotFound("weight entry"));
    }
    info!(user_id, weight_id = id, "weight deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn req(date: &str, weight: Option<f64>) -> RecordWeightRequest {
        RecordWeightRequest {
            date: Some(date.into()),
            weight,
        }
    }

    #[tokio::test]
    async fn same_day_entries_are_all_kept() {
        let store = MemoryStore::new();
        record_weight(&store, 1, &req("2025-01-10", Some(80.2))).await.unwrap();
        record_weight(&store, 1, &req("2025-01-10", Some(80.0))).await.unwrap();
        record_weight(&store, 1, &req("2025-01-12", Some(79.8))).await.unwrap();

        let rows = list_weights(&store, 1).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].weight, 79.8);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let store = MemoryStore::new();
        assert!(record_weight(&store, 1, &req("2025-01-10", None)).await.is_err());
        assert!(record_weight(&store, 1, &req("2025-01-10", Some(-1.0))).await.is_err());
        assert!(record_weight(&store, 1, &req("yesterday", Some(70.0))).await.is_err());
        assert!(list_weights(&store, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_entry_is_not_found() {
        let store = MemoryStore::new();
        let entry = record_weight(&store, 1, &req("2025-01-10", Some(80.0))).await.unwrap();
        let err = delete_weight(&store, 2, entry.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        delete_weight(&store, 1, entry.id).await.unwrap();
    }
}
