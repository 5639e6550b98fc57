//! Repository for the `predictions` table.

use sqlx::PgPool;

use crate::models::prediction::{NewPrediction, Prediction};

/// Column list for `predictions` queries.
const COLUMNS: &str = "id, reading_id, predicted_rul, failure_label, created_at";

/// Append-only access to predictions.
pub struct PredictionRepo;

impl PredictionRepo {
    /// Insert a prediction unless the reading already has one.
    ///
    /// Returns `None` when `uq_predictions_reading_id` rejected the row,
    /// i.e. another scheduler won the race.
    pub async fn insert(
        pool: &PgPool,
        input: &NewPrediction,
    ) -> Result<Option<Prediction>, sqlx::Error> {
        let query = format!(
            "INSERT INTO predictions (reading_id, predicted_rul, failure_label) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_predictions_reading_id DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Prediction>(&query)
            .bind(input.reading_id)
            .bind(input.predicted_rul)
            .bind(input.failure_label.as_str())
            .fetch_optional(pool)
            .await
    }
}
