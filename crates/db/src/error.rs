use fleetpulse_core::types::DbId;

/// Errors surfaced by a [`SensorStore`](crate::SensorStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another worker already predicted this reading. Benign.
    #[error("Prediction already exists for reading {0}")]
    DuplicatePrediction(DbId),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// The store can no longer be reached at all. Owners should exit and
    /// let their supervisor restart them.
    #[error("Store connection lost: {0}")]
    ConnectionLost(String),

    /// Transient persistence failure; retry after a backoff.
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::ConnectionLost(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => StoreError::ConnectionLost("connection pool closed".into()),
            other => StoreError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_closed_is_fatal() {
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_fatal());
    }

    #[test]
    fn other_errors_are_transient() {
        assert!(!StoreError::from(sqlx::Error::PoolTimedOut).is_fatal());
        assert!(!StoreError::DuplicatePrediction(3).is_fatal());
    }
}
