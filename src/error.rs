use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Duplicate task: {0}")]
    DuplicateTask(String),
    #[error("{}", multiline("Validation failed", .0))]
    Validation(String),
    #[error("Step sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("{}", multiline("Not found", .0))]
    NotFound(String),
    #[error("{}", multiline("Invalid input", .0))]
    InvalidInput(String),
}

impl AppError {
    /// Errors a user caused and can fix, as opposed to environment failures.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AppError::DuplicateTask(_)
                | AppError::Validation(_)
                | AppError::SensorUnavailable(_)
                | AppError::NotFound(_)
                | AppError::InvalidInput(_)
        )
    }
}

fn multiline(label: &str, message: &str) -> String {
    if message.contains('\n') {
        format!("{label}:\n{message}")
    } else {
        format!("{label}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_messages_start_on_their_own_line() {
        let err = AppError::InvalidInput("first\nsecond".to_string());
        assert_eq!(err.to_string(), "Invalid input:\nfirst\nsecond");

        let err = AppError::NotFound("task abc".to_string());
        assert_eq!(err.to_string(), "Not found: task abc");
    }

    #[test]
    fn persistence_errors_are_not_user_facing() {
        assert!(!AppError::Persistence("disk full".to_string()).is_user_facing());
        assert!(AppError::DuplicateTask("Run 5k".to_string()).is_user_facing());
    }
}
