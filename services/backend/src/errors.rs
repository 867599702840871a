use odds_shared::ServiceError;

use crate::rpc::RpcError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Match not found: {0}")]
    NotFound(i64),

    #[error("Odds call failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Structured error for whatever layer renders responses
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            AppError::NotFound(match_api_id) => ServiceError::match_not_found(*match_api_id),
            AppError::Rpc(e) => e.to_service_error(),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                ServiceError::internal("Internal server error")
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        self.to_service_error().category.status_code()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
