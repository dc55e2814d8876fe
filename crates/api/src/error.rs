//! # API エラー型
//!
//! `UnsupportedAlgorithm`と`InvalidSignature`の本文はクライアントとの取り決めなので変更しないこと。

use axum::http::StatusCode;
use kvsign_vault::VaultError;

/// APIエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// RS256以外のアルゴリズムが指定された
    #[error("Only RS256 (RSA SHA-256) algorithm is expected.")]
    UnsupportedAlgorithm,
    /// 署名が一致しない
    #[error("Invalid")]
    InvalidSignature,
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// Key Vault操作に失敗
    #[error("Key Vault操作に失敗: {0}")]
    Vault(#[from] VaultError),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedAlgorithm
            | ApiError::InvalidSignature
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Vault(VaultError::InvalidKey(_) | VaultError::Crypto(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Vault(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "リクエスト処理に失敗しました");
        }
        (status, self.to_string()).into_response()
    }
}
