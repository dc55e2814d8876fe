//! # POST /sign
//!
//! テキストのUTF-8バイト列をSHA-256でハッシュし、Key VaultにRS256署名を依頼する。

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use base64::Engine;
use kvsign_crypto::{b64, sha256};
use kvsign_types::{SignRequest, SignResponse, SignatureAlgorithm};

use crate::config::ApiState;
use crate::error::ApiError;

/// POST /sign — Key Vaultによる署名。
///
/// リクエストボディは素のJSON文字列。署名はBase64で返す。
pub async fn handle_sign(
    State(state): State<Arc<ApiState>>,
    Json(SignRequest(text)): Json<SignRequest>,
) -> Result<Json<SignResponse>, ApiError> {
    let cached = state.key_cache.get_or_fetch(state.vault.as_ref()).await?;

    let digest = sha256(text.as_bytes());
    tracing::debug!(digest = %hex::encode(digest), "署名対象のダイジェスト");

    let outcome = state
        .vault
        .sign_digest(&cached.key.key_id, SignatureAlgorithm::Rs256, &digest)
        .await?;

    let signature = b64().encode(&outcome.signature);
    tracing::info!(
        algorithm = %outcome.algorithm,
        key_id = %outcome.key_id,
        signature = %signature,
        "データに署名しました"
    );

    Ok(Json(SignResponse {
        algorithm: outcome.algorithm.to_string(),
        signature,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsign_crypto::rs256_verify;

    use crate::config::VerifyMode;
    use crate::endpoints::test_helpers::test_state;

    #[tokio::test]
    async fn test_sign_returns_verifiable_signature() {
        let state = test_state(VerifyMode::Local);

        let response = handle_sign(
            State(state.clone()),
            Json(SignRequest("hello".to_string())),
        )
        .await
        .unwrap()
        .0;

        assert_eq!(response.algorithm, "RS256");
        let signature = b64().decode(&response.signature).unwrap();
        assert_eq!(signature.len(), 256);

        let cached = state.key_cache.get().expect("鍵がキャッシュされていること");
        rs256_verify(&cached.public_key, b"hello", &signature).unwrap();
    }

    /// PKCS#1 v1.5は決定的なので、同じテキストには同じ署名が返る
    #[tokio::test]
    async fn test_sign_is_deterministic_and_handles_empty_text() {
        let state = test_state(VerifyMode::Local);

        let first = handle_sign(State(state.clone()), Json(SignRequest(String::new())))
            .await
            .unwrap()
            .0;
        let second = handle_sign(State(state.clone()), Json(SignRequest(String::new())))
            .await
            .unwrap()
            .0;
        assert_eq!(first, second);

        let other = handle_sign(State(state), Json(SignRequest("日本語".to_string())))
            .await
            .unwrap()
            .0;
        assert_ne!(first.signature, other.signature);
    }
}
