//! # POST /verify
//!
//! RS256署名の検証。デフォルトではキャッシュ済みの公開鍵でローカルに検証し、
//! `VERIFY_MODE=remote`ではKey Vaultの`verify`操作に委譲する。

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use base64::Engine;
use kvsign_crypto::{b64, rs256_verify_digest, rsa_signature_len, sha256, CryptoError};
use kvsign_types::{SignatureAlgorithm, VerifyRequest};

use crate::config::{ApiState, VerifyMode};
use crate::error::ApiError;

/// POST /verify — 署名検証。
///
/// 有効なら200 `Valid`、不一致なら400 `Invalid`。
/// RS256以外のアルゴリズムは鍵を取得する前に拒否する。
pub async fn handle_verify(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<VerifyRequest>,
) -> Result<&'static str, ApiError> {
    let algorithm =
        SignatureAlgorithm::from_name(&body.algorithm).ok_or(ApiError::UnsupportedAlgorithm)?;

    let signature = b64()
        .decode(body.signature.trim())
        .map_err(|e| ApiError::BadRequest(format!("signatureのBase64デコードに失敗: {e}")))?;

    let cached = state.key_cache.get_or_fetch(state.vault.as_ref()).await?;
    let digest = sha256(body.data.as_bytes());

    // 鍵長と異なる署名はVaultに送らず不一致とする
    if signature.len() != rsa_signature_len(&cached.public_key) {
        tracing::info!(
            key_id = %cached.key.key_id,
            len = signature.len(),
            "署名長が鍵長と一致しません"
        );
        return Err(ApiError::InvalidSignature);
    }

    let valid = match state.verify_mode {
        VerifyMode::Local => match rs256_verify_digest(&cached.public_key, &digest, &signature) {
            Ok(()) => true,
            Err(CryptoError::SignatureVerifyError) => false,
            Err(e) => return Err(ApiError::Internal(e.to_string())),
        },
        VerifyMode::Remote => {
            state
                .vault
                .verify_digest(&cached.key.key_id, algorithm, &digest, &signature)
                .await?
        }
    };

    tracing::info!(
        key_id = %cached.key.key_id,
        mode = ?state.verify_mode,
        valid,
        "署名を検証しました"
    );

    if valid {
        Ok("Valid")
    } else {
        Err(ApiError::InvalidSignature)
    }
}
