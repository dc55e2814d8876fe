//! # Key Vault Signing 暗号処理
//!
//! 秘密鍵を使う処理はすべてKey Vault側で行う。このクレートが扱うのは
//! ダイジェスト計算、エンコーディング、公開鍵による署名検証のみ。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | ハッシュ | SHA-256 |
//! | 署名 | RSASSA-PKCS1-v1_5 (RS256) |

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign};
use sha2::{Digest, Sha256};

pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// SHA-256ダイジェストの長さ（バイト）
pub const SHA256_DIGEST_LEN: usize = 32;

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// JWK成分からRSA公開鍵を構築できない
    #[error("RSA公開鍵の構築に失敗しました: {0}")]
    InvalidPublicKey(String),
    /// ダイジェスト長が不正
    #[error("ダイジェスト長が不正です: {0} bytes (期待値: 32 bytes)")]
    InvalidDigestLength(usize),
    /// RS256署名検証エラー
    #[error("RS256署名検証に失敗しました")]
    SignatureVerifyError,
    /// RS256署名エラー
    #[error("RS256署名に失敗しました: {0}")]
    SignError(String),
    /// RSA鍵生成エラー
    #[error("RSA鍵生成に失敗しました: {0}")]
    KeyGenError(String),
}

/// Base64エンジン（Standard）。APIクライアントとの署名の受け渡しに使用する。
pub fn b64() -> base64::engine::GeneralPurpose {
    STANDARD
}

/// Base64URLエンジン（パディングなし）。Key Vault REST APIとJWK成分に使用する。
pub fn b64url() -> base64::engine::GeneralPurpose {
    URL_SAFE_NO_PAD
}

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

fn rs256_scheme() -> Pkcs1v15Sign {
    Pkcs1v15Sign::new::<rsa::sha2::Sha256>()
}

/// JWKのモジュラス`n`と公開指数`e`（ビッグエンディアンのバイト列）からRSA公開鍵を構築する。
pub fn rsa_public_key_from_components(n: &[u8], e: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    if n.is_empty() || e.is_empty() {
        return Err(CryptoError::InvalidPublicKey(
            "モジュラスまたは公開指数が空です".to_string(),
        ));
    }
    RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// RSA公開鍵をJWK成分`(n, e)`に分解する。
pub fn rsa_public_key_components(public_key: &RsaPublicKey) -> (Vec<u8>, Vec<u8>) {
    (public_key.n().to_bytes_be(), public_key.e().to_bytes_be())
}

/// この鍵で作られるRS256署名のバイト長（モジュラス長）。
pub fn rsa_signature_len(public_key: &RsaPublicKey) -> usize {
    public_key.size()
}

/// 事前計算済みSHA-256ダイジェストに対するRS256署名を検証する。
pub fn rs256_verify_digest(
    public_key: &RsaPublicKey,
    digest: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    if digest.len() != SHA256_DIGEST_LEN {
        return Err(CryptoError::InvalidDigestLength(digest.len()));
    }
    public_key
        .verify(rs256_scheme(), digest, signature)
        .map_err(|_| CryptoError::SignatureVerifyError)
}

/// データをSHA-256でハッシュし、RS256署名を検証する。
pub fn rs256_verify(
    public_key: &RsaPublicKey,
    data: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    rs256_verify_digest(public_key, &sha256(data), signature)
}

/// SHA-256ダイジェストにRS256で署名する。
///
/// 本番の署名はKey Vaultが行うため、メモリ内モックVaultとテストでのみ使用する。
pub fn rs256_sign_digest(private_key: &RsaPrivateKey, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if digest.len() != SHA256_DIGEST_LEN {
        return Err(CryptoError::InvalidDigestLength(digest.len()));
    }
    private_key
        .sign(rs256_scheme(), digest)
        .map_err(|e| CryptoError::SignError(e.to_string()))
}

/// 指定ビット長のRSA秘密鍵を生成する。
pub fn generate_rsa_key(bits: usize) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|e| CryptoError::KeyGenError(e.to_string()))
}
