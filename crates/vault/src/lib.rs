//! # Key Vault クライアント
//!
//! 鍵の取得・署名・検証をリモートの鍵管理サービスに委譲するための抽象化。
//! 秘密鍵はVaultの外に出ない。
//!
//! 現在の実装:
//! - `azure` — Azure Key Vault REST API（api-version 7.4）
//! - `mock` — ローカル開発・テスト用（メモリ内RSA鍵）
//!
//! アクセストークンの取得は`credential`モジュールが担う。

pub mod azure;
pub mod credential;
pub mod mock;

use base64::Engine;
use kvsign_crypto::{b64url, rsa_public_key_from_components, CryptoError, RsaPublicKey};
use kvsign_types::{JsonWebKey, SignatureAlgorithm};

pub use azure::{AzureKeyVault, AzureKeyVaultConfig};
pub use credential::{default_credential_from_env, AccessToken, TokenCredential};
pub use mock::MockKeyVault;

/// Key Vault操作のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// HTTP送信・受信に失敗
    #[error("Key Vaultへの通信に失敗: {0}")]
    Http(String),
    /// Key Vaultが非2xxを返した
    #[error("Key VaultがエラーHTTP {status}を返しました: {code} - {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },
    /// レスポンスのデコードに失敗
    #[error("Key Vaultのレスポンスが不正: {0}")]
    InvalidResponse(String),
    /// アクセストークンの取得に失敗
    #[error("アクセストークンの取得に失敗: {0}")]
    Credential(String),
    /// 鍵がRSA公開鍵として扱えない
    #[error("鍵の形式が不正: {0}")]
    InvalidKey(String),
    /// ローカル暗号処理の失敗
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Vaultから取得した公開鍵ハンドル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultKey {
    /// バージョン付き鍵識別子（以後の署名・検証リクエストの宛先）
    pub key_id: String,
    /// 公開鍵のJWK表現
    pub jwk: JsonWebKey,
}

impl VaultKey {
    /// JWKのn, eからRSA公開鍵を構築する。
    pub fn public_key(&self) -> Result<RsaPublicKey, VaultError> {
        if !self.jwk.is_rsa() {
            return Err(VaultError::InvalidKey(format!(
                "RSA鍵ではありません: kty={}",
                self.jwk.kty
            )));
        }
        let n = decode_component(self.jwk.n.as_deref(), "n")?;
        let e = decode_component(self.jwk.e.as_deref(), "e")?;
        Ok(rsa_public_key_from_components(&n, &e)?)
    }
}

fn decode_component(value: Option<&str>, name: &str) -> Result<Vec<u8>, VaultError> {
    let value =
        value.ok_or_else(|| VaultError::InvalidKey(format!("JWKに{name}がありません")))?;
    b64url()
        .decode(value)
        .map_err(|e| VaultError::InvalidKey(format!("JWKの{name}のBase64URLデコードに失敗: {e}")))
}

/// Vaultによる署名結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutcome {
    /// 署名に使用された鍵のバージョン付き識別子
    pub key_id: String,
    /// 使用したアルゴリズム
    pub algorithm: SignatureAlgorithm,
    /// 生の署名バイト列
    pub signature: Vec<u8>,
}

/// 鍵管理サービスの抽象インターフェース。
///
/// 署名対象は常にSHA-256ダイジェスト。データのハッシュ化は呼び出し側で行う。
#[async_trait::async_trait]
pub trait KeyVault: Send + Sync {
    /// Vault種別を返す（ログ出力用）。
    fn vault_type(&self) -> &str;

    /// 設定された鍵の公開鍵情報を取得する。
    async fn get_key(&self) -> Result<VaultKey, VaultError>;

    /// 鍵`key_id`でダイジェストに署名する。
    async fn sign_digest(
        &self,
        key_id: &str,
        algorithm: SignatureAlgorithm,
        digest: &[u8],
    ) -> Result<SignOutcome, VaultError>;

    /// 鍵`key_id`でダイジェストに対する署名を検証する。
    ///
    /// 署名不一致は`Ok(false)`、通信・形式エラーは`Err`。
    async fn verify_digest(
        &self,
        key_id: &str,
        algorithm: SignatureAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, VaultError>;
}
