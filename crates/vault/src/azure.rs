//! # Azure Key Vault REST クライアント
//!
//! - 鍵取得: `GET {vault_url}/keys/{name}[/{version}]?api-version=7.4`
//! - 署名: `POST {kid}/sign?api-version=7.4`
//! - 検証: `POST {kid}/verify?api-version=7.4`
//!
//! 署名・検証の宛先には鍵取得時に返されたバージョン付き`kid`を使う。

use base64::Engine;
use kvsign_crypto::b64url;
use kvsign_types::{
    KeyBundle, KeyOperationResult, KeySignParameters, KeyVaultErrorBody, KeyVerifyParameters,
    KeyVerifyResult, SignatureAlgorithm,
};
use serde::de::DeserializeOwned;

use crate::credential::TokenCredential;
use crate::{KeyVault, SignOutcome, VaultError, VaultKey};

/// Key Vault REST APIのOAuth2スコープ
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// デフォルトのREST APIバージョン
pub const DEFAULT_API_VERSION: &str = "7.4";

/// Azure Key Vaultの接続設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureKeyVaultConfig {
    /// VaultのURL（例: `https://dxsigning-proto.vault.azure.net`）
    pub vault_url: String,
    /// 鍵の名前
    pub key_name: String,
    /// 鍵のバージョン。Noneなら最新バージョン。
    pub key_version: Option<String>,
    /// REST APIバージョン
    pub api_version: String,
}

impl AzureKeyVaultConfig {
    /// Vault名から`https://{name}.vault.azure.net`を組み立てる。
    pub fn vault_url_from_name(vault_name: &str) -> String {
        format!("https://{vault_name}.vault.azure.net")
    }

    fn key_url(&self) -> String {
        let base = self.vault_url.trim_end_matches('/');
        match &self.key_version {
            Some(version) => format!(
                "{base}/keys/{}/{version}?api-version={}",
                self.key_name, self.api_version
            ),
            None => format!(
                "{base}/keys/{}?api-version={}",
                self.key_name, self.api_version
            ),
        }
    }

    fn operation_url(&self, key_id: &str, operation: &str) -> String {
        format!(
            "{}/{operation}?api-version={}",
            key_id.trim_end_matches('/'),
            self.api_version
        )
    }
}

/// Azure Key Vault REST APIによる`KeyVault`実装。
pub struct AzureKeyVault {
    config: AzureKeyVaultConfig,
    http_client: reqwest::Client,
    credential: Box<dyn TokenCredential>,
}

impl AzureKeyVault {
    pub fn new(
        config: AzureKeyVaultConfig,
        http_client: reqwest::Client,
        credential: Box<dyn TokenCredential>,
    ) -> Self {
        Self {
            config,
            http_client,
            credential,
        }
    }

    pub fn config(&self) -> &AzureKeyVaultConfig {
        &self.config
    }

    async fn bearer_token(&self) -> Result<String, VaultError> {
        Ok(self.credential.get_token(KEY_VAULT_SCOPE).await?.token)
    }

    /// 認証ヘッダーを付与してリクエストを送信し、JSONレスポンスをデコードする。
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, VaultError> {
        let token = self.bearer_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VaultError::Http(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VaultError::Http(format!("レスポンス読み取り失敗: {e}")))?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| VaultError::InvalidResponse(format!("レスポンスのパースに失敗: {e}")))
    }
}

/// 非2xxレスポンスをエラーに変換する。Key Vault形式のボディでなければ本文をそのまま使う。
fn status_error(status: u16, body: &str) -> VaultError {
    match serde_json::from_str::<KeyVaultErrorBody>(body) {
        Ok(parsed) => VaultError::Status {
            status,
            code: parsed.error.code,
            message: parsed.error.message,
        },
        Err(_) => VaultError::Status {
            status,
            code: "Unknown".to_string(),
            message: body.to_string(),
        },
    }
}

#[async_trait::async_trait]
impl KeyVault for AzureKeyVault {
    fn vault_type(&self) -> &str {
        "azure"
    }

    async fn get_key(&self) -> Result<VaultKey, VaultError> {
        let bundle: KeyBundle = self
            .send_json(self.http_client.get(self.config.key_url()))
            .await?;

        if let Some(false) = bundle.attributes.as_ref().and_then(|a| a.enabled) {
            tracing::warn!(kid = %bundle.key.kid, "鍵が無効化されています");
        }

        Ok(VaultKey {
            key_id: bundle.key.kid.clone(),
            jwk: bundle.key,
        })
    }

    async fn sign_digest(
        &self,
        key_id: &str,
        algorithm: SignatureAlgorithm,
        digest: &[u8],
    ) -> Result<SignOutcome, VaultError> {
        let params = KeySignParameters {
            alg: algorithm,
            value: b64url().encode(digest),
        };
        let result: KeyOperationResult = self
            .send_json(
                self.http_client
                    .post(self.config.operation_url(key_id, "sign"))
                    .json(&params),
            )
            .await?;

        let signature = b64url().decode(&result.value).map_err(|e| {
            VaultError::InvalidResponse(format!("署名のBase64URLデコードに失敗: {e}"))
        })?;

        Ok(SignOutcome {
            key_id: result.kid,
            algorithm,
            signature,
        })
    }

    async fn verify_digest(
        &self,
        key_id: &str,
        algorithm: SignatureAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, VaultError> {
        let params = KeyVerifyParameters {
            alg: algorithm,
            digest: b64url().encode(digest),
            value: b64url().encode(signature),
        };
        let result: KeyVerifyResult = self
            .send_json(
                self.http_client
                    .post(self.config.operation_url(key_id, "verify"))
                    .json(&params),
            )
            .await?;
        Ok(result.value)
    }
}
