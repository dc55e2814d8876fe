//! # アクセストークン取得
//!
//! Key Vault REST APIのBearerトークンを取得する資格情報の実装群。
//!
//! - `StaticTokenCredential` — 事前に取得したトークン（`AZURE_ACCESS_TOKEN`）
//! - `ClientSecretCredential` — サービスプリンシパルのクライアントシークレット
//! - `ManagedIdentityCredential` — App Service / IMDS のマネージドID
//!
//! 取得したトークンはスコープごとにメモリ内でキャッシュし、
//! 残り有効期間が`REFRESH_MARGIN_SECS`を切ったら再取得する。

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use kvsign_types::TokenResponse;
use tokio::sync::Mutex;

use crate::VaultError;

/// 有効期限のこの秒数前からトークンを再取得する。
pub const REFRESH_MARGIN_SECS: u64 = 300;

/// Entra IDのデフォルトauthority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Azure Instance Metadata Serviceのトークンエンドポイント
pub const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Bearerアクセストークン。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    /// 有効期限（UNIX秒）
    pub expires_at: u64,
}

impl AccessToken {
    /// `now`時点で再取得せずに使えるかどうか。
    pub fn is_fresh(&self, now: u64) -> bool {
        self.expires_at > now.saturating_add(REFRESH_MARGIN_SECS)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// スコープ（例: `https://vault.azure.net/.default`）に対するトークンを返す資格情報。
#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync {
    /// 資格情報の種別（ログ出力用）。
    fn name(&self) -> &str;

    /// スコープに対するアクセストークンを取得する。
    async fn get_token(&self, scope: &str) -> Result<AccessToken, VaultError>;
}

// ---------------------------------------------------------------------------
// キャッシュ
// ---------------------------------------------------------------------------

/// スコープ単位のトークンキャッシュ。
///
/// 取得中はロックを保持し、同時に期限切れを検知したリクエストの重複取得を防ぐ。
#[derive(Default)]
struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    async fn get_or_fetch<F, Fut>(&self, scope: &str, fetch: F) -> Result<AccessToken, VaultError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AccessToken, VaultError>>,
    {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.get(scope) {
            if token.is_fresh(now_secs()) {
                return Ok(token.clone());
            }
        }

        let token = fetch().await?;
        tracing::debug!(scope, expires_at = token.expires_at, "アクセストークンを取得しました");
        tokens.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}

/// トークンエンドポイントのレスポンスを`AccessToken`に変換する。
async fn read_token_response(response: reqwest::Response) -> Result<AccessToken, VaultError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| VaultError::Credential(format!("レスポンス読み取り失敗: {e}")))?;

    if !status.is_success() {
        return Err(VaultError::Credential(format!(
            "トークンエンドポイントがエラーを返しました: HTTP {status} - {body}"
        )));
    }

    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| VaultError::Credential(format!("トークンレスポンスのパースに失敗: {e}")))?;

    Ok(AccessToken {
        token: parsed.access_token,
        expires_at: now_secs().saturating_add(parsed.expires_in),
    })
}

/// `https://vault.azure.net/.default` → `https://vault.azure.net`
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

// ---------------------------------------------------------------------------
// 静的トークン
// ---------------------------------------------------------------------------

/// 事前に取得したトークンをそのまま返す資格情報。開発・CI用。
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenCredential for StaticTokenCredential {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_token(&self, _scope: &str) -> Result<AccessToken, VaultError> {
        // 有効期限は不明なため、常に有効とみなす
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: u64::MAX,
        })
    }
}

// ---------------------------------------------------------------------------
// クライアントシークレット
// ---------------------------------------------------------------------------

/// OAuth2 client credentialsフローでトークンを取得する資格情報。
pub struct ClientSecretCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    http_client: reqwest::Client,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            authority_host: authority_host.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http_client,
            cache: TokenCache::default(),
        }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken, VaultError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];
        let response = self
            .http_client
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| VaultError::Credential(format!("HTTP送信失敗: {e}")))?;
        read_token_response(response).await
    }
}

#[async_trait::async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &str {
        "client-secret"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, VaultError> {
        self.cache.get_or_fetch(scope, || self.fetch(scope)).await
    }
}

// ---------------------------------------------------------------------------
// マネージドID
// ---------------------------------------------------------------------------

/// マネージドIDのトークン取得先。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentitySource {
    /// App Service / Functions（`IDENTITY_ENDPOINT` + `IDENTITY_HEADER`）
    AppService { endpoint: String, header: String },
    /// VM / AKS 等（Instance Metadata Service）
    Imds { url: String },
}

/// マネージドIDでトークンを取得する資格情報。
pub struct ManagedIdentityCredential {
    source: ManagedIdentitySource,
    /// ユーザー割り当てIDのクライアントID。Noneならシステム割り当て。
    client_id: Option<String>,
    http_client: reqwest::Client,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new(
        source: ManagedIdentitySource,
        client_id: Option<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            source,
            client_id,
            http_client,
            cache: TokenCache::default(),
        }
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken, VaultError> {
        let resource = scope_to_resource(scope);
        let mut query = vec![("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let request = match &self.source {
            ManagedIdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.http_client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
            }
            ManagedIdentitySource::Imds { url } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.http_client
                    .get(url)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::Credential(format!("マネージドIDエンドポイントへの送信失敗: {e}")))?;
        read_token_response(response).await
    }
}

#[async_trait::async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &str {
        match self.source {
            ManagedIdentitySource::AppService { .. } => "managed-identity-app-service",
            ManagedIdentitySource::Imds { .. } => "managed-identity-imds",
        }
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, VaultError> {
        self.cache.get_or_fetch(scope, || self.fetch(scope)).await
    }
}

// ---------------------------------------------------------------------------
// 環境変数からの選択
// ---------------------------------------------------------------------------

/// 環境変数から資格情報を選択する。
///
/// 優先順位:
/// 1. `AZURE_ACCESS_TOKEN`
/// 2. `AZURE_TENANT_ID` + `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET`
/// 3. マネージドID（`IDENTITY_ENDPOINT` + `IDENTITY_HEADER` があればApp Service、なければIMDS）
pub fn default_credential_from_env(http_client: reqwest::Client) -> Box<dyn TokenCredential> {
    credential_from_lookup(|name| std::env::var(name).ok(), http_client)
}

pub(crate) fn credential_from_lookup<F>(
    lookup: F,
    http_client: reqwest::Client,
) -> Box<dyn TokenCredential>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = var("AZURE_ACCESS_TOKEN") {
        return Box::new(StaticTokenCredential::new(token));
    }

    if let (Some(tenant_id), Some(client_id), Some(client_secret)) = (
        var("AZURE_TENANT_ID"),
        var("AZURE_CLIENT_ID"),
        var("AZURE_CLIENT_SECRET"),
    ) {
        let authority_host =
            var("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
        return Box::new(ClientSecretCredential::new(
            authority_host,
            tenant_id,
            client_id,
            client_secret,
            http_client,
        ));
    }

    let source = match (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER")) {
        (Some(endpoint), Some(header)) => ManagedIdentitySource::AppService { endpoint, header },
        _ => ManagedIdentitySource::Imds {
            url: IMDS_TOKEN_URL.to_string(),
        },
    };
    Box::new(ManagedIdentityCredential::new(
        source,
        var("AZURE_CLIENT_ID"),
        http_client,
    ))
}
