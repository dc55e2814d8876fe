//! # Key Vault Signing API
//!
//! リモートの鍵管理サービス（Azure Key Vault）に保持されたRSA鍵で
//! テキストに署名・検証するHTTP API。秘密鍵を使う処理はすべてVaultに委譲する。
//!
//! ## API エンドポイント
//! - `POST /sign` — JSON文字列を受け取り、RS256署名をBase64で返す
//! - `POST /verify` — data / signature / algorithm を受け取り、`Valid` / `Invalid` を返す
//!
//! 両エンドポイントは `/signing/sign`・`/signing/verify` でも公開する。
//!
//! ## 環境変数
//! - `BIND_ADDR`, `KEY_VAULT_URL` / `KEY_VAULT_NAME`, `KEY_NAME`, `KEY_VERSION`,
//!   `KEY_VAULT_API_VERSION`, `VERIFY_MODE`, `HTTP_TIMEOUT_SECS`, `MOCK_MODE`
//! - 認証: `AZURE_ACCESS_TOKEN` / `AZURE_TENANT_ID` + `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` /
//!   マネージドID

mod config;
mod endpoints;
mod error;
mod key_cache;

use std::sync::Arc;

use kvsign_vault::{default_credential_from_env, AzureKeyVault, KeyVault, MockKeyVault};

use crate::config::{ApiConfig, ApiState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ApiConfig::from_env()?;

    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    // Vault選択: MOCK_MODE=true ならモック、それ以外はAzure Key Vault
    let vault: Box<dyn KeyVault> = if config.mock_mode {
        tracing::warn!("MockKeyVaultで起動します（開発環境用）");
        Box::new(MockKeyVault::new(&config.vault.key_name)?)
    } else {
        let credential = default_credential_from_env(http_client.clone());
        tracing::info!(
            vault_url = %config.vault.vault_url,
            key_name = %config.vault.key_name,
            key_version = config.vault.key_version.as_deref().unwrap_or("latest"),
            credential = credential.name(),
            "Azure Key Vaultで起動します"
        );
        Box::new(AzureKeyVault::new(
            config.vault.clone(),
            http_client,
            credential,
        ))
    };

    let state = Arc::new(ApiState::new(vault, config.verify_mode));
    let app = endpoints::router(state);

    tracing::info!(verify_mode = ?config.verify_mode, "APIを {} で起動します", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("APIを停止しました");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("SIGINTを受信しました。シャットダウンします"),
        Err(e) => tracing::error!("SIGINTの待ち受けに失敗: {e}"),
    }
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
