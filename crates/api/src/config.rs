//! # API設定・共有状態
//!
//! 環境変数からの設定読み込みとAPIサーバーの共有状態の定義。

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use kvsign_vault::azure::DEFAULT_API_VERSION;
use kvsign_vault::{AzureKeyVaultConfig, KeyVault};

use crate::key_cache::KeyCache;

/// デフォルトの待ち受けアドレス
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
/// デフォルトのKey Vault名
pub const DEFAULT_KEY_VAULT_NAME: &str = "dxsigning-proto";
/// デフォルトの鍵名
pub const DEFAULT_KEY_NAME: &str = "testkey";
/// Key Vault / トークンエンドポイントへのHTTPタイムアウト（秒）
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// 署名検証の実行場所。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// キャッシュ済みの公開鍵でローカル検証する。
    #[default]
    Local,
    /// Key Vaultの`verify`操作を呼び出す。
    Remote,
}

impl FromStr for VerifyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(VerifyMode::Local),
            "remote" => Ok(VerifyMode::Remote),
            other => anyhow::bail!("VERIFY_MODEは local または remote である必要があります: {other}"),
        }
    }
}

/// 起動時に読み込むAPI設定。
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// 待ち受けアドレス（`BIND_ADDR`）
    pub bind_addr: SocketAddr,
    /// Key Vault接続設定
    pub vault: AzureKeyVaultConfig,
    /// 検証モード（`VERIFY_MODE`）
    pub verify_mode: VerifyMode,
    /// 外部HTTPタイムアウト（`HTTP_TIMEOUT_SECS`）
    pub http_timeout: Duration,
    /// `MOCK_MODE=true` ならメモリ内モックVaultを使う
    pub mock_mode: bool,
}

impl ApiConfig {
    /// 環境変数から設定を読み込む。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDRのパースに失敗")?;

        let vault_url = var("KEY_VAULT_URL").unwrap_or_else(|| {
            let name = var("KEY_VAULT_NAME").unwrap_or_else(|| DEFAULT_KEY_VAULT_NAME.to_string());
            AzureKeyVaultConfig::vault_url_from_name(&name)
        });

        let vault = AzureKeyVaultConfig {
            vault_url,
            key_name: var("KEY_NAME").unwrap_or_else(|| DEFAULT_KEY_NAME.to_string()),
            key_version: var("KEY_VERSION"),
            api_version: var("KEY_VAULT_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        };

        let verify_mode = match var("VERIFY_MODE") {
            Some(mode) => mode.parse()?,
            None => VerifyMode::default(),
        };

        let http_timeout_secs = match var("HTTP_TIMEOUT_SECS") {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .context("HTTP_TIMEOUT_SECSは整数である必要があります")?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            bind_addr,
            vault,
            verify_mode,
            http_timeout: Duration::from_secs(http_timeout_secs),
            mock_mode: var("MOCK_MODE").as_deref() == Some("true"),
        })
    }
}

/// APIサーバーの共有状態。
pub struct ApiState {
    /// 鍵管理サービスのクライアント
    pub vault: Box<dyn KeyVault>,
    /// 公開鍵ハンドルのプロセス内キャッシュ
    pub key_cache: KeyCache,
    /// 検証モード
    pub verify_mode: VerifyMode,
}

impl ApiState {
    pub fn new(vault: Box<dyn KeyVault>, verify_mode: VerifyMode) -> Self {
        Self {
            vault,
            key_cache: KeyCache::new(),
            verify_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<ApiConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.vault.vault_url,
            "https://dxsigning-proto.vault.azure.net"
        );
        assert_eq!(config.vault.key_name, "testkey");
        assert_eq!(config.vault.key_version, None);
        assert_eq!(config.vault.api_version, "7.4");
        assert_eq!(config.verify_mode, VerifyMode::Local);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(!config.mock_mode);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("KEY_VAULT_NAME", "other-vault"),
            ("KEY_NAME", "signing-key"),
            ("KEY_VERSION", "abc123"),
            ("VERIFY_MODE", "Remote"),
            ("HTTP_TIMEOUT_SECS", "5"),
            ("MOCK_MODE", "true"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.vault.vault_url, "https://other-vault.vault.azure.net");
        assert_eq!(config.vault.key_name, "signing-key");
        assert_eq!(config.vault.key_version.as_deref(), Some("abc123"));
        assert_eq!(config.verify_mode, VerifyMode::Remote);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert!(config.mock_mode);
    }

    /// KEY_VAULT_URLはKEY_VAULT_NAMEより優先される
    #[test]
    fn test_vault_url_takes_precedence() {
        let config = config_from(&[
            ("KEY_VAULT_URL", "https://custom.vault.azure.cn"),
            ("KEY_VAULT_NAME", "ignored"),
        ])
        .unwrap();
        assert_eq!(config.vault.vault_url, "https://custom.vault.azure.cn");
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("VERIFY_MODE", "sometimes")]).is_err());
        assert!(config_from(&[("HTTP_TIMEOUT_SECS", "thirty")]).is_err());
        assert!(config_from(&[("BIND_ADDR", "localhost")]).is_err());
    }
}
