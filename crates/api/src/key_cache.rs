//! # 公開鍵ハンドルのキャッシュ
//!
//! 最初のリクエストでVaultから鍵を取得し、以後はプロセス内のキャッシュを使う。
//! 同時に到着した最初のリクエスト群は1回の取得を共有する。
//! 取得に失敗した場合はキャッシュは空のままで、次のリクエストが再取得する。

use std::sync::Arc;

use kvsign_crypto::RsaPublicKey;
use kvsign_vault::{KeyVault, VaultError, VaultKey};
use tokio::sync::OnceCell;

/// キャッシュされた鍵情報。
#[derive(Debug)]
pub struct CachedKey {
    /// バージョン付き鍵識別子とJWK
    pub key: VaultKey,
    /// JWKから構築済みのRSA公開鍵
    pub public_key: RsaPublicKey,
}

#[derive(Debug, Default)]
pub struct KeyCache {
    cell: OnceCell<Arc<CachedKey>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// キャッシュ済みの鍵を返す。未取得ならNone。
    #[cfg(test)]
    pub fn get(&self) -> Option<Arc<CachedKey>> {
        self.cell.get().cloned()
    }

    /// キャッシュ済みの鍵を返す。未取得ならVaultから取得してキャッシュする。
    pub async fn get_or_fetch(&self, vault: &dyn KeyVault) -> Result<Arc<CachedKey>, VaultError> {
        self.cell
            .get_or_try_init(|| async {
                let key = vault.get_key().await?;
                let public_key = key.public_key()?;
                tracing::info!(
                    vault = vault.vault_type(),
                    key_id = %key.key_id,
                    kty = %key.jwk.kty,
                    "公開鍵を取得しキャッシュしました"
                );
                Ok::<_, VaultError>(Arc::new(CachedKey { key, public_key }))
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kvsign_types::SignatureAlgorithm;
    use kvsign_vault::{MockKeyVault, SignOutcome};

    use crate::endpoints::test_helpers::shared_private_key;

    /// 最初の`failures`回の鍵取得に失敗するVault。
    struct FlakyVault {
        inner: MockKeyVault,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl KeyVault for FlakyVault {
        fn vault_type(&self) -> &str {
            "flaky"
        }

        async fn get_key(&self) -> Result<VaultKey, VaultError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(VaultError::Http("connection refused".to_string()));
            }
            self.inner.get_key().await
        }

        async fn sign_digest(
            &self,
            key_id: &str,
            algorithm: SignatureAlgorithm,
            digest: &[u8],
        ) -> Result<SignOutcome, VaultError> {
            self.inner.sign_digest(key_id, algorithm, digest).await
        }

        async fn verify_digest(
            &self,
            key_id: &str,
            algorithm: SignatureAlgorithm,
            digest: &[u8],
            signature: &[u8],
        ) -> Result<bool, VaultError> {
            self.inner
                .verify_digest(key_id, algorithm, digest, signature)
                .await
        }
    }

    #[tokio::test]
    async fn test_fetches_once() {
        let vault = MockKeyVault::with_private_key("testkey", shared_private_key());
        let cache = KeyCache::new();
        assert!(cache.get().is_none());

        let first = cache.get_or_fetch(&vault).await.unwrap();
        let second = cache.get_or_fetch(&vault).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.key.key_id, vault.key_id());
        assert_eq!(vault.fetch_count(), 1);
        assert!(cache.get().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_share_fetch() {
        let vault = Arc::new(MockKeyVault::with_private_key(
            "testkey",
            shared_private_key(),
        ));
        let cache = Arc::new(KeyCache::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let vault = vault.clone();
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_fetch(vault.as_ref())
                        .await
                        .map(|k| k.key.key_id.clone())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vault.key_id());
        }
        assert_eq!(vault.fetch_count(), 1);
    }

    /// 取得失敗はキャッシュされず、次の呼び出しで再取得される
    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let vault = FlakyVault {
            inner: MockKeyVault::with_private_key("testkey", shared_private_key()),
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let cache = KeyCache::new();

        assert!(matches!(
            cache.get_or_fetch(&vault).await,
            Err(VaultError::Http(_))
        ));
        assert!(cache.get().is_none());

        let key = cache.get_or_fetch(&vault).await.unwrap();
        assert_eq!(key.key.key_id, vault.inner.key_id());
        assert_eq!(vault.calls.load(Ordering::SeqCst), 2);
    }
}
