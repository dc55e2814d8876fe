//! # ローカル開発用モックVault
//!
//! Key Vaultが利用できない開発環境で使用するモック実装。
//! メモリ内でRSA鍵を保持し、Key Vaultと同じくダイジェストに対して署名する。

use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use kvsign_crypto::{
    b64url, generate_rsa_key, rs256_sign_digest, rs256_verify_digest, rsa_public_key_components,
    CryptoError, RsaPrivateKey,
};
use kvsign_types::{JsonWebKey, SignatureAlgorithm};

use crate::{KeyVault, SignOutcome, VaultError, VaultKey};

/// モックVaultが生成するRSA鍵のビット長
pub const MOCK_KEY_BITS: usize = 2048;

/// モックVault。ローカル開発・テスト用。
pub struct MockKeyVault {
    /// `mock://keys/{name}/{version}`
    key_id: String,
    private_key: RsaPrivateKey,
    /// `get_key`の呼び出し回数
    fetch_count: AtomicUsize,
}

impl MockKeyVault {
    /// RSA-2048鍵を生成してモックVaultを初期化する。
    pub fn new(key_name: &str) -> Result<Self, VaultError> {
        Ok(Self::with_private_key(key_name, generate_rsa_key(MOCK_KEY_BITS)?))
    }

    /// 既存の秘密鍵からモックVaultを構築する。
    pub fn with_private_key(key_name: &str, private_key: RsaPrivateKey) -> Self {
        let version = uuid::Uuid::new_v4().simple().to_string();
        Self {
            key_id: format!("mock://keys/{key_name}/{version}"),
            private_key,
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// これまでに`get_key`が呼ばれた回数。
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    fn ensure_key_id(&self, key_id: &str) -> Result<(), VaultError> {
        if key_id != self.key_id {
            return Err(VaultError::Status {
                status: 404,
                code: "KeyNotFound".to_string(),
                message: format!("A key with (name/id) {key_id} was not found in this key vault."),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyVault for MockKeyVault {
    fn vault_type(&self) -> &str {
        "mock"
    }

    async fn get_key(&self) -> Result<VaultKey, VaultError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let (n, e) = rsa_public_key_components(&self.private_key.to_public_key());
        Ok(VaultKey {
            key_id: self.key_id.clone(),
            jwk: JsonWebKey {
                kid: self.key_id.clone(),
                kty: "RSA".to_string(),
                key_ops: vec!["sign".to_string(), "verify".to_string()],
                n: Some(b64url().encode(n)),
                e: Some(b64url().encode(e)),
            },
        })
    }

    async fn sign_digest(
        &self,
        key_id: &str,
        algorithm: SignatureAlgorithm,
        digest: &[u8],
    ) -> Result<SignOutcome, VaultError> {
        self.ensure_key_id(key_id)?;
        let signature = rs256_sign_digest(&self.private_key, digest)?;
        Ok(SignOutcome {
            key_id: self.key_id.clone(),
            algorithm,
            signature,
        })
    }

    async fn verify_digest(
        &self,
        key_id: &str,
        _algorithm: SignatureAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, VaultError> {
        self.ensure_key_id(key_id)?;
        match rs256_verify_digest(&self.private_key.to_public_key(), digest, signature) {
            Ok(()) => Ok(true),
            Err(CryptoError::SignatureVerifyError) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsign_crypto::{rs256_verify, sha256};

    #[tokio::test]
    async fn test_mock_vault_roundtrip() {
        let vault = MockKeyVault::new("testkey").unwrap();
        assert_eq!(vault.vault_type(), "mock");
        assert!(vault.key_id().starts_with("mock://keys/testkey/"));

        let key = vault.get_key().await.unwrap();
        assert_eq!(vault.fetch_count(), 1);
        assert_eq!(key.key_id, vault.key_id());

        let outcome = vault
            .sign_digest(&key.key_id, SignatureAlgorithm::Rs256, &sha256(b"hello"))
            .await
            .unwrap();
        rs256_verify(&key.public_key().unwrap(), b"hello", &outcome.signature).unwrap();

        assert!(vault
            .verify_digest(
                &key.key_id,
                SignatureAlgorithm::Rs256,
                &sha256(b"hello"),
                &outcome.signature
            )
            .await
            .unwrap());
        assert!(!vault
            .verify_digest(
                &key.key_id,
                SignatureAlgorithm::Rs256,
                &sha256(b"goodbye"),
                &outcome.signature
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_mock_vault_unknown_key_id() {
        let vault = MockKeyVault::new("testkey").unwrap();
        let err = vault
            .sign_digest("mock://keys/other/1", SignatureAlgorithm::Rs256, &sha256(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_mock_vault_rejects_bad_digest() {
        let vault = MockKeyVault::new("testkey").unwrap();
        let key_id = vault.key_id().to_string();
        let err = vault
            .sign_digest(&key_id, SignatureAlgorithm::Rs256, b"not a digest")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VaultError::Crypto(CryptoError::InvalidDigestLength(12))
        ));
    }
}
