//! # エンドポイントテスト用共通ヘルパー

use std::sync::{Arc, OnceLock};

use kvsign_crypto::{generate_rsa_key, RsaPrivateKey};
use kvsign_vault::MockKeyVault;

use crate::config::{ApiState, VerifyMode};

/// テスト全体で共有するRSA-2048鍵。鍵生成は遅いので一度だけ行う。
pub fn shared_private_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| generate_rsa_key(2048).unwrap()).clone()
}

/// モックVaultを使うテスト用ApiStateを構築する。
pub fn test_state(verify_mode: VerifyMode) -> Arc<ApiState> {
    let vault = MockKeyVault::with_private_key("testkey", shared_private_key());
    Arc::new(ApiState::new(Box::new(vault), verify_mode))
}
