//! # Key Vault Signing 共有型定義
//!
//! HTTP APIのリクエスト/レスポンスと、Key Vault REST API（api-version 7.4）の
//! ワイヤ型をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - Base64（Standard、パディングあり）: APIクライアントとの間でやり取りする署名
//! - Base64URL（パディングなし）: Key Vault REST APIのダイジェスト・署名・JWK成分

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// 署名アルゴリズム
// ---------------------------------------------------------------------------

/// サポートする署名アルゴリズム。
///
/// Key Vault自体はRS384/PS256等もサポートするが、本APIが受け付けるのはRS256のみ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 + SHA-256
    #[serde(rename = "RS256")]
    Rs256,
}

impl SignatureAlgorithm {
    /// Key Vault / JWAでのアルゴリズム名を返す。
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Rs256 => "RS256",
        }
    }

    /// アルゴリズム名からパースする。大文字小文字は区別する。
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(SignatureAlgorithm::Rs256),
            _ => None,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HTTP API (POST /sign, POST /verify)
// ---------------------------------------------------------------------------

/// POST /sign のリクエストボディ。
///
/// オブジェクトではなく素のJSON文字列（例: `"hello"`）を受け付ける。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignRequest(pub String);

/// POST /sign のレスポンス。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// 使用したアルゴリズム名（"RS256"）
    #[serde(alias = "Algorithm")]
    pub algorithm: String,
    /// Base64エンコードされた署名
    #[serde(alias = "Signature")]
    pub signature: String,
}

/// POST /verify のリクエストボディ。
///
/// フィールド名はcamelCase・PascalCaseのどちらでも受け付ける。
/// 欠落したフィールドは空文字列として扱う（アルゴリズム未指定は400で返すため）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// 署名対象のテキスト（UTF-8でバイト列化して検証する）
    #[serde(default, alias = "Data")]
    pub data: String,
    /// Base64エンコードされた署名
    #[serde(default, alias = "Signature")]
    pub signature: String,
    /// アルゴリズム名。"RS256" 以外は拒否される。
    #[serde(default, alias = "Algorithm")]
    pub algorithm: String,
}

// ---------------------------------------------------------------------------
// Key Vault REST API ワイヤ型
// ---------------------------------------------------------------------------

/// Key Vaultが返すJSON Web Key（公開鍵部分のみ）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// バージョン付きの鍵識別子URL
    pub kid: String,
    /// 鍵種別 ("RSA", "RSA-HSM", "EC" ...)
    pub kty: String,
    /// 許可された鍵操作 ("sign", "verify" ...)
    #[serde(default)]
    pub key_ops: Vec<String>,
    /// RSAモジュラス（Base64URL、ビッグエンディアン）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA公開指数（Base64URL、ビッグエンディアン）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl JsonWebKey {
    /// RSA鍵かどうか（ソフトウェア鍵・HSM鍵の両方）。
    pub fn is_rsa(&self) -> bool {
        self.kty == "RSA" || self.kty == "RSA-HSM"
    }
}

/// 鍵の属性。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// 作成日時（UNIX秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    /// 更新日時（UNIX秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_level: Option<String>,
}

/// `GET /keys/{name}/{version}` のレスポンス。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    pub key: JsonWebKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<KeyAttributes>,
}

/// `POST {kid}/sign` のリクエストボディ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignParameters {
    pub alg: SignatureAlgorithm,
    /// Base64URLエンコードされたダイジェスト
    pub value: String,
}

/// `POST {kid}/verify` のリクエストボディ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVerifyParameters {
    pub alg: SignatureAlgorithm,
    /// Base64URLエンコードされたダイジェスト
    pub digest: String,
    /// Base64URLエンコードされた署名
    pub value: String,
}

/// 鍵操作（sign等）の結果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOperationResult {
    /// 操作に使用された鍵のバージョン付き識別子
    pub kid: String,
    /// Base64URLエンコードされた結果（署名）
    pub value: String,
}

/// `POST {kid}/verify` のレスポンス。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVerifyResult {
    pub value: bool,
}

/// Key Vaultのエラーレスポンス。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVaultErrorBody {
    pub error: KeyVaultErrorDetail,
}

/// Key Vaultのエラー詳細。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVaultErrorDetail {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// OAuth2 トークンレスポンス
// ---------------------------------------------------------------------------

/// トークンエンドポイント（Entra ID / IMDS / App Service）のレスポンス。
///
/// Entra IDは`expires_in`を数値で、IMDS・App Serviceは数値文字列で返す。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// 有効期間（秒）
    #[serde(deserialize_with = "deserialize_seconds")]
    pub expires_in: u64,
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
