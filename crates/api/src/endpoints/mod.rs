//! # APIエンドポイント
//!
//! 同じハンドラを`/`直下と`/signing`配下の両方に公開する。

pub mod sign;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use axum::routing::post;
use axum::Router;

pub use sign::handle_sign;
pub use verify::handle_verify;

use crate::config::ApiState;

/// `/sign`・`/verify`のルーターを構築する。
pub fn router(state: Arc<ApiState>) -> Router {
    let signing = Router::new()
        .route("/sign", post(handle_sign))
        .route("/verify", post(handle_verify));

    Router::new()
        .merge(signing.clone())
        .nest("/signing", signing)
        .with_state(state)
}
