use axum::response::IntoResponse;
use axum::Json;

use crate::version::build_info;

pub async fn handler() -> impl IntoResponse {
    let build = build_info();
    Json(serde_json::json!({
        "version": build.version,
        "build_profile": build.build_profile,
        "features": build.build_features,
        "built_at": build.build_timestamp,
    }))
}
