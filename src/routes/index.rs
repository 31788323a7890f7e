use axum::Json;
use serde_json::{Value, json};

pub async fn get_index_route() -> Json<Value> {
    Json(json!({
        "message": "API de gestion des conventions de stage ENSAM",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
