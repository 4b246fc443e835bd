//! Browser CRUD client.
//!
//! The page and its script are compiled into the binary; there is no
//! generic static file serving.

use axum::{
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

const FARMS_PAGE: &str = include_str!("../../assets/farms.html");
const FARMS_SCRIPT: &str = include_str!("../../assets/farms-crud.js");

/// GET / and GET /farms.html
pub async fn farms_page() -> Html<&'static str> {
    Html(FARMS_PAGE)
}

/// GET /assets/farms-crud.js
pub async fn farms_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        FARMS_SCRIPT,
    )
}

pub fn create_router() -> Router {
    Router::new()
        .route("/", get(farms_page))
        .route("/farms.html", get(farms_page))
        .route("/assets/farms-crud.js", get(farms_script))
}
