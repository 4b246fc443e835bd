//! Dashboard embed page.

use std::sync::Arc;

use axum::{extract::State, response::Html};

use crate::{
    config::AppConfig,
    error::{ApiError, ApiResult},
};

/// GET /dashboard - Page embedding the configured dashboard URL
pub async fn dashboard_page(State(config): State<Arc<AppConfig>>) -> ApiResult<Html<String>> {
    let url = config.dashboard_url.as_deref().ok_or_else(|| {
        ApiError::configuration_missing("Missing dashboard configuration: DATABRICKS_DASHBOARD_URL")
    })?;
    Ok(Html(render(url)))
}

fn render(url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head><meta charset="utf-8"><title>Databricks Dashboard</title></head>
  <body>
    <h1>Databricks Dashboard</h1>
    <iframe src="{}" width="100%" height="600" frameborder="0"></iframe>
  </body>
</html>
"#,
        escape_html(url)
    )
}

/// Escape text for use inside a double-quoted HTML attribute.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
