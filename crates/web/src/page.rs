//! The playground page: askama template plus server-injected gon data.

use {
    askama::Template,
    axum::{
        extract::State,
        response::{Html, IntoResponse},
    },
    tracing::warn,
};

use crate::{
    AppState,
    assets::{asset_content_hash, is_dev_assets},
};

/// Server-side data injected into the page as `window.__SANDPIT__` so the
/// client script can render synchronously, without an initial fetch.
#[derive(serde::Serialize)]
pub(crate) struct GonData<'a> {
    ws_path: &'static str,
    default_source: &'a str,
}

#[derive(Template)]
#[template(path = "playground.html", escape = "html")]
struct PlaygroundHtmlTemplate<'a> {
    page_title: &'a str,
    language: &'a str,
    asset_prefix: &'a str,
    nonce: &'a str,
    gon_json: &'a str,
}

/// Serialize gon data so it is safe to embed inside a `<script>` tag.
pub(crate) fn script_safe_json<T: serde::Serialize>(value: &T) -> String {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to serialize gon data for html template");
            "{}".to_owned()
        },
    };
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

pub async fn playground_page_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (_build_ts, asset_prefix) = if is_dev_assets() {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        ("dev".to_owned(), format!("/assets/v/{ts}/"))
    } else {
        static HASH: std::sync::LazyLock<String> = std::sync::LazyLock::new(asset_content_hash);
        (HASH.to_string(), format!("/assets/v/{}/", *HASH))
    };

    let nonce = uuid::Uuid::new_v4().to_string();
    let gon = GonData {
        ws_path: "/api/playground/ws",
        default_source: state.playground.initial_source(),
    };
    let gon_json = script_safe_json(&gon);

    let template = PlaygroundHtmlTemplate {
        page_title: "sandpit",
        language: "typescript",
        asset_prefix: &asset_prefix,
        nonce: &nonce,
        gon_json: &gon_json,
    };
    let body = match template.render() {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "failed to render playground template");
            String::new()
        },
    };

    // The preview iframe points at the sandbox server on a loopback port, so
    // frame-src must allow loopback origins besides 'self'.
    let csp = format!(
        "default-src 'self'; \
         script-src 'self' 'nonce-{nonce}'; \
         style-src 'self'; \
         img-src 'self' data:; \
         connect-src 'self' ws: wss:; \
         frame-src http://localhost:* http://127.0.0.1:*; \
         form-action 'self'; \
         base-uri 'self'; \
         object-src 'none'"
    );

    let mut response = Html(body).into_response();
    let headers = response.headers_mut();
    if let Ok(val) = "no-cache, no-store".parse() {
        headers.insert(axum::http::header::CACHE_CONTROL, val);
    }
    if let Ok(val) = csp.parse() {
        headers.insert(axum::http::header::CONTENT_SECURITY_POLICY, val);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn script_safe_json_escapes_html() {
        let val = "</script><script>alert(1)</script>";
        let safe = script_safe_json(&val);
        assert!(!safe.contains('<'));
        assert!(!safe.contains('>'));
    }

    #[test]
    fn gon_data_carries_the_editor_seed() {
        let gon = GonData {
            ws_path: "/api/playground/ws",
            default_source: "console.log(1);",
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&gon).unwrap()).unwrap();
        assert_eq!(json["ws_path"], "/api/playground/ws");
        assert_eq!(json["default_source"], "console.log(1);");
    }

    #[test]
    fn template_renders_the_language_badge() {
        let template = PlaygroundHtmlTemplate {
            page_title: "sandpit",
            language: "typescript",
            asset_prefix: "/assets/v/dev/",
            nonce: "n",
            gon_json: "{}",
        };
        let html = template.render().unwrap();
        assert!(html.contains(r#"<span class="lang">typescript</span>"#));
        assert!(html.contains("id=\"editor\""));
    }
}
