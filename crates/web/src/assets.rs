//! Static asset serving: filesystem (dev) or embedded (release).
//!
//! In dev mode (`cargo run`), assets are served from disk so edits are
//! picked up on reload. In release builds the assets directory is embedded
//! into the binary via `include_dir!` and served with immutable
//! cache-control headers keyed by a content hash.

use std::{
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

use {
    axum::{extract::Path as AxumPath, http::StatusCode, response::IntoResponse},
    tracing::info,
};

static ASSETS: include_dir::Dir = include_dir::include_dir!("$CARGO_MANIFEST_DIR/src/assets");

/// Filesystem path to serve assets from, if available. Checked once at
/// startup: `SANDPIT_ASSETS_DIR` takes precedence, then the crate source
/// tree when running via `cargo run`.
static FS_ASSETS_DIR: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    if let Ok(dir) = std::env::var("SANDPIT_ASSETS_DIR") {
        let p = PathBuf::from(dir);
        if p.is_dir() {
            info!("serving assets from filesystem: {}", p.display());
            return Some(p);
        }
    }

    let cargo_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/assets");
    if cargo_dir.is_dir() {
        info!("serving assets from filesystem: {}", cargo_dir.display());
        return Some(cargo_dir);
    }

    info!("serving assets from embedded binary");
    None
});

/// Whether we're serving from the filesystem (dev) or embedded (release).
pub(crate) fn is_dev_assets() -> bool {
    FS_ASSETS_DIR.is_some()
}

/// Short content hash over all embedded assets, for cache-busting URLs.
pub(crate) fn asset_content_hash() -> String {
    use std::{collections::BTreeMap, hash::Hasher};

    let mut files = BTreeMap::new();
    let mut stack: Vec<&include_dir::Dir<'_>> = vec![&ASSETS];
    while let Some(dir) = stack.pop() {
        for file in dir.files() {
            files.insert(file.path().display().to_string(), file.contents());
        }
        for sub in dir.dirs() {
            stack.push(sub);
        }
    }

    let mut h = std::hash::DefaultHasher::new();
    for (path, contents) in &files {
        h.write(path.as_bytes());
        h.write(contents);
    }
    format!("{:016x}", h.finish())
}

fn mime_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "json" => "application/json",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Reject absolute paths and `..` components so a requested asset path can
/// never resolve outside the asset root. A lexical `starts_with` check is
/// not enough: `root.join("../x")` still starts with `root`.
fn sanitize_asset_path(path: &str) -> Option<&Path> {
    let rel = Path::new(path);
    if rel.is_absolute() {
        return None;
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            _ => return None,
        }
    }
    Some(rel)
}

/// Read an asset file, preferring filesystem over embedded.
fn read_asset(path: &str) -> Option<Vec<u8>> {
    let rel = sanitize_asset_path(path)?;
    if let Some(dir) = FS_ASSETS_DIR.as_ref()
        && let Ok(bytes) = std::fs::read(dir.join(rel))
    {
        return Some(bytes);
    }
    ASSETS.get_file(rel).map(|f| f.contents().to_vec())
}

/// Versioned assets: `/assets/v/<hash>/path` — immutable, cached forever.
pub async fn versioned_asset_handler(
    AxumPath((_version, path)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    let cache = if is_dev_assets() {
        "no-cache, no-store"
    } else {
        "public, max-age=31536000, immutable"
    };
    serve_asset(&path, cache)
}

/// Unversioned assets: `/assets/path` — always revalidate.
pub async fn asset_handler(AxumPath(path): AxumPath<String>) -> impl IntoResponse {
    let cache = if is_dev_assets() {
        "no-cache, no-store"
    } else {
        "no-cache"
    };
    serve_asset(&path, cache)
}

fn serve_asset(path: &str, cache_control: &'static str) -> axum::response::Response {
    match read_asset(path) {
        Some(body) => (
            StatusCode::OK,
            [
                ("content-type", mime_for_path(path)),
                ("cache-control", cache_control),
                ("x-content-type-options", "nosniff"),
            ],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_covers_the_shipped_assets() {
        assert_eq!(mime_for_path("app.js"), "application/javascript; charset=utf-8");
        assert_eq!(mime_for_path("style.css"), "text/css; charset=utf-8");
        assert_eq!(mime_for_path("unknown.bin"), "application/octet-stream");
    }

    #[test]
    fn embedded_assets_are_present() {
        assert!(read_asset("app.js").is_some());
        assert!(read_asset("style.css").is_some());
    }

    #[test]
    fn traversal_never_escapes_the_asset_root() {
        // These targets exist on disk, so a lexical check alone would
        // happily serve them through the dev filesystem fallback.
        assert!(read_asset("../Cargo.toml").is_none());
        assert!(read_asset("../../Cargo.toml").is_none());
        assert!(read_asset("../../../Cargo.toml").is_none());
        assert!(read_asset("a/../../escape").is_none());
        assert!(read_asset("/etc/passwd").is_none());
        // Plain nested paths stay allowed.
        assert!(sanitize_asset_path("fonts/mono.woff2").is_some());
        assert!(sanitize_asset_path("./app.js").is_some());
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(asset_content_hash(), asset_content_hash());
        assert_eq!(asset_content_hash().len(), 16);
    }
}
