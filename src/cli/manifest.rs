use std::path::Path;

use clap::ValueEnum;
use serde_json::{Value, json};

/// Name the extension passes to `connectNative`.
pub const NATIVE_HOST_NAME: &str = "com.tabtally.host";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Browser {
    Chrome,
    Firefox,
}

/// Native messaging manifest registering `host_path` for the given extension. Chromium based
/// browsers list allowed origins, Firefox lists extension ids.
pub fn host_manifest(browser: Browser, host_path: &Path, extension_id: &str) -> Value {
    let mut manifest = json!({
        "name": NATIVE_HOST_NAME,
        "description": "Accumulates time spent per website",
        "path": host_path.to_string_lossy(),
        "type": "stdio",
    });
    let allowed = match browser {
        Browser::Chrome => (
            "allowed_origins",
            json!([format!("chrome-extension://{extension_id}/")]),
        ),
        Browser::Firefox => ("allowed_extensions", json!([extension_id])),
    };
    manifest[allowed.0] = allowed.1;
    manifest
}
