//! Websocket endpoint for a monitoring session.
//!
//! The configured `statusUrl` names the server and, through its path, the
//! Socket.IO namespace. The transport itself always lives at
//! `/socket.io/` and identifies the session through the `name` and
//! `project` query parameters.

use std::path::Path;

use url::Url;

use crate::error::SetupError;
use crate::protocol::DEFAULT_NAMESPACE;

const ENGINE_IO_PATH: &str = "/socket.io/";
const ENGINE_IO_VERSION: &str = "4";
const UNKNOWN_PROJECT: &str = "unknown";

/// How a session introduces itself to the monitoring server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub script_name: String,
    pub project: String,
}

impl SessionIdentity {
    pub fn new(script_name: impl Into<String>, root_dir: &Path) -> Self {
        Self {
            script_name: script_name.into(),
            project: project_label(&root_dir.to_string_lossy()),
        }
    }
}

/// Last path segment of the application root.
///
/// Forward slashes are tried first, then backslashes. An empty result
/// becomes `"unknown"`.
pub fn project_label(root: &str) -> String {
    let trimmed = root.trim_end_matches(|c| c == '/' || c == '\\');
    let source = if trimmed.is_empty() { root } else { trimmed };

    let mut segments: Vec<&str> = source.split('/').collect();
    if segments.len() < 2 {
        segments = source.split('\\').collect();
    }

    let label = segments.last().copied().unwrap_or(source);
    if label.is_empty() {
        UNKNOWN_PROJECT.to_string()
    } else {
        label.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    pub namespace: String,
}

impl Endpoint {
    pub fn build(status_url: &str, identity: &SessionIdentity) -> Result<Self, SetupError> {
        let invalid = |reason: String| SetupError::InvalidUrl {
            url: status_url.to_string(),
            reason,
        };

        let mut url = Url::parse(status_url).map_err(|e| invalid(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| invalid(format!("cannot use scheme '{scheme}'")))?;

        let namespace = match url.path().trim_end_matches('/') {
            "" => DEFAULT_NAMESPACE.to_string(),
            path => path.to_string(),
        };

        url.set_path(ENGINE_IO_PATH);
        url.set_query(None);
        url.set_fragment(None);
        url.query_pairs_mut()
            .append_pair("EIO", ENGINE_IO_VERSION)
            .append_pair("transport", "websocket")
            .append_pair("name", &identity.script_name)
            .append_pair("project", &identity.project);

        Ok(Self { url, namespace })
    }
}
