//! Kernel runtime records and the info learned from the handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::KernelChannel;
use crate::refs::KernelRef;

/// Execution state as last reported by the kernel process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelStatus {
    #[default]
    Unknown,
    Starting,
    Idle,
    Busy,
    Restarting,
    Dead,
}

impl KernelStatus {
    /// Interpret a kernel-reported `execution_state`. Unrecognized values map
    /// to `Unknown` rather than failing.
    pub fn from_execution_state(state: &str) -> Self {
        match state {
            "starting" => KernelStatus::Starting,
            "idle" => KernelStatus::Idle,
            "busy" => KernelStatus::Busy,
            "restarting" => KernelStatus::Restarting,
            "dead" | "terminating" => KernelStatus::Dead,
            _ => KernelStatus::Unknown,
        }
    }
}

impl std::fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelStatus::Unknown => write!(f, "unknown"),
            KernelStatus::Starting => write!(f, "starting"),
            KernelStatus::Idle => write!(f, "idle"),
            KernelStatus::Busy => write!(f, "busy"),
            KernelStatus::Restarting => write!(f, "restarting"),
            KernelStatus::Dead => write!(f, "dead"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpLink {
    pub text: String,
    pub url: String,
}

/// Immutable snapshot of a kernel's identity and language capabilities.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KernelInfo {
    pub protocol_version: String,
    pub implementation: String,
    pub implementation_version: String,
    pub banner: String,
    pub help_links: Vec<HelpLink>,
    pub language_name: String,
    pub language_version: String,
    pub mimetype: Option<String>,
    pub file_extension: Option<String>,
    pub pygments_lexer: Option<String>,
    /// Either a mode name or a `{ "name": ..., "version": ... }` object.
    pub codemirror_mode: Option<Value>,
    pub nbconvert_exporter: Option<String>,
}

impl KernelInfo {
    /// Project `kernel_info_reply` content. Missing fields become empty
    /// strings / `None`; kernels are inconsistent about optional keys.
    pub fn from_reply_content(content: &Value) -> Self {
        let text = |v: &Value, key: &str| -> String {
            v.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let optional = |v: &Value, key: &str| -> Option<String> {
            v.get(key).and_then(Value::as_str).map(str::to_string)
        };

        let null = Value::Null;
        let language = content.get("language_info").unwrap_or(&null);

        let help_links = content
            .get("help_links")
            .and_then(|links| serde_json::from_value::<Vec<HelpLink>>(links.clone()).ok())
            .unwrap_or_default();

        KernelInfo {
            protocol_version: text(content, "protocol_version"),
            implementation: text(content, "implementation"),
            implementation_version: text(content, "implementation_version"),
            banner: text(content, "banner"),
            help_links,
            language_name: text(language, "name"),
            language_version: text(language, "version"),
            mimetype: optional(language, "mimetype"),
            file_extension: optional(language, "file_extension"),
            pygments_lexer: optional(language, "pygments_lexer"),
            codemirror_mode: language
                .get("codemirror_mode")
                .filter(|mode| !mode.is_null())
                .cloned(),
            nbconvert_exporter: optional(language, "nbconvert_exporter"),
        }
    }
}

/// What a launcher hands back for a freshly started kernel.
#[derive(Debug, Clone)]
pub struct LaunchedKernel {
    pub channel: KernelChannel,
    pub kernel_spec_name: String,
    pub cwd: String,
}

/// Runtime record for one live kernel, owned by the kernel registry.
#[derive(Debug, Clone)]
pub struct KernelRecord {
    pub kernel_ref: KernelRef,
    pub channel: KernelChannel,
    pub kernel_spec_name: String,
    pub cwd: String,
    pub status: KernelStatus,
    pub info: Option<KernelInfo>,
}

impl KernelRecord {
    pub fn new(kernel_ref: KernelRef, kernel: LaunchedKernel) -> Self {
        Self {
            kernel_ref,
            channel: kernel.channel,
            kernel_spec_name: kernel.kernel_spec_name,
            cwd: kernel.cwd,
            status: KernelStatus::Starting,
            info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_from_execution_state() {
        assert_eq!(KernelStatus::from_execution_state("busy"), KernelStatus::Busy);
        assert_eq!(KernelStatus::from_execution_state("idle"), KernelStatus::Idle);
        assert_eq!(
            KernelStatus::from_execution_state("terminating"),
            KernelStatus::Dead
        );
        assert_eq!(
            KernelStatus::from_execution_state("something-new"),
            KernelStatus::Unknown
        );
    }

    #[test]
    fn test_status_display_matches_serde() {
        for status in [
            KernelStatus::Unknown,
            KernelStatus::Starting,
            KernelStatus::Idle,
            KernelStatus::Busy,
            KernelStatus::Restarting,
            KernelStatus::Dead,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }

    #[test]
    fn test_kernel_info_from_full_reply() {
        let content = json!({
            "status": "ok",
            "protocol_version": "5.3",
            "implementation": "ipython",
            "implementation_version": "8.20.0",
            "banner": "Python 3.11.5",
            "help_links": [{"text": "Python Reference", "url": "https://docs.python.org/3.11"}],
            "language_info": {
                "name": "python",
                "version": "3.11.5",
                "mimetype": "text/x-python",
                "file_extension": ".py",
                "pygments_lexer": "ipython3",
                "codemirror_mode": {"name": "ipython", "version": 3},
                "nbconvert_exporter": "python"
            }
        });

        let info = KernelInfo::from_reply_content(&content);
        assert_eq!(info.protocol_version, "5.3");
        assert_eq!(info.implementation, "ipython");
        assert_eq!(info.language_name, "python");
        assert_eq!(info.language_version, "3.11.5");
        assert_eq!(info.file_extension.as_deref(), Some(".py"));
        assert_eq!(info.pygments_lexer.as_deref(), Some("ipython3"));
        assert_eq!(info.codemirror_mode, Some(json!({"name": "ipython", "version": 3})));
        assert_eq!(info.help_links.len(), 1);
        assert_eq!(info.help_links[0].text, "Python Reference");
    }

    #[test]
    fn test_kernel_info_from_sparse_reply() {
        let content = json!({
            "implementation": "deno",
            "language_info": {"name": "typescript", "codemirror_mode": null}
        });

        let info = KernelInfo::from_reply_content(&content);
        assert_eq!(info.implementation, "deno");
        assert_eq!(info.language_name, "typescript");
        assert_eq!(info.language_version, "");
        assert!(info.codemirror_mode.is_none());
        assert!(info.mimetype.is_none());
        assert!(info.help_links.is_empty());
    }

    #[test]
    fn test_new_record_starts_without_info() {
        let (channel, _side) = KernelChannel::pair(4);
        let record = KernelRecord::new(
            KernelRef::new(),
            LaunchedKernel {
                channel,
                kernel_spec_name: "python3".into(),
                cwd: "/tmp".into(),
            },
        );
        assert_eq!(record.status, KernelStatus::Starting);
        assert!(record.info.is_none());
    }
}
