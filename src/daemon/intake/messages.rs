use serde::{Deserialize, Serialize};

pub type TabId = i64;
pub type WindowId = i64;

/// The status browsers report once a navigation has finished loading.
pub const COMPLETE_STATUS: &str = "complete";
/// Window id Chromium reports when focus left the browser.
pub const WINDOW_ID_NONE: WindowId = -1;

/// Tab as reported by the extension. The url is missing for tabs that haven't started loading
/// yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub tab_id: TabId,
    #[serde(default)]
    pub url: Option<String>,
}

/// A message the extension forwards from the browser's tab and window events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrowserMessage {
    /// The user switched to another tab.
    TabActivated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    /// A tab changed. Browsers fire this several times per navigation.
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        active: bool,
    },
    /// Focus moved to another window. `window_id` is empty or [WINDOW_ID_NONE] when focus left
    /// the browser altogether, in which case there is no active tab either.
    WindowFocusChanged {
        #[serde(default)]
        window_id: Option<WindowId>,
        #[serde(default)]
        active_tab: Option<TabSnapshot>,
    },
}

/// Question about the host itself. The intake answers these on its own, the tracker never sees
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HostCommand {
    GetBackendUrl,
    GetUsername,
}

/// Anything the extension may send over the pipe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Browser(BrowserMessage),
    Command(HostCommand),
}

/// Acknowledgement written back for every frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HostReply {
    Ok(ReplyData),
    Error { message: String },
}

impl HostReply {
    pub fn ok() -> Self {
        Self::Ok(ReplyData::default())
    }
}

/// Answers to [HostCommand]s. Plain acknowledgements leave everything empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplyData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}
