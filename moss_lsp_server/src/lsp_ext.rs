//! Vendor extensions: the file-watcher integration and the show-operation
//! status notifications. These ride the normal protocol stream but are only
//! understood by editors shipping our client plugin.

use lsp_types::notification::Notification;
use serde::{Deserialize, Serialize};

/// Filesystem change batch forwarded by the external watcher. Paths are
/// relative to the workspace root.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct WatchmanQueryResponse {
    pub files: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Start,
    End,
}

/// Announces a long-running task to the client's status line. Sent only when
/// the client opted in during `initialize`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowOperationParams {
    pub operation_name: String,
    pub description: String,
    pub status: OperationStatus,
}

pub enum ShowOperationNotification {}

impl Notification for ShowOperationNotification {
    type Params = ShowOperationParams;
    const METHOD: &'static str = "moss/showOperation";
}

/// `initializationOptions` we understand on `initialize`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MossInitializationOptions {
    #[serde(default)]
    pub supports_operation_notifications: bool,
}
