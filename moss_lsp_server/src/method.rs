/// Who opens a given exchange.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Initiator {
    Client,
    Server,
    Both,
}

/// Every protocol method the server knows about, including the vendor
/// extensions. Unknown wire names stay outside this enum and are answered
/// `MethodNotFound` when a reply is expected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum LspMethod {
    Initialize,
    Initialized,
    Shutdown,
    Exit,
    CancelRequest,
    RegisterCapability,
    UnregisterCapability,
    DidChangeWatchedFiles,
    PublishDiagnostics,
    DidOpen,
    DidChange,
    DidClose,
    DocumentSymbol,
    Definition,
    Hover,
    Completion,
    References,
    SignatureHelp,
    WorkspaceSymbol,
    ShowMessage,
    Pause,
    Resume,
    WatchmanFileChange,
    WatchmanExit,
    ShowOperation,
}

struct MethodTag {
    method: LspMethod,
    name: &'static str,
    is_notification: bool,
    initiator: Initiator,
    supported: bool,
}

const METHODS: &[MethodTag] = &[
    MethodTag {
        method: LspMethod::Initialize,
        name: "initialize",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Initialized,
        name: "initialized",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Shutdown,
        name: "shutdown",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Exit,
        name: "exit",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::CancelRequest,
        name: "$/cancelRequest",
        is_notification: true,
        initiator: Initiator::Both,
        supported: true,
    },
    MethodTag {
        method: LspMethod::RegisterCapability,
        name: "client/registerCapability",
        is_notification: false,
        initiator: Initiator::Server,
        supported: true,
    },
    MethodTag {
        method: LspMethod::UnregisterCapability,
        name: "client/unregisterCapability",
        is_notification: false,
        initiator: Initiator::Server,
        supported: true,
    },
    MethodTag {
        method: LspMethod::DidChangeWatchedFiles,
        name: "workspace/didChangeWatchedFiles",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::PublishDiagnostics,
        name: "textDocument/publishDiagnostics",
        is_notification: true,
        initiator: Initiator::Server,
        supported: true,
    },
    MethodTag {
        method: LspMethod::DidOpen,
        name: "textDocument/didOpen",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::DidChange,
        name: "textDocument/didChange",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::DidClose,
        name: "textDocument/didClose",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::DocumentSymbol,
        name: "textDocument/documentSymbol",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Definition,
        name: "textDocument/definition",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Hover,
        name: "textDocument/hover",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Completion,
        name: "textDocument/completion",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::References,
        name: "textDocument/references",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::SignatureHelp,
        name: "textDocument/signatureHelp",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::WorkspaceSymbol,
        name: "workspace/symbol",
        is_notification: false,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::ShowMessage,
        name: "window/showMessage",
        is_notification: true,
        initiator: Initiator::Server,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Pause,
        name: "__PAUSE__",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::Resume,
        name: "__RESUME__",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::WatchmanFileChange,
        name: "moss/watchmanFileChange",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::WatchmanExit,
        name: "moss/watchmanExit",
        is_notification: true,
        initiator: Initiator::Client,
        supported: true,
    },
    MethodTag {
        method: LspMethod::ShowOperation,
        name: "moss/showOperation",
        is_notification: true,
        initiator: Initiator::Server,
        supported: true,
    },
];

impl LspMethod {
    pub(crate) fn from_name(name: &str) -> Option<LspMethod> {
        METHODS
            .iter()
            .find(|tag| tag.name == name)
            .map(|tag| tag.method)
    }

    fn tag(&self) -> &'static MethodTag {
        METHODS
            .iter()
            .find(|tag| tag.method == *self)
            .expect("every method variant has a registry entry")
    }

    pub(crate) fn name(&self) -> &'static str {
        self.tag().name
    }

    pub(crate) fn is_notification(&self) -> bool {
        self.tag().is_notification
    }

    pub(crate) fn initiator(&self) -> Initiator {
        self.tag().initiator
    }

    pub(crate) fn is_supported(&self) -> bool {
        self.tag().supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_variant_round_trips_through_its_name() {
        for tag in METHODS {
            assert_eq!(LspMethod::from_name(tag.name), Some(tag.method));
            assert_eq!(tag.method.name(), tag.name);
        }
    }

    #[test]
    fn requests_and_notifications_are_classified() {
        assert!(!LspMethod::Initialize.is_notification());
        assert!(LspMethod::Exit.is_notification());
        assert_eq!(LspMethod::CancelRequest.initiator(), Initiator::Both);
        assert_eq!(LspMethod::ShowOperation.initiator(), Initiator::Server);
        assert_eq!(LspMethod::from_name("textDocument/rename"), None);
    }
}
