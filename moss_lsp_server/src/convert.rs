//! Translation between internal locations and protocol shapes, and between
//! client URIs and local workspace paths.

use line_index::LineIndex;
use lsp_types::{Location, Position, Range, TextDocumentContentChangeEvent, Uri};
use moss_core::{
    line_column_to_offset, Diagnostic, File, GlobalState, LineColumn, Loc, Severity,
};
use serde::de::DeserializeOwned;
use std::str::FromStr;

pub(crate) fn from_json<T: DeserializeOwned>(
    what: &'static str,
    json: &serde_json::Value,
) -> anyhow::Result<T> {
    serde_json::from_value(json.clone())
        .map_err(|e| anyhow::format_err!("Failed to deserialize {what}: {e}; {json}"))
}

/// Strip the `rootUri` prefix and graft the local root path on. `None` when
/// the URI points outside the workspace.
pub(crate) fn remote_name_to_local(root_uri: &str, root_path: &str, uri: &str) -> Option<String> {
    let rest = uri.strip_prefix(root_uri)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        // `file:///ws2` is not inside `file:///ws`
        return None;
    }
    Some(format!("{root_path}{rest}"))
}

pub(crate) fn local_name_to_remote(root_uri: &str, root_path: &str, path: &str) -> String {
    match path.strip_prefix(root_path) {
        Some(rest) => format!("{root_uri}{rest}"),
        None => format!("file://{path}"),
    }
}

pub(crate) fn position_to_offset(file: &File, position: Position) -> u32 {
    file.offset(LineColumn {
        line: position.line,
        column: position.character,
    })
}

pub(crate) fn loc_to_range(file: &File, loc: Loc) -> Range {
    let start = file.line_column(loc.start);
    let end = file.line_column(loc.end);
    Range {
        start: Position {
            line: start.line,
            character: start.column,
        },
        end: Position {
            line: end.line,
            character: end.column,
        },
    }
}

pub(crate) fn loc_to_location(
    gs: &GlobalState,
    root_uri: &str,
    root_path: &str,
    loc: Loc,
) -> Option<Location> {
    let file = gs.file(loc.file);
    let uri = local_name_to_remote(root_uri, root_path, file.path());
    let uri = Uri::from_str(&uri).ok()?;
    Some(Location {
        uri,
        range: loc_to_range(file, loc),
    })
}

fn severity_to_lsp(severity: Severity) -> lsp_types::DiagnosticSeverity {
    match severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Information => lsp_types::DiagnosticSeverity::INFORMATION,
    }
}

pub(crate) fn diagnostic_to_lsp(gs: &GlobalState, diagnostic: &Diagnostic) -> lsp_types::Diagnostic {
    let file = gs.file(diagnostic.loc.file);
    lsp_types::Diagnostic {
        range: loc_to_range(file, diagnostic.loc),
        severity: Some(severity_to_lsp(diagnostic.severity)),
        source: Some("moss".to_owned()),
        message: diagnostic.message.clone(),
        ..lsp_types::Diagnostic::default()
    }
}

/// Apply one LSP content change to `text`. Range-based changes splice
/// `[start, end)` computed against the *current* text; a change without a
/// range replaces the whole document.
pub(crate) fn apply_content_change(text: &str, change: &TextDocumentContentChangeEvent) -> String {
    let range = match change.range {
        Some(range) => range,
        None => return change.text.clone(),
    };

    let lines = LineIndex::new(text);
    let start = line_column_to_offset(
        text,
        &lines,
        LineColumn {
            line: range.start.line,
            column: range.start.character,
        },
    ) as usize;
    let end = line_column_to_offset(
        text,
        &lines,
        LineColumn {
            line: range.end.line,
            column: range.end.character,
        },
    ) as usize;
    let end = end.max(start);

    let mut out = String::with_capacity(text.len() - (end - start) + change.text.len());
    out.push_str(&text[..start]);
    out.push_str(&change.text);
    out.push_str(&text[end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uri_translation_is_prefix_based() {
        assert_eq!(
            remote_name_to_local("file:///w", "/w", "file:///w/a.moss"),
            Some("/w/a.moss".to_string())
        );
        assert_eq!(
            remote_name_to_local("file:///w", "/w", "file:///elsewhere/x.moss"),
            None
        );
        assert_eq!(
            remote_name_to_local("file:///w", "/w", "file:///w2/x.moss"),
            None
        );
        assert_eq!(
            local_name_to_remote("file:///w", "/w", "/w/a.moss"),
            "file:///w/a.moss"
        );
    }

    #[test]
    fn range_edit_replaces_the_span() {
        let change = TextDocumentContentChangeEvent {
            range: Some(Range {
                start: Position {
                    line: 0,
                    character: 4,
                },
                end: Position {
                    line: 0,
                    character: 5,
                },
            }),
            range_length: None,
            text: "2".to_string(),
        };
        assert_eq!(apply_content_change("x = 1\n", &change), "x = 2\n");
    }

    #[test]
    fn insertion_at_end_of_document() {
        let change = TextDocumentContentChangeEvent {
            range: Some(Range {
                start: Position {
                    line: 0,
                    character: 5,
                },
                end: Position {
                    line: 0,
                    character: 5,
                },
            }),
            range_length: None,
            text: "\nbad_call()".to_string(),
        };
        assert_eq!(
            apply_content_change("x = 1", &change),
            "x = 1\nbad_call()"
        );
    }

    #[test]
    fn full_replace_ignores_prior_content() {
        let change = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "fresh\n".to_string(),
        };
        assert_eq!(apply_content_change("old text\n", &change), "fresh\n");
    }
}
