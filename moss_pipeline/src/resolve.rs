use crate::ast::{Item, ParsedFile};
use moss_core::{Diagnostic, GlobalState, Symbol, SymbolKind};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Enter the top-level definitions of `files` into the state's symbol table.
///
/// Each file's previous definitions are removed first, so the same call
/// serves both the slow path (every file) and the fast path (the changed
/// subset). Duplicate definitions keep the first binding and diagnose the
/// later ones.
pub fn resolve_files(gs: &mut GlobalState, files: &[&ParsedFile]) {
    for parsed in files {
        gs.symbols.remove_file_defs(parsed.file);
    }

    for parsed in files {
        for item in &parsed.items {
            let (name_str, name_loc, kind) = match item {
                Item::MethodDef(def) => {
                    let params = def
                        .params
                        .iter()
                        .map(|p| gs.names.intern(&p.name))
                        .collect();
                    (&def.name, def.name_loc, SymbolKind::Method { params })
                }
                Item::ConstDef(def) => (&def.name, def.name_loc, SymbolKind::Constant),
                Item::Stmt(_) => continue,
            };

            let name = gs.names.intern(name_str);
            if gs.symbols.lookup(name).is_some() {
                gs.error_queue().push(Diagnostic::error(
                    name_loc,
                    format!("redefinition of `{name_str}`"),
                ));
                continue;
            }

            gs.symbols.enter(Symbol {
                name,
                kind,
                file: parsed.file,
                def_loc: name_loc,
            });
        }
    }
}

/// Digest of a file's exported symbol surface, computed by resolving the file
/// in isolation. Identical content always produces the same digest, and a
/// body-only edit leaves it unchanged; dependents therefore only need
/// re-analysis when this value moves.
pub fn isolated_symbol_hash(parsed: &ParsedFile) -> u32 {
    let mut surface: Vec<(u8, &str, usize)> = parsed
        .items
        .iter()
        .filter_map(|item| match item {
            Item::MethodDef(def) => Some((0u8, def.name.as_str(), def.params.len())),
            Item::ConstDef(def) => Some((1u8, def.name.as_str(), 0)),
            Item::Stmt(_) => None,
        })
        .collect();
    surface.sort_unstable();

    let mut hasher = FxHasher::default();
    for entry in &surface {
        entry.hash(&mut hasher);
    }
    let digest = hasher.finish();
    (digest as u32) ^ ((digest >> 32) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use pretty_assertions::assert_eq;

    fn parsed(gs: &mut GlobalState, path: &str, source: &str) -> ParsedFile {
        let file = gs.enter_file(path, source.to_string());
        parse_file(file, source)
    }

    fn hash_of(source: &str) -> u32 {
        let mut gs = GlobalState::new();
        let parsed = parsed(&mut gs, "/w/h.moss", source);
        isolated_symbol_hash(&parsed)
    }

    #[test]
    fn hash_is_stable_for_identical_content() {
        let src = "MAX = 10\ndef greet(name)\n  name\nend\n";
        assert_eq!(hash_of(src), hash_of(src));
    }

    #[test]
    fn body_edits_do_not_move_the_hash() {
        let before = "def greet(name)\n  x = 1\nend\n";
        let after = "def greet(name)\n  x = 2\n  y = x\nend\n";
        assert_eq!(hash_of(before), hash_of(after));
    }

    #[test]
    fn surface_edits_move_the_hash() {
        let base = "def greet(name)\nend\n";
        // Rename, arity change, and a new constant each perturb the surface.
        assert_ne!(hash_of(base), hash_of("def hello(name)\nend\n"));
        assert_ne!(hash_of(base), hash_of("def greet(name, prefix)\nend\n"));
        assert_ne!(hash_of(base), hash_of("def greet(name)\nend\nMAX = 1\n"));
    }

    #[test]
    fn duplicate_definitions_keep_first_and_diagnose() {
        let mut gs = GlobalState::new();
        let a = parsed(&mut gs, "/w/a.moss", "def greet(name)\nend\n");
        let b = parsed(&mut gs, "/w/b.moss", "def greet(other)\nend\n");
        resolve_files(&mut gs, &[&a, &b]);

        let drained = gs.error_queue().drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].message.contains("redefinition of `greet`"));

        let name = gs.names.lookup("greet").unwrap();
        let sym = gs.symbols.lookup(name).unwrap();
        assert_eq!(gs.symbols.get(sym).unwrap().file, a.file);
    }

    #[test]
    fn re_resolving_a_file_replaces_its_defs() {
        let mut gs = GlobalState::new();
        let first = parsed(&mut gs, "/w/a.moss", "def greet(name)\nend\n");
        resolve_files(&mut gs, &[&first]);

        let second = parsed(&mut gs, "/w/a.moss", "def hello(name)\nend\n");
        resolve_files(&mut gs, &[&second]);

        assert!(gs.names.lookup("greet").is_some());
        let greet = gs.names.lookup("greet").unwrap();
        assert_eq!(gs.symbols.lookup(greet), None);
        let hello = gs.names.lookup("hello").unwrap();
        assert!(gs.symbols.lookup(hello).is_some());
    }
}
