use crate::files::FileRef;
use crate::loc::Loc;
use crate::names::NameRef;
use rustc_hash::FxHashMap;

/// Stable handle into a state's symbol table. Handles are only meaningful
/// within the state (or clone) that produced them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SymbolRef(pub(crate) u32);

impl SymbolRef {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SymbolKind {
    /// A top-level `def`, with its parameter names in declaration order.
    Method { params: Vec<NameRef> },
    /// A top-level uppercase constant binding.
    Constant,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: NameRef,
    pub kind: SymbolKind,
    pub file: FileRef,
    pub def_loc: Loc,
}

impl Symbol {
    pub fn arity(&self) -> Option<usize> {
        match &self.kind {
            SymbolKind::Method { params } => Some(params.len()),
            SymbolKind::Constant => None,
        }
    }
}

/// Top-level symbol storage. Slots are tombstoned rather than reused so
/// handles held by in-flight query responses stay valid for the life of the
/// state.
#[derive(Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Option<Symbol>>,
    by_name: FxHashMap<NameRef, SymbolRef>,
}

impl SymbolTable {
    pub fn enter(&mut self, symbol: Symbol) -> SymbolRef {
        let sym = SymbolRef(self.symbols.len() as u32);
        self.by_name.insert(symbol.name, sym);
        self.symbols.push(Some(symbol));
        sym
    }

    pub fn lookup(&self, name: NameRef) -> Option<SymbolRef> {
        self.by_name.get(&name).copied()
    }

    pub fn get(&self, sym: SymbolRef) -> Option<&Symbol> {
        self.symbols.get(sym.0 as usize).and_then(Option::as_ref)
    }

    /// Tombstone every definition owned by `file`, unhooking its name
    /// bindings. Used before re-resolving a replaced file.
    pub fn remove_file_defs(&mut self, file: FileRef) {
        for (idx, slot) in self.symbols.iter_mut().enumerate() {
            let owned = matches!(slot, Some(sym) if sym.file == file);
            if owned {
                let sym = slot.take().unwrap();
                if self.by_name.get(&sym.name) == Some(&SymbolRef(idx as u32)) {
                    self.by_name.remove(&sym.name);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.by_name.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolRef, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|sym| (SymbolRef(idx as u32), sym)))
    }

    pub fn len(&self) -> usize {
        self.symbols.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn method(name: NameRef, file: FileRef) -> Symbol {
        Symbol {
            name,
            kind: SymbolKind::Method { params: vec![] },
            file,
            def_loc: Loc::new(file, 0, 0),
        }
    }

    #[test]
    fn remove_file_defs_unhooks_names() {
        let mut table = SymbolTable::default();
        let name_a = NameRef(0);
        let name_b = NameRef(1);
        let file_one = FileRef(0);
        let file_two = FileRef(1);

        let a = table.enter(method(name_a, file_one));
        table.enter(method(name_b, file_two));

        table.remove_file_defs(file_one);
        assert_eq!(table.lookup(name_a), None);
        assert!(table.lookup(name_b).is_some());
        assert!(table.get(a).is_none());
        assert_eq!(table.len(), 1);
    }
}
