use rustc_hash::FxHashMap;

/// Stable handle into the name table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NameRef(pub(crate) u32);

impl NameRef {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Append-only interning table. Entries are never renamed or removed, so a
/// `NameRef` taken from any state remains valid in every later state and in
/// every clone derived from it.
#[derive(Clone, Default)]
pub struct NameTable {
    strings: Vec<String>,
    by_string: FxHashMap<String, NameRef>,
}

impl NameTable {
    pub fn intern(&mut self, s: &str) -> NameRef {
        if let Some(existing) = self.by_string.get(s) {
            return *existing;
        }

        let name = NameRef(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.by_string.insert(s.to_string(), name);
        name
    }

    pub fn lookup(&self, s: &str) -> Option<NameRef> {
        self.by_string.get(s).copied()
    }

    pub fn resolve(&self, name: NameRef) -> &str {
        &self.strings[name.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn intern_is_idempotent() {
        let mut names = NameTable::default();
        let a = names.intern("greet");
        let b = names.intern("farewell");
        let c = names.intern("greet");

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(names.resolve(a), "greet");
        assert_eq!(names.resolve(b), "farewell");
    }

    #[test]
    fn refs_survive_later_interning() {
        let mut names = NameTable::default();
        let first = names.intern("x");
        for i in 0..100 {
            names.intern(&format!("sym{i}"));
        }
        assert_eq!(names.resolve(first), "x");
        assert_eq!(names.lookup("x"), Some(first));
    }
}
