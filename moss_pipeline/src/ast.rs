use moss_core::{Diagnostic, FileRef, Loc};

/// The indexed form of one file: its items plus the parse diagnostics that
/// were produced while building them. Parsing is pure so trees can be built
/// on worker threads; the engine re-emits the stored diagnostics whenever the
/// file takes part in a run.
#[derive(Clone, Debug)]
pub struct ParsedFile {
    pub file: FileRef,
    pub items: Vec<Item>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Debug)]
pub enum Item {
    MethodDef(MethodDef),
    ConstDef(ConstDef),
    Stmt(Stmt),
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub name: String,
    pub name_loc: Loc,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub loc: Loc,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub loc: Loc,
}

#[derive(Clone, Debug)]
pub struct ConstDef {
    pub name: String,
    pub name_loc: Loc,
    pub value: Expr,
    pub loc: Loc,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Assign {
        target: String,
        target_loc: Loc,
        value: Expr,
        loc: Loc,
    },
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub enum Expr {
    IntLit {
        loc: Loc,
    },
    StrLit {
        loc: Loc,
    },
    NilLit {
        loc: Loc,
    },
    /// Lowercase name in expression position: a local, a parameter, or a
    /// zero-argument call.
    Ident {
        name: String,
        loc: Loc,
    },
    ConstRef {
        name: String,
        loc: Loc,
    },
    Call {
        name: String,
        name_loc: Loc,
        args: Vec<Expr>,
        loc: Loc,
    },
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::IntLit { loc }
            | Expr::StrLit { loc }
            | Expr::NilLit { loc }
            | Expr::Ident { loc, .. }
            | Expr::ConstRef { loc, .. }
            | Expr::Call { loc, .. } => *loc,
        }
    }
}
