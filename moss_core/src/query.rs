use crate::files::FileRef;
use crate::loc::Loc;
use crate::names::NameRef;
use crate::symbols::SymbolRef;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Inferred type of a Moss expression. The lattice is deliberately shallow:
/// literals carry their class, everything else is untyped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Type {
    Integer,
    Str,
    Nil,
    Untyped,
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Integer => "Integer",
            Type::Str => "String",
            Type::Nil => "NilClass",
            Type::Untyped => "untyped",
        };
        f.write_str(name)
    }
}

/// Restriction handed to the inferencer so an ad-hoc analysis run records
/// responses only for the nodes someone asked about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Query {
    /// Everything intersecting one byte offset of one file.
    ByLoc { file: FileRef, offset: u32 },
    /// Every use or definition of one symbol, workspace-wide.
    BySymbol(SymbolRef),
}

impl Query {
    pub fn matches_loc(&self, loc: Loc) -> bool {
        match self {
            Query::ByLoc { file, offset } => loc.file == *file && loc.contains(*offset),
            Query::BySymbol(_) => false,
        }
    }

    pub fn matches_symbol(&self, sym: SymbolRef) -> bool {
        matches!(self, Query::BySymbol(target) if *target == sym)
    }
}

/// One analyzer-produced datum attached to a source location, recorded during
/// a targeted run and consumed by the feature handlers.
#[derive(Clone, Debug)]
pub enum QueryResponse {
    /// A resolved identifier or constant read.
    Ident {
        loc: Loc,
        name: NameRef,
        symbol: Option<SymbolRef>,
        ty: Type,
    },
    /// A call expression. `active_arg` is the zero-based argument the query
    /// offset falls inside, when the query was positional.
    Send {
        loc: Loc,
        name: NameRef,
        symbol: Option<SymbolRef>,
        active_arg: usize,
        ty: Type,
    },
    /// A constant read.
    Const {
        loc: Loc,
        name: NameRef,
        symbol: Option<SymbolRef>,
        ty: Type,
    },
    /// A definition site (method or constant).
    Def {
        loc: Loc,
        name: NameRef,
        symbol: SymbolRef,
    },
}

impl QueryResponse {
    pub fn loc(&self) -> Loc {
        match self {
            QueryResponse::Ident { loc, .. } => *loc,
            QueryResponse::Send { loc, .. } => *loc,
            QueryResponse::Const { loc, .. } => *loc,
            QueryResponse::Def { loc, .. } => *loc,
        }
    }

    pub fn symbol(&self) -> Option<SymbolRef> {
        match self {
            QueryResponse::Ident { symbol, .. } => *symbol,
            QueryResponse::Send { symbol, .. } => *symbol,
            QueryResponse::Const { symbol, .. } => *symbol,
            QueryResponse::Def { symbol, .. } => Some(*symbol),
        }
    }

    pub fn name(&self) -> NameRef {
        match self {
            QueryResponse::Ident { name, .. } => *name,
            QueryResponse::Send { name, .. } => *name,
            QueryResponse::Const { name, .. } => *name,
            QueryResponse::Def { name, .. } => *name,
        }
    }
}
