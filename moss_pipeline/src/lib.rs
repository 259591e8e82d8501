mod ast;
mod infer;
mod lexer;
mod parser;
mod resolve;

pub use ast::*;
pub use infer::*;
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse_file;
pub use resolve::{isolated_symbol_hash, resolve_files};
