//! Exemplar lexer.
//!
//! Two layers live here. [`scan`] is the character-level state machine the
//! rewrite passes share to stay out of strings, comments, templates and
//! pattern literals; [`balance`] and [`splice`] build delimiter matching and
//! offset-based editing on top of it. [`lexer`] turns source text into the
//! token stream the parser consumes.

pub mod balance;
pub mod lexer;
pub mod scan;
pub mod splice;
pub mod token;

pub use balance::BalanceError;
pub use lexer::{lex, LexResult, Lexer};
pub use scan::{CodeMask, ScanState, Scanned, Scanner};
pub use splice::Splicer;
pub use token::{Token, TokenKind, ALL_KEYWORDS};
