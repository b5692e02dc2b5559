pub mod eval;
pub mod lex;
pub mod parse;
pub mod session;

pub use eval::DivisionByZero;
pub use lex::{LexError, Lexer, NumberLiteralError};
pub use parse::{
    Expr, MAX_NESTING, MAX_OPERATORS, Operator, Parser, SyntaxError, parse_line, read_line,
};
pub use session::{Session, eval_line};
