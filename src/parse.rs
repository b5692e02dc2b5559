use std::fmt::Display;
use std::io::BufRead;

use miette::{Diagnostic, Error, IntoDiagnostic, NamedSource, SourceSpan, WrapErr};
use thiserror::Error;
use tracing::debug;

use crate::{
    Lexer,
    lex::{Symbol, Token, TokenKind},
};

#[derive(Error, Debug, Diagnostic)]
#[error("invalid token sequence")]
pub struct SyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    bad_bit: SourceSpan,

    #[help]
    help: Option<String>,
}

impl SyntaxError {
    pub fn build(lexer: &Lexer<'_>, token: &Token<'_>, help: impl Into<String>) -> Self {
        SyntaxError {
            src: lexer.source(),
            bad_bit: token.span(),
            help: Some(help.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Binary {
        op: Operator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    fn additive(symbol: Symbol) -> Option<Operator> {
        match symbol {
            Symbol::Plus => Some(Operator::Add),
            Symbol::Minus => Some(Operator::Subtract),
            _ => None,
        }
    }

    fn multiplicative(symbol: Symbol) -> Option<Operator> {
        match symbol {
            Symbol::Asterisk => Some(Operator::Multiply),
            Symbol::Slash => Some(Operator::Divide),
            _ => None,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Subtract => write!(f, "-"),
            Operator::Multiply => write!(f, "*"),
            Operator::Divide => write!(f, "/"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({op} {lhs} {rhs})"),
        }
    }
}

/// Recursive-descent parser over the tokens of a single line.
///
/// ```text
/// expression := term ( ('+' | '-') term )*
/// term       := factor ( ('*' | '/') factor )*
/// factor     := number | '(' expression ')'
/// ```
///
/// Parentheses may nest at most [`MAX_NESTING`] deep and a line may hold at
/// most [`MAX_OPERATORS`] operators, which bounds both the parser's recursion
/// and the height of the tree it returns.
pub struct Parser<'de> {
    lexer: Lexer<'de>,
    depth: usize,
    operators: usize,
}

pub const MAX_NESTING: usize = 256;
pub const MAX_OPERATORS: usize = 1024;

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, line: &'de str) -> Self {
        Parser {
            lexer: Lexer::new(filename, line),
            depth: 0,
            operators: 0,
        }
    }

    /// Parse the whole line. `None` means the line holds no tokens at all.
    pub fn parse_line(mut self) -> Result<Option<Expr>, Error> {
        if self.lexer.peek()?.kind == TokenKind::EndOfLine {
            return Ok(None);
        }

        let expr = self.parse_expression()?;

        let token = self.lexer.peek()?;
        if token.kind != TokenKind::EndOfLine {
            return Err(SyntaxError::build(&self.lexer, &token, "this `)` has no matching `(`").into());
        }

        debug!(%expr, "parsed line");
        Ok(Some(expr))
    }

    fn parse_expression(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_term()?;
        while let Some(op) = self.next_operator(Operator::additive)? {
            let rhs = self.parse_term()?;
            expr = Expr::binary(op, expr, rhs);
        }

        let token = self.lexer.peek()?;
        match token.kind {
            TokenKind::EndOfLine | TokenKind::Symbol(Symbol::RightParenthesis) => Ok(expr),
            _ => Err(SyntaxError::build(
                &self.lexer,
                &token,
                "expected an operator or the end of the expression",
            )
            .into()),
        }
    }

    fn parse_term(&mut self) -> Result<Expr, Error> {
        let mut term = self.parse_factor()?;
        while let Some(op) = self.next_operator(Operator::multiplicative)? {
            let rhs = self.parse_factor()?;
            term = Expr::binary(op, term, rhs);
        }
        Ok(term)
    }

    fn parse_factor(&mut self) -> Result<Expr, Error> {
        let token = self.lexer.peek()?;
        match token.kind {
            TokenKind::Number(n) => {
                self.lexer.advance()?;
                Ok(Expr::Number(n))
            }
            TokenKind::Symbol(Symbol::LeftParenthesis) => {
                if self.depth == MAX_NESTING {
                    return Err(SyntaxError::build(
                        &self.lexer,
                        &token,
                        format!("expression nested too deeply (limit is {MAX_NESTING})"),
                    )
                    .into());
                }
                self.lexer.advance()?;
                self.depth += 1;
                let expr = self.parse_expression()?;
                self.lexer.expect(Symbol::RightParenthesis)?;
                self.depth -= 1;
                Ok(expr)
            }
            _ => Err(SyntaxError::build(&self.lexer, &token, "expected a number or `(`").into()),
        }
    }

    fn next_operator(
        &mut self,
        operator_for: fn(Symbol) -> Option<Operator>,
    ) -> Result<Option<Operator>, Error> {
        let Some(token) = self.lexer.next_if(
            |kind| matches!(kind, TokenKind::Symbol(symbol) if operator_for(*symbol).is_some()),
        )?
        else {
            return Ok(None);
        };
        let TokenKind::Symbol(symbol) = token.kind else {
            return Ok(None);
        };

        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(SyntaxError::build(
                &self.lexer,
                &token,
                format!("too many operators on one line (limit is {MAX_OPERATORS})"),
            )
            .into());
        }
        Ok(operator_for(symbol))
    }
}

/// Read one line from `source`, including its `'\n'`.
///
/// The whole line is consumed before any lexing happens, so a failure later
/// in the pipeline always leaves `source` at the start of the next line.
/// Invalid UTF-8 is replaced with U+FFFD and rejected by the lexer.
pub fn read_line<R: BufRead>(source: &mut R) -> Result<String, Error> {
    let mut buf = Vec::new();
    source
        .read_until(b'\n', &mut buf)
        .into_diagnostic()
        .wrap_err("reading input line failed")?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read and parse the next line of `source`.
///
/// Returns `None` for an empty line or an exhausted source.
pub fn parse_line<R: BufRead>(source: &mut R) -> Result<Option<Expr>, Error> {
    let line = read_line(source)?;
    Parser::new(None, &line).parse_line()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::lex::LexError;

    fn parse(line: &str) -> Result<Option<Expr>, Error> {
        Parser::new(None, line).parse_line()
    }

    fn tree(line: &str) -> String {
        parse(line).unwrap().unwrap().to_string()
    }

    fn is_syntax_error(line: &str) -> bool {
        parse(line)
            .err()
            .is_some_and(|e| e.downcast_ref::<SyntaxError>().is_some())
    }

    #[test]
    fn precedence() {
        assert_eq!(tree("2+3*4"), "(+ 2 (* 3 4))");
        assert_eq!(tree("(2+3)*4"), "(* (+ 2 3) 4)");
        assert_eq!(tree("1*2+3/4"), "(+ (* 1 2) (/ 3 4))");
    }

    #[test]
    fn left_associative() {
        assert_eq!(tree("8-3-2"), "(- (- 8 3) 2)");
        assert_eq!(tree("8/4/2"), "(/ (/ 8 4) 2)");
        assert_eq!(tree("1+2-3+4"), "(+ (- (+ 1 2) 3) 4)");
    }

    #[test]
    fn builds_owned_tree() {
        assert_eq!(
            parse("1-(2*3)").unwrap(),
            Some(Expr::binary(
                Operator::Subtract,
                Expr::Number(1),
                Expr::binary(Operator::Multiply, Expr::Number(2), Expr::Number(3)),
            ))
        );
    }

    #[test]
    fn nested_parentheses() {
        assert_eq!(tree("((((7))))"), "7");
        assert_eq!(tree(" ( 1 + ( 2 * ( 3 - 4 ) ) ) \n"), "(+ 1 (* 2 (- 3 4)))");
    }

    #[test]
    fn empty_line_is_none() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("\n").unwrap(), None);
        assert_eq!(parse("  \r\n").unwrap(), None);
    }

    #[test]
    fn grammar_violations() {
        assert!(is_syntax_error("(1+2"));
        assert!(is_syntax_error("1+2)"));
        assert!(is_syntax_error("1+"));
        assert!(is_syntax_error("*2"));
        assert!(is_syntax_error("()"));
        assert!(is_syntax_error("1 2"));
        assert!(is_syntax_error("(1)(2)"));
        assert!(is_syntax_error("2*(3"));
    }

    #[test]
    fn no_unary_minus() {
        assert!(is_syntax_error("-1"));
        assert!(is_syntax_error("2*-3"));
    }

    #[test]
    fn lex_errors_pass_through() {
        let error = parse("1+2@3").unwrap_err();
        assert_eq!(error.downcast_ref::<LexError>().unwrap().token, '@');
    }

    #[test]
    fn grammar_error_wins_over_later_bad_character() {
        assert!(is_syntax_error("1 2 @"));
    }

    #[test]
    fn nesting_limit() {
        let at_limit = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(parse(&at_limit).unwrap(), Some(Expr::Number(1)));

        let past_limit = format!("{}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(is_syntax_error(&past_limit));

        let far_past_limit = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(is_syntax_error(&far_past_limit));
    }

    #[test]
    fn sibling_groups_do_not_accumulate_depth() {
        let group = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        let line = [group.as_str(); 3].join("+");
        assert_eq!(tree(&line), "(+ (+ 1 1) 1)");
    }

    #[test]
    fn operator_limit() {
        let at_limit = format!("1{}", "+1".repeat(MAX_OPERATORS));
        assert!(parse(&at_limit).is_ok());

        let past_limit = format!("1{}", "-1".repeat(MAX_OPERATORS + 1));
        assert!(is_syntax_error(&past_limit));

        let nested = format!("{}1{}", "(1+".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse(&nested).is_ok());
    }

    #[test]
    fn syntax_error_message() {
        assert_eq!(parse("(1+2").unwrap_err().to_string(), "invalid token sequence");
    }

    #[test]
    fn parse_line_reads_one_line_at_a_time() {
        let mut source = Cursor::new("1+2\n(3\n4*5\n\n6\n");
        assert_eq!(parse_line(&mut source).unwrap().unwrap().to_string(), "(+ 1 2)");
        assert!(parse_line(&mut source).is_err());
        assert_eq!(parse_line(&mut source).unwrap().unwrap().to_string(), "(* 4 5)");
        assert_eq!(parse_line(&mut source).unwrap(), None);
        assert_eq!(parse_line(&mut source).unwrap(), Some(Expr::Number(6)));
        assert_eq!(parse_line(&mut source).unwrap(), None);
    }

    #[test]
    fn invalid_utf8_is_a_lex_error() {
        let mut source = Cursor::new(b"1+\xff\n2\n".to_vec());
        let error = parse_line(&mut source).unwrap_err();
        assert_eq!(
            error.downcast_ref::<LexError>().unwrap().token,
            char::REPLACEMENT_CHARACTER
        );
        assert_eq!(parse_line(&mut source).unwrap(), Some(Expr::Number(2)));
    }
}
