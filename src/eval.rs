use miette::{Diagnostic, Error};
use thiserror::Error;

use crate::parse::{Expr, Operator};

#[derive(Error, Debug, Diagnostic, Clone, Copy, PartialEq, Eq)]
#[error("division by zero")]
#[diagnostic(help("`{dividend} / 0` has no integer result"))]
pub struct DivisionByZero {
    pub dividend: i64,
}

impl Expr {
    /// Fold the tree to a single integer.
    ///
    /// Overflow wraps around like unchecked machine arithmetic; only a zero
    /// divisor is an error.
    pub fn evaluate(&self) -> Result<i64, Error> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate()?;
                let rhs = rhs.evaluate()?;
                Ok(op.apply(lhs, rhs)?)
            }
        }
    }
}

impl Operator {
    pub fn apply(self, lhs: i64, rhs: i64) -> Result<i64, DivisionByZero> {
        Ok(match self {
            Operator::Add => lhs.wrapping_add(rhs),
            Operator::Subtract => lhs.wrapping_sub(rhs),
            Operator::Multiply => lhs.wrapping_mul(rhs),
            Operator::Divide => {
                if rhs == 0 {
                    return Err(DivisionByZero { dividend: lhs });
                }
                // truncates toward zero
                lhs.wrapping_div(rhs)
            }
        })
    }
}
