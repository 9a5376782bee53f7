use super::lexer::{Token, TokenKind};
use super::{CompareOp, ConditionError, Expr, Literal};
use regex::RegexBuilder;

const MAX_DEPTH: usize = 32;

pub(crate) struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            cursor: 0,
            depth: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Expr, ConditionError> {
        let expr = self.parse_or()?;
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            return Err(ConditionError::new(token.pos, "unexpected trailing input"));
        }
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        // The token list always ends with Eof.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::new(
                self.peek().pos,
                "expression nested too deeply",
            ));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut branches = vec![self.parse_and()?];
        while self.peek().kind == TokenKind::Or {
            self.advance();
            branches.push(self.parse_and()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Expr::Or(branches)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut branches = vec![self.parse_unary()?];
        while self.peek().kind == TokenKind::And {
            self.advance();
            branches.push(self.parse_unary()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Expr::And(branches)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek().kind == TokenKind::Not {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_operand()?;
        let op = match self.peek().kind {
            TokenKind::Compare(op) => op,
            _ => return Ok(left),
        };
        self.advance();

        if op == CompareOp::Matches {
            let token = self.advance();
            let TokenKind::Str(pattern) = token.kind else {
                return Err(ConditionError::new(
                    token.pos,
                    "'matches' requires a string literal pattern",
                ));
            };
            let regex = RegexBuilder::new(&pattern)
                .size_limit(1 << 20)
                .build()
                .map_err(|e| ConditionError::new(token.pos, format!("invalid regex: {e}")))?;
            return Ok(Expr::Matches {
                subject: Box::new(left),
                regex,
            });
        }

        let right = self.parse_operand()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, ConditionError> {
        let token = self.advance();
        let expr = match token.kind {
            TokenKind::Str(s) => Expr::Literal(Literal::Str(s)),
            TokenKind::Num(n) => Expr::Literal(Literal::Num(n)),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::Null => Expr::Literal(Literal::Null),
            TokenKind::Ident(name) => Expr::Field(normalize_field(&name)),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                let close = self.advance();
                if close.kind != TokenKind::RParen {
                    return Err(ConditionError::new(close.pos, "expected ')'"));
                }
                inner
            }
            TokenKind::Eof => {
                return Err(ConditionError::new(token.pos, "unexpected end of expression"))
            }
            other => {
                return Err(ConditionError::new(
                    token.pos,
                    format!("expected operand, found {other:?}"),
                ))
            }
        };
        Ok(expr)
    }
}

/// Strip an optional `request.` prefix so `request.query.x` and `query.x` agree.
fn normalize_field(name: &str) -> String {
    name.strip_prefix("request.").unwrap_or(name).to_string()
}
