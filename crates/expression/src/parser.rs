use crate::ast::{BinaryOp, Builtin, Expr, MemberKey, UnaryOp};
use crate::error::ExpressionError;
use crate::lexer::{Lexer, Token};

/// Guards against pathological input (e.g. thousands of nested parens)
/// blowing the call stack during recursive-descent parsing or tree-walk
/// evaluation. There is no legitimate workflow condition anywhere near
/// this deep.
pub const MAX_RECURSION_DEPTH: usize = 64;

pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let expr = parser.parse_ternary()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(ExpressionError::UnexpectedToken(format!("{other:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        if self.peek() == expected {
            self.pos += 1;
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken(format!("{:?}", self.peek())))
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            return Err(ExpressionError::RecursionLimitExceeded);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let cond = self.parse_or()?;
        let result = if *self.peek() == Token::Question {
            self.pos += 1;
            let then_branch = self.parse_ternary()?;
            self.expect(&Token::Colon)?;
            let else_branch = self.parse_ternary()?;
            Expr::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            }
        } else {
            cond
        };
        self.leave();
        Ok(result)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::OrOr {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_equality()?;
        while *self.peek() == Token::AndAnd {
            self.pos += 1;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEqEq => BinaryOp::StrictEq,
                Token::NotEqEq => BinaryOp::StrictNotEq,
                Token::EqEq => BinaryOp::LooseEq,
                Token::NotEq => BinaryOp::LooseNotEq,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let result = match self.peek().clone() {
            Token::Bang => {
                self.pos += 1;
                let expr = self.parse_unary()?;
                Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(expr) })
            }
            Token::Minus => {
                self.pos += 1;
                let expr = self.parse_unary()?;
                Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(expr) })
            }
            Token::Ident(name) if name == "typeof" => {
                self.pos += 1;
                let expr = self.parse_unary()?;
                Ok(Expr::Unary { op: UnaryOp::Typeof, expr: Box::new(expr) })
            }
            _ => self.parse_postfix(),
        };
        self.leave();
        result
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().clone() {
                Token::Dot => {
                    self.pos += 1;
                    let name = match self.bump() {
                        Token::Ident(n) => n,
                        other => return Err(ExpressionError::UnexpectedToken(format!("{other:?}"))),
                    };
                    if *self.peek() == Token::LParen {
                        self.pos += 1;
                        let args = self.parse_args()?;
                        expr = Expr::MethodCall { object: Box::new(expr), method: name, args };
                    } else {
                        expr = Expr::Member { object: Box::new(expr), key: MemberKey::Name(name) };
                    }
                }
                Token::LBracket => {
                    self.pos += 1;
                    let index = self.parse_ternary()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Member { object: Box::new(expr), key: MemberKey::Index(Box::new(index)) };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_ternary()?);
            match self.peek() {
                Token::Comma => {
                    self.pos += 1;
                }
                Token::RParen => {
                    self.pos += 1;
                    break;
                }
                other => return Err(ExpressionError::UnexpectedToken(format!("{other:?}"))),
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.bump() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::String(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::Dollar(name) => Ok(Expr::Binding(name)),
            Token::LParen => {
                let expr = self.parse_ternary()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::Ident(name) if name == "Array" => {
                self.expect(&Token::Dot)?;
                match self.bump() {
                    Token::Ident(method) if method == "isArray" => {
                        self.expect(&Token::LParen)?;
                        let args = self.parse_args()?;
                        Ok(Expr::BuiltinCall { builtin: Builtin::ArrayIsArray, args })
                    }
                    other => Err(ExpressionError::UnexpectedToken(format!("{other:?}"))),
                }
            }
            Token::Ident(name) if name == "JSON" => {
                self.expect(&Token::Dot)?;
                match self.bump() {
                    Token::Ident(method) if method == "parse" => {
                        self.expect(&Token::LParen)?;
                        let args = self.parse_args()?;
                        Ok(Expr::BuiltinCall { builtin: Builtin::JsonParse, args })
                    }
                    other => Err(ExpressionError::UnexpectedToken(format!("{other:?}"))),
                }
            }
            Token::Ident(name) => Err(ExpressionError::UnknownFunction(name)),
            other => Err(ExpressionError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}
