use crate::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    String(String),
    Ident(String),
    True,
    False,
    Null,
    Dollar(String), // $output, $data, $status, $ctx
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Bang,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEqEq,
    NotEqEq,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Eof,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(b) = self.peek_byte() else {
                tokens.push(Token::Eof);
                break;
            };
            match b {
                b'0'..=b'9' => tokens.push(self.read_number()?),
                b'"' | b'\'' => tokens.push(self.read_string(b)?),
                b'$' => tokens.push(self.read_dollar_binding()?),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => tokens.push(self.read_ident()),
                b'.' => {
                    self.pos += 1;
                    tokens.push(Token::Dot);
                }
                b',' => {
                    self.pos += 1;
                    tokens.push(Token::Comma);
                }
                b'(' => {
                    self.pos += 1;
                    tokens.push(Token::LParen);
                }
                b')' => {
                    self.pos += 1;
                    tokens.push(Token::RParen);
                }
                b'[' => {
                    self.pos += 1;
                    tokens.push(Token::LBracket);
                }
                b']' => {
                    self.pos += 1;
                    tokens.push(Token::RBracket);
                }
                b'?' => {
                    self.pos += 1;
                    tokens.push(Token::Question);
                }
                b':' => {
                    self.pos += 1;
                    tokens.push(Token::Colon);
                }
                b'+' => {
                    self.pos += 1;
                    tokens.push(Token::Plus);
                }
                b'-' => {
                    self.pos += 1;
                    tokens.push(Token::Minus);
                }
                b'*' => {
                    self.pos += 1;
                    tokens.push(Token::Star);
                }
                b'/' => {
                    self.pos += 1;
                    tokens.push(Token::Slash);
                }
                b'%' => {
                    self.pos += 1;
                    tokens.push(Token::Percent);
                }
                b'!' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        if self.peek_byte() == Some(b'=') {
                            self.pos += 1;
                            tokens.push(Token::NotEqEq);
                        } else {
                            tokens.push(Token::NotEq);
                        }
                    } else {
                        tokens.push(Token::Bang);
                    }
                }
                b'=' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        if self.peek_byte() == Some(b'=') {
                            self.pos += 1;
                            tokens.push(Token::EqEqEq);
                        } else {
                            tokens.push(Token::EqEq);
                        }
                    } else {
                        return Err(ExpressionError::UnexpectedCharacter {
                            ch: '=',
                            offset: self.pos - 1,
                        });
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        tokens.push(Token::Le);
                    } else {
                        tokens.push(Token::Lt);
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        tokens.push(Token::Ge);
                    } else {
                        tokens.push(Token::Gt);
                    }
                }
                b'&' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'&') {
                        self.pos += 1;
                        tokens.push(Token::AndAnd);
                    } else {
                        return Err(ExpressionError::UnexpectedCharacter {
                            ch: '&',
                            offset: self.pos - 1,
                        });
                    }
                }
                b'|' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'|') {
                        self.pos += 1;
                        tokens.push(Token::OrOr);
                    } else {
                        return Err(ExpressionError::UnexpectedCharacter {
                            ch: '|',
                            offset: self.pos - 1,
                        });
                    }
                }
                other => {
                    return Err(ExpressionError::UnexpectedCharacter {
                        ch: other as char,
                        offset: self.pos,
                    });
                }
            }
        }
        Ok(tokens)
    }

    fn read_number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_byte() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExpressionError::UnexpectedToken(text.to_string()))
    }

    fn read_string(&mut self, quote: u8) -> Result<Token, ExpressionError> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ExpressionError::UnterminatedExpression(start)),
                Some(b) if b == quote => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'\\') => out.push('\\'),
                    Some(b) if b == quote => out.push(quote as char),
                    Some(other) => out.push(other as char),
                    None => return Err(ExpressionError::UnterminatedExpression(start)),
                },
                Some(b) => out.push(b as char),
            }
        }
        Ok(Token::String(out))
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        match text {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(text.to_string()),
        }
    }

    fn read_dollar_binding(&mut self) -> Result<Token, ExpressionError> {
        let start = self.pos;
        self.pos += 1; // '$'
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        if self.pos == start + 1 {
            return Err(ExpressionError::UnexpectedCharacter {
                ch: '$',
                offset: start,
            });
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        Ok(Token::Dollar(text.to_string()))
    }
}
