//! Tokenizer for Thrift IDL.

use crate::error::IdlError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// Identifier or keyword; may contain dots (`shared.Base`).
    Ident(String),
    Int(i64),
    Double(f64),
    Str(String),
    Punct(char),
    /// Text of a `/** ... */` comment.
    Doc(String),
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Int(v) => format!("integer {}", v),
            Token::Double(v) => format!("number {}", v),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Punct(c) => format!("'{}'", c),
            Token::Doc(_) => "doc comment".to_string(),
            Token::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: usize,
}

const PUNCTUATION: &[char] = &['{', '}', '(', ')', '[', ']', '<', '>', ',', ';', ':', '=', '*'];

pub(crate) fn tokenize(file: &str, source: &str) -> Result<Vec<Spanned>, IdlError> {
    let mut lexer = Lexer {
        file,
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    file: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer<'_> {
    fn error(&self, message: impl Into<String>) -> IdlError {
        IdlError::Parse {
            file: self.file.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn next_token(&mut self) -> Result<Spanned, IdlError> {
        loop {
            let Some(c) = self.peek() else {
                return Ok(Spanned {
                    token: Token::Eof,
                    line: self.line,
                });
            };

            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '#' || (c == '/' && self.peek_at(1) == Some('/')) {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }

            if c == '/' && self.peek_at(1) == Some('*') {
                let line = self.line;
                let is_doc = self.peek_at(2) == Some('*') && self.peek_at(3) != Some('/');
                let body = self.block_comment()?;
                if is_doc {
                    return Ok(Spanned {
                        token: Token::Doc(clean_doc(&body)),
                        line,
                    });
                }
                continue;
            }

            let line = self.line;
            let token = if c.is_ascii_alphabetic() || c == '_' {
                self.identifier()
            } else if c.is_ascii_digit()
                || ((c == '-' || c == '+')
                    && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
            {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string()?
            } else if PUNCTUATION.contains(&c) {
                self.bump();
                Token::Punct(c)
            } else {
                return Err(self.error(format!("unexpected character '{}'", c)));
            };
            return Ok(Spanned { token, line });
        }
    }

    /// Consume a `/* ... */` comment and return its inner text.
    fn block_comment(&mut self) -> Result<String, IdlError> {
        let start_line = self.line;
        self.bump();
        self.bump();
        let mut body = String::new();
        loop {
            match self.bump() {
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(body);
                }
                Some(c) => body.push(c),
                None => {
                    return Err(IdlError::Parse {
                        file: self.file.to_string(),
                        line: start_line,
                        message: "unterminated comment".to_string(),
                    })
                }
            }
        }
    }

    fn identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Token::Ident(ident)
    }

    fn number(&mut self) -> Result<Token, IdlError> {
        let mut text = String::new();
        if let Some(sign @ ('-' | '+')) = self.peek() {
            text.push(sign);
            self.bump();
        }

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let mut hex = String::new();
            while let Some(c) = self.peek().filter(char::is_ascii_hexdigit) {
                hex.push(c);
                self.bump();
            }
            let value = i64::from_str_radix(&hex, 16)
                .map_err(|_| self.error(format!("invalid hex literal '0x{}'", hex)))?;
            return Ok(Token::Int(if text == "-" { -value } else { value }));
        }

        let mut is_double = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' || c == 'e' || c == 'E' {
                is_double = true;
                text.push(c);
            } else if (c == '-' || c == '+') && text.ends_with(['e', 'E']) {
                text.push(c);
            } else {
                break;
            }
            self.bump();
        }

        if is_double {
            text.parse()
                .map(Token::Double)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        } else {
            text.parse()
                .map(Token::Int)
                .map_err(|_| self.error(format!("invalid integer '{}'", text)))
        }
    }

    fn string(&mut self) -> Result<Token, IdlError> {
        let start_line = self.line;
        let quote = self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(c) => value.push(c),
                    None => break,
                },
                Some(c) if Some(c) == quote => return Ok(Token::Str(value)),
                Some(c) => value.push(c),
                None => break,
            }
        }
        Err(IdlError::Parse {
            file: self.file.to_string(),
            line: start_line,
            message: "unterminated string literal".to_string(),
        })
    }
}

/// Strip comment decoration from a doc comment body.
fn clean_doc(body: &str) -> String {
    body.trim_start_matches('*')
        .lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').map(str::trim).unwrap_or(line)
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
