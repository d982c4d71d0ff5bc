use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Percent,

    // One or two character tokens
    Equal,
    EqualEqual,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    Else,
    If,
    Print,
    While,

    Eof,
    Unknown,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenType::LeftParen => "(",
            TokenType::RightParen => ")",
            TokenType::LeftBrace => "{",
            TokenType::RightBrace => "}",
            TokenType::Minus => "-",
            TokenType::Plus => "+",
            TokenType::Semicolon => ";",
            TokenType::Slash => "/",
            TokenType::Star => "*",
            TokenType::Percent => "%",
            TokenType::Equal => "=",
            TokenType::EqualEqual => "==",
            TokenType::LessEqual => "<=",
            TokenType::Identifier => "identifier",
            TokenType::String => "string",
            TokenType::Number => "number",
            TokenType::Else => "else",
            TokenType::If => "if",
            TokenType::Print => "print",
            TokenType::While => "while",
            TokenType::Eof => "end of input",
            TokenType::Unknown => "unknown",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub token_type: TokenType,
    pub lexeme: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    /// The text between the quotes of a string literal.
    pub fn string_contents(&self) -> &'a str {
        self.lexeme
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(self.lexeme)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeErrorKind {
    #[error("Unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("Unsupported operator '{0}', only '<=' is recognized")]
    UnsupportedOperator(char),
    #[error("Unterminated string")]
    UnterminatedString,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct TokenizeError {
    pub kind: TokenizeErrorKind,
    pub span: Span,
}

impl TokenizeError {
    /// The offending input as an `Unknown` token.
    pub fn unknown_token<'a>(&self, source: &'a str) -> Token<'a> {
        Token {
            token_type: TokenType::Unknown,
            lexeme: self.span.slice(source),
            span: self.span.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Position {
    offset: usize,
    line: usize,
    column: usize,
}

/// Pull-based scanner. Every call to [`Tokenizer::token`] moves the cursor past
/// what it returned, including input that produced an error, so scanning can
/// always resume after a failure.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    source: &'a str,
    position: Position,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            position: Position {
                offset: 0,
                line: 1,
                column: 1,
            },
        }
    }

    pub fn token(&mut self) -> Result<Token<'a>, TokenizeError> {
        self.advance_while(char::is_whitespace);

        let start = self.position;
        let Some(c) = self.advance() else {
            return Ok(self.make_token(TokenType::Eof, start));
        };

        let token_type = match c {
            c if c.is_ascii_alphabetic() => {
                self.advance_while(|c| c.is_ascii_alphanumeric());
                keyword_or_identifier(&self.source[start.offset..self.position.offset])
            }
            c if c.is_ascii_digit() => {
                self.advance_while(|c| c.is_ascii_digit());
                TokenType::Number
            }
            '"' => return self.string(start),
            '=' => {
                if self.advance_if('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                }
            }
            '<' => {
                if self.advance_if('=') {
                    TokenType::LessEqual
                } else {
                    return Err(self.error(TokenizeErrorKind::UnsupportedOperator('<'), start));
                }
            }
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            '-' => TokenType::Minus,
            '+' => TokenType::Plus,
            ';' => TokenType::Semicolon,
            '/' => TokenType::Slash,
            '*' => TokenType::Star,
            '%' => TokenType::Percent,
            c => return Err(self.error(TokenizeErrorKind::UnexpectedCharacter(c), start)),
        };

        Ok(self.make_token(token_type, start))
    }

    fn string(&mut self, start: Position) -> Result<Token<'a>, TokenizeError> {
        self.advance_while(|c| c != '"');
        if self.advance_if('"') {
            Ok(self.make_token(TokenType::String, start))
        } else {
            Err(self.error(TokenizeErrorKind::UnterminatedString, start))
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.position.offset..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position.offset += c.len_utf8();
        if c == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(c)
    }

    fn advance_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance_while(&mut self, predicate: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&predicate) {
            self.advance();
        }
    }

    fn span_from(&self, start: Position) -> Span {
        Span {
            start_line: start.line,
            start_column: start.column,
            end_line: self.position.line,
            end_column: self.position.column,
            start_offset: start.offset,
            end_offset: self.position.offset,
        }
    }

    fn make_token(&self, token_type: TokenType, start: Position) -> Token<'a> {
        Token {
            token_type,
            lexeme: &self.source[start.offset..self.position.offset],
            span: self.span_from(start),
        }
    }

    fn error(&self, kind: TokenizeErrorKind, start: Position) -> TokenizeError {
        TokenizeError {
            kind,
            span: self.span_from(start),
        }
    }
}

fn keyword_or_identifier(text: &str) -> TokenType {
    match text {
        "print" => TokenType::Print,
        "if" => TokenType::If,
        "else" => TokenType::Else,
        "while" => TokenType::While,
        _ => TokenType::Identifier,
    }
}

/// Collects every token up to and including `Eof`, stopping at the first error.
pub fn tokens(source: &str) -> Result<Vec<Token<'_>>, TokenizeError> {
    let mut tokenizer = Tokenizer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = tokenizer.token()?;
        let done = token.token_type == TokenType::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }

    Ok(tokens)
}
