use std::borrow::Cow;
use std::iter::FusedIterator;

/// Scanner takes in an input and spits out tokens, one per call, on demand.
#[derive(Debug)]
pub struct Scanner<'a> {
    source: &'a str,
    // Byte offsets into `source`: the token being scanned is `source[start..current]`.
    start: usize,
    current: usize,
    line: usize,
    finished: bool,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    // Literals.
    Identifier,
    String,
    Number,
    // Keywords.
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Error,
    Eof,
}

/// Token is a single token, including a ref to the raw characters that constitute it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// What kind of token this is.
    pub typ: TokenType,
    /// The lexeme, borrowed from the source. For `Error` tokens this is the message instead.
    // Cow so that error messages can live next to borrowed lexemes.
    pub raw: Cow<'a, str>,
    /// 1-based source line the token ends on.
    pub line: usize,
}

impl<'a> Token<'a> {
    /// A token that doesn't come from any source text, e.g. the parser's placeholder before the first `advance`.
    pub fn synthetic(typ: TokenType, line: usize) -> Token<'a> {
        Token {
            typ,
            raw: Cow::Borrowed(""),
            line,
        }
    }
}

impl<'a> Scanner<'a> {
    /// Returns a fresh Scanner, ready to spit out tokens from the given source
    pub fn new(source: &'a str) -> Scanner<'a> {
        Scanner {
            source,
            start: 0,
            current: 0,
            line: 1,
            finished: false,
        }
    }

    /// Returns the next token from the input, advancing the scanner.
    /// Errors are represented in-band as TokenType::Error.
    /// The scanner will return one Eof token, then None afterwards.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        if self.finished {
            return None;
        }
        self.skip_whitespace();
        self.start = self.current;

        let c = match self.bump() {
            Some(c) => c,
            None => {
                self.finished = true;
                return Some(self.make_token(TokenType::Eof));
            }
        };
        let typ = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            ';' => TokenType::Semicolon,
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            '-' => TokenType::Minus,
            '+' => TokenType::Plus,
            '/' => TokenType::Slash,
            '*' => TokenType::Star,
            '!' => self.one_or_two('=', TokenType::BangEqual, TokenType::Bang),
            '=' => self.one_or_two('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.one_or_two('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.one_or_two('=', TokenType::GreaterEqual, TokenType::Greater),
            '"' => return Some(self.string()),
            '0'..='9' => self.number(),
            c if is_identifier_start(c) => self.identifier(),
            _ => return Some(self.error_token("Unexpected character.")),
        };
        Some(self.make_token(typ))
    }

    fn peek(&self) -> Option<char> {
        self.source[self.current..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.source[self.current..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += c.len_utf8();
        Some(c)
    }

    // `two` if the next char is `second` (consuming it), otherwise `one`.
    fn one_or_two(&mut self, second: char, two: TokenType, one: TokenType) -> TokenType {
        if self.peek() == Some(second) {
            self.bump();
            two
        } else {
            one
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\r' | '\t') => {
                    self.bump();
                }
                Some('\n') => {
                    self.line += 1;
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    // The newline is left for the next iteration, so it still gets counted.
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn lexeme(&self) -> &'a str {
        &self.source[self.start..self.current]
    }

    fn make_token(&self, typ: TokenType) -> Token<'a> {
        Token {
            typ,
            raw: Cow::Borrowed(self.lexeme()),
            line: self.line,
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'a> {
        Token {
            typ: TokenType::Error,
            raw: Cow::Borrowed(message),
            line: self.line,
        }
    }

    // No escape sequences, so the literal simply runs to the next double quote. The lexeme keeps both quotes.
    fn string(&mut self) -> Token<'a> {
        loop {
            match self.bump() {
                Some('"') => return self.make_token(TokenType::String),
                Some('\n') => self.line += 1,
                Some(_) => {}
                None => return self.error_token("Unterminated string."),
            }
        }
    }

    // A '.' only belongs to the number when a digit follows it: "1." is a number then a dot.
    fn number(&mut self) -> TokenType {
        self.skip_digits();
        if self.peek() == Some('.') && self.peek_second().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
            self.skip_digits();
        }
        TokenType::Number
    }

    fn skip_digits(&mut self) {
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn identifier(&mut self) -> TokenType {
        while self
            .peek()
            .map_or(false, |c| is_identifier_start(c) || c.is_ascii_digit())
        {
            self.bump();
        }
        keyword(self.lexeme()).unwrap_or(TokenType::Identifier)
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn keyword(text: &str) -> Option<TokenType> {
    let typ = match text {
        "and" => TokenType::And,
        "class" => TokenType::Class,
        "else" => TokenType::Else,
        "false" => TokenType::False,
        "for" => TokenType::For,
        "fun" => TokenType::Fun,
        "if" => TokenType::If,
        "nil" => TokenType::Nil,
        "or" => TokenType::Or,
        "print" => TokenType::Print,
        "return" => TokenType::Return,
        "super" => TokenType::Super,
        "this" => TokenType::This,
        "true" => TokenType::True,
        "var" => TokenType::Var,
        "while" => TokenType::While,
        _ => return None,
    };
    Some(typ)
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

impl<'a> FusedIterator for Scanner<'a> {}
