//! JavaScript lexer/tokenizer
//!
//! Converts source text into a stream of tokens. The lexer works on the raw
//! UTF-8 bytes of the source; identifiers and string literals may contain any
//! non-ASCII characters and are passed through unchanged.
//!
//! A `/` is always lexed as a division operator. When the parser reaches a
//! position where an expression may start, it asks the lexer to rescan the
//! same slash as a regular expression literal with [`Lexer::rescan_regexp`].

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    Ident(String),
    RegExp { pattern: String, flags: String },

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,   // **
    PlusPlus,   // ++
    MinusMinus, // --

    Eq,       // =
    EqEq,     // ==
    EqEqEq,   // ===
    Bang,     // !
    BangEq,   // !=
    BangEqEq, // !==

    Lt,   // <
    LtEq, // <=
    Gt,   // >
    GtEq, // >=

    LtLt,   // <<
    GtGt,   // >>
    GtGtGt, // >>>

    Amp,          // &
    AmpAmp,       // &&
    Pipe,         // |
    PipePipe,     // ||
    Caret,        // ^
    Tilde,        // ~
    QuestionQuestion, // ??

    Question,  // ?
    Colon,     // :
    Semicolon, // ;
    Comma,     // ,
    Dot,       // .
    Arrow,     // =>

    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    // Compound assignment
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    StarStarEq,
    LtLtEq,
    GtGtEq,
    GtGtGtEq,
    AmpEq,
    PipeEq,
    CaretEq,

    // Keywords
    Break,
    Case,
    Catch,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    False,
    Finally,
    For,
    Function,
    If,
    In,
    InstanceOf,
    New,
    Null,
    Return,
    Switch,
    This,
    Throw,
    True,
    Try,
    TypeOf,
    Var,
    Void,
    While,
    Const,
    Let,

    // Special
    Eof,
    Error(String),
}

impl Token {
    /// Source spelling of a keyword token
    ///
    /// Keywords are valid property names after `.` and in object literals.
    pub fn keyword_name(&self) -> Option<&'static str> {
        Some(match self {
            Token::Break => "break",
            Token::Case => "case",
            Token::Catch => "catch",
            Token::Continue => "continue",
            Token::Debugger => "debugger",
            Token::Default => "default",
            Token::Delete => "delete",
            Token::Do => "do",
            Token::Else => "else",
            Token::False => "false",
            Token::Finally => "finally",
            Token::For => "for",
            Token::Function => "function",
            Token::If => "if",
            Token::In => "in",
            Token::InstanceOf => "instanceof",
            Token::New => "new",
            Token::Null => "null",
            Token::Return => "return",
            Token::Switch => "switch",
            Token::This => "this",
            Token::Throw => "throw",
            Token::True => "true",
            Token::Try => "try",
            Token::TypeOf => "typeof",
            Token::Var => "var",
            Token::Void => "void",
            Token::While => "while",
            Token::Const => "const",
            Token::Let => "let",
            _ => return None,
        })
    }

    /// Short description used in syntax error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => crate::util::dtoa::number_to_string(*n),
            Token::String(s) => format!("\"{}\"", s),
            Token::Ident(s) => s.clone(),
            Token::RegExp { pattern, flags } => format!("/{}/{}", pattern, flags),
            Token::Eof => "end of input".to_string(),
            Token::Error(msg) => msg.clone(),
            other => match other.keyword_name().or_else(|| other.punctuator()) {
                Some(name) => name.to_string(),
                None => format!("{:?}", other),
            },
        }
    }

    /// Source spelling of an operator or punctuation token
    pub fn punctuator(&self) -> Option<&'static str> {
        Some(match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::StarStar => "**",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Eq => "=",
            Token::EqEq => "==",
            Token::EqEqEq => "===",
            Token::Bang => "!",
            Token::BangEq => "!=",
            Token::BangEqEq => "!==",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::LtLt => "<<",
            Token::GtGt => ">>",
            Token::GtGtGt => ">>>",
            Token::Amp => "&",
            Token::AmpAmp => "&&",
            Token::Pipe => "|",
            Token::PipePipe => "||",
            Token::Caret => "^",
            Token::Tilde => "~",
            Token::QuestionQuestion => "??",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Arrow => "=>",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::PlusEq => "+=",
            Token::MinusEq => "-=",
            Token::StarEq => "*=",
            Token::SlashEq => "/=",
            Token::PercentEq => "%=",
            Token::StarStarEq => "**=",
            Token::LtLtEq => "<<=",
            Token::GtGtEq => ">>=",
            Token::GtGtGtEq => ">>>=",
            Token::AmpEq => "&=",
            Token::PipeEq => "|=",
            Token::CaretEq => "^=",
            _ => return None,
        })
    }
}

/// Source position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

/// Lexer for JavaScript source code
#[derive(Clone)]
pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    /// Start of the most recently returned token
    token_start: SourcePos,
    /// Whether a line terminator preceded the most recently returned token
    newline_before: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: SourcePos::default(),
            newline_before: false,
        }
    }

    /// Get the current source position
    pub fn position(&self) -> SourcePos {
        SourcePos {
            offset: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    /// Position where the last token started
    #[inline]
    pub fn token_start(&self) -> SourcePos {
        self.token_start
    }

    /// Whether a line break separated the last token from the one before it
    #[inline]
    pub fn newline_before(&self) -> bool {
        self.newline_before
    }

    /// Peek at the current byte without consuming it
    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    /// Peek at the next byte
    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.pos + 1).copied()
    }

    /// Peek at the character starting at the current position
    fn peek_char(&self) -> Option<char> {
        let rest = &self.source[self.pos..];
        let len = match rest.first()? {
            b if *b < 0x80 => 1,
            b if *b >= 0xF0 => 4,
            b if *b >= 0xE0 => 3,
            _ => 2,
        };
        std::str::from_utf8(rest.get(..len)?).ok()?.chars().next()
    }

    /// Consume the current byte
    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if c & 0xC0 != 0x80 {
            // Continuation bytes do not start a new column
            self.column += 1;
        }
        Some(c)
    }

    /// Consume a whole character
    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        for _ in 0..c.len_utf8() {
            self.advance();
        }
        Some(c)
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(b'\n') => {
                    self.newline_before = true;
                    self.advance();
                }
                Some(b' ' | b'\t' | b'\r' | 0x0B | 0x0C) => {
                    self.advance();
                }
                Some(b'/') if self.peek_next() == Some(b'/') => {
                    // Line comment
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_next() == Some(b'*') => {
                    // Block comment
                    self.advance(); // /
                    self.advance(); // *
                    while let Some(c) = self.advance() {
                        if c == b'\n' {
                            self.newline_before = true;
                        }
                        if c == b'*' && self.peek() == Some(b'/') {
                            self.advance();
                            break;
                        }
                    }
                }
                Some(b) if b >= 0x80 => match self.peek_char() {
                    Some('\u{2028}' | '\u{2029}') => {
                        self.newline_before = true;
                        self.advance_char();
                    }
                    Some(c) if crate::util::is_js_whitespace(c) => {
                        self.advance_char();
                    }
                    _ => break,
                },
                _ => break,
            }
        }
    }

    /// Read the next token
    pub fn next_token(&mut self) -> Token {
        self.newline_before = false;
        self.skip_whitespace();
        self.token_start = self.position();

        let Some(c) = self.peek() else {
            return Token::Eof;
        };

        // Identifiers and keywords
        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c == b'\\' {
            return self.read_identifier();
        }
        if c >= 0x80 {
            return match self.peek_char() {
                Some(ch) if ch.is_alphabetic() => self.read_identifier(),
                Some(ch) => {
                    self.advance_char();
                    Token::Error(format!("Invalid or unexpected token '{}'", ch))
                }
                None => {
                    self.advance();
                    Token::Error("Invalid or unexpected token".to_string())
                }
            };
        }

        // Numbers
        if c.is_ascii_digit() || (c == b'.' && self.peek_next().is_some_and(|n| n.is_ascii_digit())) {
            return self.read_number();
        }

        // Strings
        if c == b'"' || c == b'\'' {
            return self.read_string();
        }

        // Operators and punctuation
        self.advance();
        match c {
            b'+' => match self.peek() {
                Some(b'+') => { self.advance(); Token::PlusPlus }
                Some(b'=') => { self.advance(); Token::PlusEq }
                _ => Token::Plus
            }
            b'-' => match self.peek() {
                Some(b'-') => { self.advance(); Token::MinusMinus }
                Some(b'=') => { self.advance(); Token::MinusEq }
                _ => Token::Minus
            }
            b'*' => match self.peek() {
                Some(b'*') => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        Token::StarStarEq
                    } else {
                        Token::StarStar
                    }
                }
                Some(b'=') => { self.advance(); Token::StarEq }
                _ => Token::Star
            }
            b'/' => match self.peek() {
                Some(b'=') => { self.advance(); Token::SlashEq }
                _ => Token::Slash
            }
            b'%' => match self.peek() {
                Some(b'=') => { self.advance(); Token::PercentEq }
                _ => Token::Percent
            }
            b'=' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        Token::EqEqEq
                    } else {
                        Token::EqEq
                    }
                }
                Some(b'>') => { self.advance(); Token::Arrow }
                _ => Token::Eq
            }
            b'!' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        Token::BangEqEq
                    } else {
                        Token::BangEq
                    }
                }
                _ => Token::Bang
            }
            b'<' => match self.peek() {
                Some(b'<') => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        Token::LtLtEq
                    } else {
                        Token::LtLt
                    }
                }
                Some(b'=') => { self.advance(); Token::LtEq }
                _ => Token::Lt
            }
            b'>' => match self.peek() {
                Some(b'>') => {
                    self.advance();
                    match self.peek() {
                        Some(b'>') => {
                            self.advance();
                            if self.peek() == Some(b'=') {
                                self.advance();
                                Token::GtGtGtEq
                            } else {
                                Token::GtGtGt
                            }
                        }
                        Some(b'=') => { self.advance(); Token::GtGtEq }
                        _ => Token::GtGt
                    }
                }
                Some(b'=') => { self.advance(); Token::GtEq }
                _ => Token::Gt
            }
            b'&' => match self.peek() {
                Some(b'&') => { self.advance(); Token::AmpAmp }
                Some(b'=') => { self.advance(); Token::AmpEq }
                _ => Token::Amp
            }
            b'|' => match self.peek() {
                Some(b'|') => { self.advance(); Token::PipePipe }
                Some(b'=') => { self.advance(); Token::PipeEq }
                _ => Token::Pipe
            }
            b'^' => match self.peek() {
                Some(b'=') => { self.advance(); Token::CaretEq }
                _ => Token::Caret
            }
            b'?' => match self.peek() {
                Some(b'?') => { self.advance(); Token::QuestionQuestion }
                _ => Token::Question
            }
            b'~' => Token::Tilde,
            b':' => Token::Colon,
            b';' => Token::Semicolon,
            b',' => Token::Comma,
            b'.' => Token::Dot,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            _ => Token::Error(format!("Invalid or unexpected token '{}'", c as char))
        }
    }

    /// Re-read the token that started at `start` as a regular expression
    ///
    /// `start` must be the position of a `/` or `/=` token the parser found
    /// in expression position.
    pub fn rescan_regexp(&mut self, start: SourcePos) -> Token {
        self.pos = start.offset;
        self.line = start.line;
        self.column = start.column;
        self.token_start = start;
        self.advance(); // opening /

        let body_start = self.pos;
        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Token::Error("Invalid regular expression: missing /".to_string());
                }
                Some(b'\\') => {
                    self.advance();
                    if self.peek().is_none_or(|c| c == b'\n') {
                        return Token::Error("Invalid regular expression: missing /".to_string());
                    }
                    self.advance();
                }
                Some(b'[') => {
                    in_class = true;
                    self.advance();
                }
                Some(b']') => {
                    in_class = false;
                    self.advance();
                }
                Some(b'/') if !in_class => break,
                Some(_) => {
                    self.advance();
                }
            }
        }
        let pattern = String::from_utf8_lossy(&self.source[body_start..self.pos]).into_owned();
        self.advance(); // closing /

        let flags_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                self.advance();
            } else {
                break;
            }
        }
        let flags = String::from_utf8_lossy(&self.source[flags_start..self.pos]).into_owned();
        Token::RegExp { pattern, flags }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        loop {
            match self.peek() {
                Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' => {
                    self.advance();
                    ident.push(c as char);
                }
                Some(b'\\') => {
                    // \uXXXX escapes are allowed inside identifiers
                    self.advance();
                    if self.advance() != Some(b'u') {
                        return Token::Error("Invalid Unicode escape sequence".to_string());
                    }
                    match self.read_unicode_escape() {
                        Some(ch) => ident.push(ch),
                        None => return Token::Error("Invalid Unicode escape sequence".to_string()),
                    }
                }
                Some(c) if c >= 0x80 => match self.peek_char() {
                    Some(ch) if ch.is_alphanumeric() || ch == '\u{200C}' || ch == '\u{200D}' => {
                        self.advance_char();
                        ident.push(ch);
                    }
                    _ => break,
                },
                _ => break,
            }
        }

        // Check for keywords
        match ident.as_str() {
            "break" => Token::Break,
            "case" => Token::Case,
            "catch" => Token::Catch,
            "const" => Token::Const,
            "continue" => Token::Continue,
            "debugger" => Token::Debugger,
            "default" => Token::Default,
            "delete" => Token::Delete,
            "do" => Token::Do,
            "else" => Token::Else,
            "false" => Token::False,
            "finally" => Token::Finally,
            "for" => Token::For,
            "function" => Token::Function,
            "if" => Token::If,
            "in" => Token::In,
            "instanceof" => Token::InstanceOf,
            "let" => Token::Let,
            "new" => Token::New,
            "null" => Token::Null,
            "return" => Token::Return,
            "switch" => Token::Switch,
            "this" => Token::This,
            "throw" => Token::Throw,
            "true" => Token::True,
            "try" => Token::Try,
            "typeof" => Token::TypeOf,
            "var" => Token::Var,
            "void" => Token::Void,
            "while" => Token::While,
            _ => Token::Ident(ident)
        }
    }

    /// Read a number literal
    fn read_number(&mut self) -> Token {
        let start = self.pos;

        if self.peek() == Some(b'0') {
            let radix = match self.peek_next() {
                Some(b'x' | b'X') => Some(16),
                Some(b'o' | b'O') => Some(8),
                Some(b'b' | b'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                self.advance();
                let digits_start = self.pos;
                let mut value = 0.0f64;
                while let Some(c) = self.peek() {
                    match (c as char).to_digit(radix) {
                        Some(d) => {
                            value = value * radix as f64 + d as f64;
                            self.advance();
                        }
                        None => break,
                    }
                }
                if self.pos == digits_start {
                    return Token::Error("Invalid or unexpected token".to_string());
                }
                return Token::Number(value);
            }
        }

        // Integer part
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        // Decimal part
        if self.peek() == Some(b'.') {
            self.advance(); // .
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        // Exponent part
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let num_str = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("0");
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == b'_' || c == b'$') {
            return Token::Error("Invalid or unexpected token".to_string());
        }
        match num_str.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Error(format!("Invalid number: {}", num_str))
        }
    }

    /// Read the hex digits of a `\u` escape (the `\u` is already consumed)
    fn read_unicode_escape(&mut self) -> Option<char> {
        let code = if self.peek() == Some(b'{') {
            self.advance();
            let mut code = 0u32;
            let mut digits = 0;
            loop {
                let c = self.advance()?;
                if c == b'}' {
                    break;
                }
                code = code.checked_mul(16)?.checked_add((c as char).to_digit(16)?)?;
                digits += 1;
            }
            if digits == 0 {
                return None;
            }
            code
        } else {
            let high = self.read_hex(4)?;
            // Combine an escaped surrogate pair into one character
            if (0xD800..0xDC00).contains(&high)
                && self.peek() == Some(b'\\')
                && self.source.get(self.pos + 1) == Some(&b'u')
            {
                let saved = (self.pos, self.line, self.column);
                self.advance();
                self.advance();
                match self.read_hex(4) {
                    Some(low) if (0xDC00..0xE000).contains(&low) => {
                        return char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00));
                    }
                    _ => (self.pos, self.line, self.column) = saved,
                }
            }
            high
        };
        // Lone surrogates cannot live in a UTF-8 string
        Some(char::from_u32(code).unwrap_or('\u{FFFD}'))
    }

    fn read_hex(&mut self, count: usize) -> Option<u32> {
        let mut value = 0;
        for _ in 0..count {
            let c = self.advance()?;
            value = value * 16 + (c as char).to_digit(16)?;
        }
        Some(value)
    }

    /// Read a string literal
    fn read_string(&mut self) -> Token {
        let Some(quote) = self.advance() else {
            return Token::Eof;
        };
        let mut bytes: Vec<u8> = Vec::new();

        loop {
            match self.peek() {
                None | Some(b'\n') => return Token::Error("Invalid or unexpected token".to_string()),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let push = |bytes: &mut Vec<u8>, ch: char| {
                        let mut buf = [0u8; 4];
                        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    };
                    match self.advance() {
                        Some(b'n') => push(&mut bytes, '\n'),
                        Some(b'r') => push(&mut bytes, '\r'),
                        Some(b't') => push(&mut bytes, '\t'),
                        Some(b'b') => push(&mut bytes, '\u{8}'),
                        Some(b'f') => push(&mut bytes, '\u{c}'),
                        Some(b'v') => push(&mut bytes, '\u{b}'),
                        Some(b'0') if !self.peek().is_some_and(|c| c.is_ascii_digit()) => push(&mut bytes, '\0'),
                        Some(b'x') => match self.read_hex(2).and_then(char::from_u32) {
                            Some(ch) => push(&mut bytes, ch),
                            None => return Token::Error("Invalid hexadecimal escape sequence".to_string()),
                        },
                        Some(b'u') => match self.read_unicode_escape() {
                            Some(ch) => push(&mut bytes, ch),
                            None => return Token::Error("Invalid Unicode escape sequence".to_string()),
                        },
                        // Line continuation
                        Some(b'\n') => {}
                        Some(b'\r') => {
                            if self.peek() == Some(b'\n') {
                                self.advance();
                            }
                        }
                        Some(c) if c >= 0x80 => {
                            // Escaped non-ASCII character: keep the whole sequence
                            bytes.push(c);
                            while self.peek().is_some_and(|b| b & 0xC0 == 0x80) {
                                if let Some(b) = self.advance() {
                                    bytes.push(b);
                                }
                            }
                        }
                        Some(c) => bytes.push(c),
                        None => return Token::Error("Invalid or unexpected token".to_string()),
                    }
                }
                Some(c) => {
                    self.advance();
                    bytes.push(c);
                }
            }
        }

        Token::String(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("42 3.14 1e10 0xff .5 0b101");

        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 42.0));
        assert!(matches!(lexer.next_token(), Token::Number(n) if (n - 3.14).abs() < 0.001));
        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 1e10));
        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 255.0));
        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 0.5));
        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 5.0));
    }

    #[test]
    fn test_strings() {
        let mut lexer = Lexer::new(r#""hello" 'world' "a\tbA\x42" "\u{1F600}""#);

        assert_eq!(lexer.next_token(), Token::String("hello".to_string()));
        assert_eq!(lexer.next_token(), Token::String("world".to_string()));
        assert_eq!(lexer.next_token(), Token::String("a\tbAB".to_string()));
        assert_eq!(lexer.next_token(), Token::String("😀".to_string()));
    }

    #[test]
    fn test_non_ascii_passthrough() {
        let mut lexer = Lexer::new("中文字段 = '值'");

        assert_eq!(lexer.next_token(), Token::Ident("中文字段".to_string()));
        assert_eq!(lexer.next_token(), Token::Eq);
        assert_eq!(lexer.next_token(), Token::String("值".to_string()));
    }

    #[test]
    fn test_identifiers_and_keywords() {
        let mut lexer = Lexer::new("foo var if else of");

        assert_eq!(lexer.next_token(), Token::Ident("foo".to_string()));
        assert_eq!(lexer.next_token(), Token::Var);
        assert_eq!(lexer.next_token(), Token::If);
        assert_eq!(lexer.next_token(), Token::Else);
        assert_eq!(lexer.next_token(), Token::Ident("of".to_string()));
    }

    #[test]
    fn test_operators() {
        let mut lexer = Lexer::new("+ ++ += === !== => ??");

        assert_eq!(lexer.next_token(), Token::Plus);
        assert_eq!(lexer.next_token(), Token::PlusPlus);
        assert_eq!(lexer.next_token(), Token::PlusEq);
        assert_eq!(lexer.next_token(), Token::EqEqEq);
        assert_eq!(lexer.next_token(), Token::BangEqEq);
        assert_eq!(lexer.next_token(), Token::Arrow);
        assert_eq!(lexer.next_token(), Token::QuestionQuestion);
    }

    #[test]
    fn test_comments_and_newlines() {
        let mut lexer = Lexer::new("1 // comment\n2 /* block */ 3");

        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 1.0));
        assert!(!lexer.newline_before());
        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 2.0));
        assert!(lexer.newline_before());
        assert_eq!(lexer.token_start().line, 2);
        assert!(matches!(lexer.next_token(), Token::Number(n) if n == 3.0));
        assert!(!lexer.newline_before());
    }

    #[test]
    fn test_regexp_rescan() {
        let mut lexer = Lexer::new("/a[/]b\\//gi;");

        assert_eq!(lexer.next_token(), Token::Slash);
        let start = lexer.token_start();
        assert_eq!(
            lexer.rescan_regexp(start),
            Token::RegExp { pattern: "a[/]b\\/".to_string(), flags: "gi".to_string() }
        );
        assert_eq!(lexer.next_token(), Token::Semicolon);
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("'abc");
        assert!(matches!(lexer.next_token(), Token::Error(_)));
    }
}
