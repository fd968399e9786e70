use super::token::{Token, TokenType};

pub struct Tokenizer<'a> {
    source: &'a str,
    start: usize,
    current: usize,
    line: u32,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    fn peek(&self, distance: usize) -> Option<char> {
        self.source[self.current..].chars().nth(distance)
    }

    fn at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.source[self.current..].chars().next()?;
        self.current += c.len_utf8();
        Some(c)
    }

    fn check(&self, expected: char) -> bool {
        self.peek(0) == Some(expected)
    }

    fn pop_token(&mut self, typ: TokenType) -> Token<'a> {
        let lexeme = &self.source[self.start..self.current];
        self.start = self.current;
        Token::new(typ, lexeme, self.line)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek(0) {
            match c {
                ' ' | '\r' | '\t' => {
                    self.next();
                }
                '\n' => {
                    self.line += 1;
                    self.next();
                }
                '/' if self.peek(1) == Some('/') => {
                    while !self.at_end() && !self.check('\n') {
                        self.next();
                    }
                }
                _ => break,
            }
            self.start = self.current;
        }
    }

    fn string(&mut self) -> Token<'a> {
        while let Some(c) = self.next() {
            match c {
                '"' => return self.pop_token(TokenType::String),
                '\n' => self.line += 1,
                _ => {}
            }
        }
        self.pop_token(TokenType::UntermedString)
    }

    fn number(&mut self) -> Token<'a> {
        while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
            self.next();
        }

        // a fractional part needs a digit after the dot
        if self.check('.') && matches!(self.peek(1), Some(c) if c.is_ascii_digit()) {
            self.next();
            while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
                self.next();
            }
        }

        self.pop_token(TokenType::Number)
    }

    fn identifier(&mut self) -> Token<'a> {
        while matches!(self.peek(0), Some(c) if c.is_alphanumeric() || c == '_') {
            self.next();
        }

        self.pop_token(match &self.source[self.start..self.current] {
            "and" => TokenType::And,
            "else" => TokenType::Else,
            "false" => TokenType::False,
            "for" => TokenType::For,
            "fun" => TokenType::Fun,
            "if" => TokenType::If,
            "nil" => TokenType::Nil,
            "or" => TokenType::Or,
            "print" => TokenType::Print,
            "return" => TokenType::Return,
            "true" => TokenType::True,
            "var" => TokenType::Var,
            "while" => TokenType::While,
            _ => TokenType::Identifier,
        })
    }

    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace();

        match self.next() {
            Some(c) => match c {
                '(' => self.pop_token(TokenType::LeftParen),
                ')' => self.pop_token(TokenType::RightParen),
                '{' => self.pop_token(TokenType::LeftBrace),
                '}' => self.pop_token(TokenType::RightBrace),
                ',' => self.pop_token(TokenType::Comma),
                '.' => self.pop_token(TokenType::Dot),
                '-' => self.pop_token(TokenType::Minus),
                '+' => self.pop_token(TokenType::Plus),
                ';' => self.pop_token(TokenType::Semicolon),
                '/' => self.pop_token(TokenType::Slash),
                '*' => self.pop_token(TokenType::Star),
                '!' => {
                    if self.check('=') {
                        self.next();
                        self.pop_token(TokenType::BangEqual)
                    } else {
                        self.pop_token(TokenType::Bang)
                    }
                }
                '=' => {
                    if self.check('=') {
                        self.next();
                        self.pop_token(TokenType::EqualEqual)
                    } else {
                        self.pop_token(TokenType::Equal)
                    }
                }
                '>' => {
                    if self.check('=') {
                        self.next();
                        self.pop_token(TokenType::GreaterEqual)
                    } else {
                        self.pop_token(TokenType::Greater)
                    }
                }
                '<' => {
                    if self.check('=') {
                        self.next();
                        self.pop_token(TokenType::LessEqual)
                    } else {
                        self.pop_token(TokenType::Less)
                    }
                }
                '"' => self.string(),
                _ => {
                    if c.is_ascii_digit() {
                        self.number()
                    } else if c.is_alphabetic() || c == '_' {
                        self.identifier()
                    } else {
                        self.pop_token(TokenType::Unknown)
                    }
                }
            },
            None => self.pop_token(TokenType::Eof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<(TokenType, &str)> {
        let mut tokenizer = Tokenizer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = tokenizer.next_token();
            if token.typ == TokenType::Eof {
                break;
            }
            tokens.push((token.typ, token.lexeme));
        }
        tokens
    }

    #[test]
    fn scans_punctuation_and_operators() {
        assert_eq!(
            scan("(){};,+-*/ ! != = == > >= < <="),
            vec![
                (TokenType::LeftParen, "("),
                (TokenType::RightParen, ")"),
                (TokenType::LeftBrace, "{"),
                (TokenType::RightBrace, "}"),
                (TokenType::Semicolon, ";"),
                (TokenType::Comma, ","),
                (TokenType::Plus, "+"),
                (TokenType::Minus, "-"),
                (TokenType::Star, "*"),
                (TokenType::Slash, "/"),
                (TokenType::Bang, "!"),
                (TokenType::BangEqual, "!="),
                (TokenType::Equal, "="),
                (TokenType::EqualEqual, "=="),
                (TokenType::Greater, ">"),
                (TokenType::GreaterEqual, ">="),
                (TokenType::Less, "<"),
                (TokenType::LessEqual, "<="),
            ]
        );
    }

    #[test]
    fn scans_literals_and_keywords() {
        assert_eq!(
            scan("var answer = 42.5; print \"hi\";"),
            vec![
                (TokenType::Var, "var"),
                (TokenType::Identifier, "answer"),
                (TokenType::Equal, "="),
                (TokenType::Number, "42.5"),
                (TokenType::Semicolon, ";"),
                (TokenType::Print, "print"),
                (TokenType::String, "\"hi\""),
                (TokenType::Semicolon, ";"),
            ]
        );
    }

    #[test]
    fn dot_without_fraction_stays_separate() {
        assert_eq!(
            scan("1.foo"),
            vec![
                (TokenType::Number, "1"),
                (TokenType::Dot, "."),
                (TokenType::Identifier, "foo"),
            ]
        );
    }

    #[test]
    fn comments_and_newlines_track_lines() {
        let mut tokenizer = Tokenizer::new("// nothing\nprint 1;");
        let token = tokenizer.next_token();
        assert_eq!(token.typ, TokenType::Print);
        assert_eq!(token.line, 2);
    }

    #[test]
    fn unterminated_string_is_flagged() {
        assert_eq!(scan("\"oops"), vec![(TokenType::UntermedString, "\"oops")]);
    }
}
