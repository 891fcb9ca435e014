// I found https://matklad.github.io/2020/04/13/simple-but-powerful-pratt-parsing.html
// to be a very helpful guide to writing a Pratt parser in Rust.

use std::fmt::Display;

use thiserror::Error;

use crate::{
    scanner::{Token, TokenType},
    vm::{Chunk, Heap, Instruction, Value},
};

/// Where in the source a compile error was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At a token, holding its lexeme.
    At(String),
    /// At the end of the input.
    End,
    /// The scanner rejected the input; its message says what was wrong.
    Scanner,
}

impl ErrorLocation {
    fn of(token: &Token<'_>) -> ErrorLocation {
        match token.typ {
            TokenType::Eof => ErrorLocation::End,
            TokenType::Error => ErrorLocation::Scanner,
            _ => ErrorLocation::At(token.raw.to_string()),
        }
    }
}

impl Display for ErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLocation::At(lexeme) => write!(f, " at '{}'", lexeme),
            ErrorLocation::End => write!(f, " at end"),
            ErrorLocation::Scanner => Ok(()),
        }
    }
}

/// A single diagnostic reported while compiling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    /// Line of the offending token.
    pub line: usize,
    /// The offending token.
    pub location: ErrorLocation,
    /// What was expected or went wrong.
    pub message: String,
}

// Parser takes a source of tokens, and spits out a chunk.
// The public API for Parser is the compile() function.
// Parsing and code generation happen in the same pass: every rule writes its bytecode
// as soon as it has recognized its piece of syntax.
#[derive(Debug)]
struct Parser<'a, 'h, T> {
    tokens: T,
    chunk: Chunk,
    // String literals and global names are interned as they're compiled.
    heap: &'h mut Heap,
    previous_token: Token<'a>,
    current_token: Token<'a>,
    errors: Vec<CompileError>,
    in_panic_mode: bool,
    // How many parse_precedence calls are active; bounded so nesting can't exhaust the native stack.
    depth: usize,
}

const MAX_NESTING: usize = 1024;

mod precedence {
    // The book uses a C enum. The key, really, is a comparable enum, thus we derive Ord.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub enum Precedence {
        Bottom,
        Assignment,
        Or,
        And,
        Equality,
        Comparison,
        Term,
        Factor,
        Unary,
        Call,
        Primary,
    }
    use Precedence::*;

    impl Precedence {
        // One level tighter, which is what makes binary operators left-associative.
        pub fn next(&self) -> Precedence {
            match self {
                Bottom => Assignment,
                Assignment => Or,
                Or => And,
                And => Equality,
                Equality => Comparison,
                Comparison => Term,
                Term => Factor,
                Factor => Unary,
                Unary => Call,
                Call => Primary,
                Primary => Primary,
            }
        }
    }
}

use precedence::Precedence;

type ParseFn<'a, 'h, T> = fn(&mut Parser<'a, 'h, T>, bool);

// One row of the Pratt table: what a token does at the start of an expression, what it does
// after a complete left operand, and how tightly it binds in that second role.
struct ParseRule<'a, 'h, T> {
    prefix: Option<ParseFn<'a, 'h, T>>,
    infix: Option<ParseFn<'a, 'h, T>>,
    precedence: Precedence,
}

impl<'a, 'h, T> ParseRule<'a, 'h, T> {
    fn new(
        prefix: Option<ParseFn<'a, 'h, T>>,
        infix: Option<ParseFn<'a, 'h, T>>,
        precedence: Precedence,
    ) -> Self {
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }
}

impl<'a, 'h, T> Parser<'a, 'h, T>
where
    T: Iterator<Item = Token<'a>>,
{
    // The book uses an array indexed by the token type, but that's really just a match statement.
    fn rule(typ: TokenType) -> ParseRule<'a, 'h, T> {
        use self::precedence::Precedence as P;
        match typ {
            TokenType::LeftParen => ParseRule::new(Some(Self::grouping), None, P::Bottom),
            TokenType::Minus => ParseRule::new(Some(Self::unary), Some(Self::binary), P::Term),
            TokenType::Plus => ParseRule::new(None, Some(Self::binary), P::Term),
            TokenType::Slash | TokenType::Star => {
                ParseRule::new(None, Some(Self::binary), P::Factor)
            }
            TokenType::Bang => ParseRule::new(Some(Self::unary), None, P::Bottom),
            TokenType::BangEqual | TokenType::EqualEqual => {
                ParseRule::new(None, Some(Self::binary), P::Equality)
            }
            TokenType::Greater
            | TokenType::GreaterEqual
            | TokenType::Less
            | TokenType::LessEqual => ParseRule::new(None, Some(Self::binary), P::Comparison),
            TokenType::Identifier => ParseRule::new(Some(Self::variable), None, P::Bottom),
            TokenType::String => ParseRule::new(Some(Self::string), None, P::Bottom),
            TokenType::Number => ParseRule::new(Some(Self::number), None, P::Bottom),
            TokenType::False | TokenType::True | TokenType::Nil => {
                ParseRule::new(Some(Self::literal), None, P::Bottom)
            }
            _ => ParseRule::new(None, None, P::Bottom),
        }
    }

    fn compile(&mut self) {
        self.advance();
        while !self.match_token(TokenType::Eof) {
            self.declaration();
        }
        self.end_compile();
    }

    fn advance(&mut self) {
        let line = self.current_token.line;
        self.previous_token = std::mem::replace(
            &mut self.current_token,
            Token::synthetic(TokenType::Eof, line),
        );
        loop {
            // Past the Eof token the scanner has nothing more; keep reporting Eof.
            self.current_token = self
                .tokens
                .next()
                .unwrap_or_else(|| Token::synthetic(TokenType::Eof, line));
            if self.current_token.typ != TokenType::Error {
                break;
            }
            let message = self.current_token.raw.to_string();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, expected_type: TokenType, message_if_missing: &str) {
        if self.current_token.typ == expected_type {
            self.advance();
        } else {
            self.error_at_current(message_if_missing);
        }
    }

    fn check(&self, typ: TokenType) -> bool {
        self.current_token.typ == typ
    }

    fn match_token(&mut self, typ: TokenType) -> bool {
        if !self.check(typ) {
            return false;
        }
        self.advance();
        true
    }

    fn declaration(&mut self) {
        if self.match_token(TokenType::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.in_panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.write_instruction(Instruction::Nil);
        }
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.write_instruction(Instruction::DefineGlobal(global));
    }

    fn parse_variable(&mut self, message_if_missing: &str) -> u8 {
        self.consume(TokenType::Identifier, message_if_missing);
        let name = self.previous_token.raw.clone();
        self.identifier_constant(&name)
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let name = self.heap.copy_string(name);
        self.make_constant(Value::Object(name))
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::Print) {
            self.print_statement();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.write_instruction(Instruction::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.write_instruction(Instruction::Pop);
    }

    // Skip tokens until something that looks like the start of a statement, so that one mistake
    // doesn't cascade into a pile of bogus errors.
    fn synchronize(&mut self) {
        self.in_panic_mode = false;

        while self.current_token.typ != TokenType::Eof {
            if self.previous_token.typ == TokenType::Semicolon {
                return;
            }
            match self.current_token.typ {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    // The contract of this function is to consume an expression whose operators all bind at least as tightly
    // as `min_precedence`, and emit bytecode to the chunk such that the bytecode is a stack-ified version of it,
    // e.g. if the tokens are 1 + 2, it should emit two constant instructions then an add.
    fn parse_precedence(&mut self, min_precedence: Precedence) {
        if self.depth >= MAX_NESTING {
            self.error("Expression nesting too deep.");
            return;
        }
        self.depth += 1;
        self.parse_operand_and_operators(min_precedence);
        self.depth -= 1;
    }

    fn parse_operand_and_operators(&mut self, min_precedence: Precedence) {
        self.advance();
        let prefix = match Self::rule(self.previous_token.typ).prefix {
            Some(prefix) => prefix,
            None => {
                self.error("Expect expression.");
                return;
            }
        };

        // Only a whole expression at assignment level may be the target of `=`; `a + b = c` must not be.
        let can_assign = min_precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while min_precedence <= Self::rule(self.current_token.typ).precedence {
            self.advance();
            if let Some(infix) = Self::rule(self.previous_token.typ).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn number(&mut self, _can_assign: bool) {
        match self.previous_token.raw.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self, _can_assign: bool) {
        // The lexeme still has its quotes.
        let raw: &str = &self.previous_token.raw;
        let content = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);
        let s = self.heap.copy_string(content);
        self.emit_constant(Value::Object(s));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous_token.typ {
            TokenType::False => self.write_instruction(Instruction::False),
            TokenType::True => self.write_instruction(Instruction::True),
            TokenType::Nil => self.write_instruction(Instruction::Nil),
            _ => {}
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression(); // parens reset the precedence
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous_token.raw.clone();
        self.named_variable(&name, can_assign);
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let arg = self.identifier_constant(name);
        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.write_instruction(Instruction::SetGlobal(arg));
        } else {
            self.write_instruction(Instruction::GetGlobal(arg));
        }
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous_token.typ;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenType::Bang => self.write_instruction(Instruction::Not),
            TokenType::Minus => self.write_instruction(Instruction::Negate),
            _ => {}
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous_token.typ;
        let rule = Self::rule(operator);
        self.parse_precedence(rule.precedence.next());

        // There are no dedicated instructions for !=, >= and <=; each is the negation of another comparison.
        match operator {
            TokenType::BangEqual => self.write_instructions(Instruction::Equal, Instruction::Not),
            TokenType::EqualEqual => self.write_instruction(Instruction::Equal),
            TokenType::Greater => self.write_instruction(Instruction::Greater),
            TokenType::GreaterEqual => self.write_instructions(Instruction::Less, Instruction::Not),
            TokenType::Less => self.write_instruction(Instruction::Less),
            TokenType::LessEqual => self.write_instructions(Instruction::Greater, Instruction::Not),
            TokenType::Plus => self.write_instruction(Instruction::Add),
            TokenType::Minus => self.write_instruction(Instruction::Subtract),
            TokenType::Star => self.write_instruction(Instruction::Multiply),
            TokenType::Slash => self.write_instruction(Instruction::Divide),
            _ => {}
        }
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let idx = self.chunk.add_constant(value);
        match u8::try_from(idx) {
            Ok(idx) => idx,
            Err(_) => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.write_instruction(Instruction::Constant(idx));
    }

    fn write_instruction(&mut self, instruction: Instruction) {
        self.chunk
            .write_instruction(instruction, self.previous_token.line)
    }

    fn write_instructions(&mut self, first: Instruction, second: Instruction) {
        self.write_instruction(first);
        self.write_instruction(second);
    }

    fn end_compile(&mut self) {
        self.write_instruction(Instruction::Return);
        #[cfg(feature = "print_code")]
        if self.errors.is_empty() {
            log::debug!("\n{}", self.chunk.disassemble("code", self.heap));
        }
    }

    fn error(&mut self, message: &str) {
        let location = ErrorLocation::of(&self.previous_token);
        self.report(self.previous_token.line, location, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let location = ErrorLocation::of(&self.current_token);
        self.report(self.current_token.line, location, message);
    }

    // Only the first error of a panic is reported; synchronize() ends the panic.
    fn report(&mut self, line: usize, location: ErrorLocation, message: &str) {
        if self.in_panic_mode {
            return;
        }
        self.in_panic_mode = true;
        let error = CompileError {
            line,
            location,
            message: message.to_string(),
        };
        log::debug!("compile error: {}", error);
        self.errors.push(error);
    }
}

/// Take a source of tokens, attempt to compile it, and if compilation succeeds, return the chunk.
/// Otherwise return every error that was reported, in order.
///
/// Strings in the source are interned into `heap`, which has to be the heap the chunk is later run with.
pub fn compile<'a, T>(tokens: T, heap: &mut Heap) -> Result<Chunk, Vec<CompileError>>
where
    T: Iterator<Item = Token<'a>>,
{
    let mut parser = Parser {
        tokens,
        chunk: Chunk::new(),
        heap,
        previous_token: Token::synthetic(TokenType::Eof, 1),
        current_token: Token::synthetic(TokenType::Eof, 1),
        errors: Vec::new(),
        in_panic_mode: false,
        depth: 0,
    };
    parser.compile();
    if parser.errors.is_empty() {
        log::debug!(
            "compiled {} bytes of code, {} constants",
            parser.chunk.len(),
            parser.chunk.constants().len()
        );
        Ok(parser.chunk)
    } else {
        Err(parser.errors)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scanner::Scanner;
    use Instruction::*;

    fn compile_str(text: &str) -> Result<(Chunk, Heap), Vec<CompileError>> {
        let mut heap = Heap::new();
        let chunk = compile(Scanner::new(text), &mut heap)?;
        Ok((chunk, heap))
    }

    fn instructions(chunk: &Chunk) -> Vec<Instruction> {
        let mut ret = vec![];
        let mut offset = 0;
        while offset < chunk.len() {
            let (instruction, size) = chunk.read_instruction(offset).unwrap();
            ret.push(instruction);
            offset += size;
        }
        ret
    }

    fn messages(text: &str) -> Vec<String> {
        compile_str(text)
            .err()
            .expect("compiling fails")
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_thing() {
        let text = "(1 + 3 ) / -(-1 + -2);";
        let (chunk, _) = compile_str(text).expect("compiling succeeds");
        assert_eq!(
            instructions(&chunk),
            vec![
                Constant(0),
                Constant(1),
                Add,
                Constant(2),
                Negate,
                Constant(3),
                Negate,
                Add,
                Negate,
                Divide,
                Pop,
                Return
            ]
        );
    }

    #[test]
    fn test_precedence_and_associativity() {
        let (chunk, _) = compile_str("print 1 - 2 - 3 * 4;").unwrap();
        assert_eq!(
            instructions(&chunk),
            vec![
                Constant(0),
                Constant(1),
                Subtract,
                Constant(2),
                Constant(3),
                Multiply,
                Subtract,
                Print,
                Return
            ]
        );
    }

    #[test]
    fn test_negated_comparisons() {
        let (chunk, _) = compile_str("1 >= 2; 1 <= 2; 1 != 2; !true == false;").unwrap();
        assert_eq!(
            instructions(&chunk),
            vec![
                Constant(0),
                Constant(1),
                Less,
                Not,
                Pop,
                Constant(2),
                Constant(3),
                Greater,
                Not,
                Pop,
                Constant(4),
                Constant(5),
                Equal,
                Not,
                Pop,
                True,
                Not,
                False,
                Equal,
                Pop,
                Return
            ]
        );
    }

    #[test]
    fn test_globals() {
        let (chunk, heap) = compile_str("var a = \"hi\"; var b; a = b;").unwrap();
        assert_eq!(
            instructions(&chunk),
            vec![
                Constant(1),
                DefineGlobal(0),
                Nil,
                DefineGlobal(2),
                GetGlobal(4),
                SetGlobal(3),
                Pop,
                Return
            ]
        );
        let names: Vec<String> = chunk
            .constants()
            .iter()
            .map(|c| c.display(&heap).to_string())
            .collect();
        assert_eq!(names, vec!["a", "hi", "b", "a", "b"]);
        // Every mention of a name shares one interned string.
        assert_eq!(heap.len(), 3);
    }

    #[test]
    fn test_lines_follow_the_source() {
        let (chunk, _) = compile_str("print\n1\n+\n2;").unwrap();
        // The Add is written once its right operand is parsed, on the line of the `2`.
        assert_eq!(chunk.lines(), &[2, 2, 4, 4, 4, 4, 4]);
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert_eq!(
            messages("var a; var b; a + b = 1;"),
            vec!["[line 1] Error at '=': Invalid assignment target."]
        );
    }

    #[test]
    fn test_errors_in_separate_statements_are_all_reported() {
        assert_eq!(
            messages("print 1 +;\nprint (2;"),
            vec![
                "[line 1] Error at ';': Expect expression.",
                "[line 2] Error at ';': Expect ')' after expression.",
            ]
        );
    }

    #[test]
    fn test_one_error_per_statement() {
        // Everything after the first problem up to the `;` is skipped.
        assert_eq!(
            messages("var = = = ;"),
            vec!["[line 1] Error at '=': Expect variable name."]
        );
    }

    #[test]
    fn test_error_at_end() {
        assert_eq!(
            messages("print 1"),
            vec!["[line 1] Error at end: Expect ';' after value."]
        );
    }

    #[test]
    fn test_scanner_errors_become_compile_errors() {
        assert_eq!(
            messages("print @;\nprint \"oops;"),
            vec![
                "[line 1] Error: Unexpected character.",
                "[line 2] Error: Unterminated string.",
            ]
        );
    }

    #[test]
    fn test_too_many_constants() {
        let text: String = (0..257).map(|i| format!("{};", i)).collect();
        assert_eq!(
            messages(&text),
            vec!["[line 1] Error at '256': Too many constants in one chunk."]
        );

        let text: String = (0..256).map(|i| format!("{};", i)).collect();
        assert!(compile_str(&text).is_ok());
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let text = format!("print {}1{};", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(
            messages(&text),
            vec!["[line 1] Error at '(': Expression nesting too deep."]
        );

        let text = format!("print {}1;", "-".repeat(200_000));
        assert_eq!(
            messages(&text),
            vec!["[line 1] Error at '-': Expression nesting too deep."]
        );

        let text = format!("print {}1{};", "(".repeat(500), ")".repeat(500));
        assert!(compile_str(&text).is_ok());
    }
}
