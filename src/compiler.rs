use super::chunk::{Chunk, OpCode};
use super::heap::Heap;
use super::token::{Token, TokenType};
use super::tokenizer::Tokenizer;
use super::value::{Function, Obj, ObjString, Value};
use std::rc::Rc;

/// Compiles a source string into a top-level script function (arity 0,
/// no name), or `Err` after reporting every error found. The emitted
/// bytecode is balanced: every path ends in a return, every constant
/// referenced is declared, and closure operands match the function's
/// recorded upvalue count.
pub fn compile(source: &str, heap: &mut Heap) -> Result<Function, ()> {
    let mut compiler = Compiler::new(source, heap);
    compiler.advance();
    while !compiler.matches(TokenType::Eof) {
        compiler.declaration();
    }
    compiler.end()
}

#[derive(Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
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

impl Precedence {
    fn next(self) -> Self {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary => Self::Call,
            Self::Call => Self::Primary,
            Self::Primary => Self::Primary,
        }
    }
}

type ParseFn<'a, 'h> = fn(&mut Compiler<'a, 'h>, bool);

struct ParseRule<'a, 'h> {
    prefix: Option<ParseFn<'a, 'h>>,
    infix: Option<ParseFn<'a, 'h>>,
    precedence: Precedence,
}

fn rule<'a, 'h>(typ: TokenType) -> ParseRule<'a, 'h> {
    use TokenType::*;

    macro_rules! entry {
        ($prefix:expr, $infix:expr, $precedence:ident) => {
            ParseRule {
                prefix: $prefix,
                infix: $infix,
                precedence: Precedence::$precedence,
            }
        };
    }

    match typ {
        LeftParen => entry!(Some(Compiler::grouping), Some(Compiler::call), Call),
        Minus => entry!(Some(Compiler::unary), Some(Compiler::binary), Term),
        Plus => entry!(None, Some(Compiler::binary), Term),
        Slash | Star => entry!(None, Some(Compiler::binary), Factor),
        Bang => entry!(Some(Compiler::unary), None, None),
        BangEqual | EqualEqual => entry!(None, Some(Compiler::binary), Equality),
        Greater | GreaterEqual | Less | LessEqual => {
            entry!(None, Some(Compiler::binary), Comparison)
        }
        Identifier => entry!(Some(Compiler::variable), None, None),
        String => entry!(Some(Compiler::string), None, None),
        Number => entry!(Some(Compiler::number), None, None),
        And => entry!(None, Some(Compiler::and_), And),
        Or => entry!(None, Some(Compiler::or_), Or),
        False | Nil | True => entry!(Some(Compiler::literal), None, None),
        _ => entry!(None, None, None),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FunctionKind {
    Script,
    Function,
}

struct Local<'a> {
    name: &'a str,
    // None until the initializer has run, so `var a = a;` is caught
    depth: Option<u32>,
    is_captured: bool,
}

#[derive(Clone, Copy, PartialEq)]
struct UpvalueRef {
    index: u8,
    is_local: bool,
}

/// Per-function emission state. Nested function declarations push one of
/// these; `states[0]` is the script.
struct FuncState<'a> {
    kind: FunctionKind,
    name: Option<Rc<ObjString>>,
    arity: u8,
    chunk: Chunk,
    locals: Vec<Local<'a>>,
    upvalues: Vec<UpvalueRef>,
    scope_depth: u32,
}

impl<'a> FuncState<'a> {
    fn new(kind: FunctionKind, name: Option<Rc<ObjString>>) -> Self {
        Self {
            kind,
            name,
            arity: 0,
            chunk: Chunk::new(),
            // slot 0 belongs to the callee value itself
            locals: vec![Local {
                name: "",
                depth: Some(0),
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

struct Compiler<'a, 'h> {
    tokenizer: Tokenizer<'a>,
    current: Token<'a>,
    previous: Token<'a>,
    had_error: bool,
    panic_mode: bool,
    states: Vec<FuncState<'a>>,
    heap: &'h mut Heap,
}

impl<'a, 'h> Compiler<'a, 'h> {
    fn new(source: &'a str, heap: &'h mut Heap) -> Self {
        Self {
            tokenizer: Tokenizer::new(source),
            current: Token::empty(),
            previous: Token::empty(),
            had_error: false,
            panic_mode: false,
            states: vec![FuncState::new(FunctionKind::Script, None)],
            heap,
        }
    }

    //>> Error reporting
    fn error_at(&mut self, token: Token<'a>, msg: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        eprint!("[line {}] Error", token.line);
        match token.typ {
            TokenType::Eof => eprint!(" at end"),
            TokenType::Unknown | TokenType::UntermedString => {}
            _ => eprint!(" at '{}'", token.lexeme),
        }
        eprintln!(": {}", msg);
    }

    fn error(&mut self, msg: &str) {
        self.error_at(self.previous, msg);
    }

    fn error_at_current(&mut self, msg: &str) {
        self.error_at(self.current, msg);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.typ != TokenType::Eof {
            if self.previous.typ == TokenType::Semicolon {
                return;
            }
            match self.current.typ {
                TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => self.advance(),
            }
        }
    }
    //<<

    //>> Token pump
    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.tokenizer.next_token();
            match self.current.typ {
                TokenType::Unknown => self.error_at_current("Unexpected character."),
                TokenType::UntermedString => self.error_at_current("Unterminated string."),
                _ => break,
            }
        }
    }

    fn consume(&mut self, typ: TokenType, msg: &str) {
        if self.current.typ == typ {
            self.advance();
        } else {
            self.error_at_current(msg);
        }
    }

    fn check(&self, typ: TokenType) -> bool {
        self.current.typ == typ
    }

    fn matches(&mut self, typ: TokenType) -> bool {
        if self.check(typ) {
            self.advance();
            true
        } else {
            false
        }
    }
    //<<

    //>> Emission
    fn state(&mut self) -> &mut FuncState<'a> {
        self.states.last_mut().unwrap()
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.state().chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.state().chunk.write_op(op, line);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.state().chunk.add_constant(value) {
            Some(idx) => idx,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_op(OpCode::Constant);
        self.emit_byte(idx);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        let line = self.previous.line;
        self.state().chunk.emit_jump(op, line)
    }

    fn patch_jump(&mut self, offset: usize) {
        if self.state().chunk.patch_jump(offset).is_err() {
            self.error("Too much code to jump over.");
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line;
        if self.state().chunk.emit_loop(loop_start, line).is_err() {
            self.error("Loop body too large.");
        }
    }
    //<<

    //>> Scopes and variables
    fn begin_scope(&mut self) {
        self.state().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state().scope_depth -= 1;
        loop {
            let state = self.states.last().unwrap();
            let discarded = match state.locals.last() {
                Some(local) if local.depth.unwrap_or(0) > state.scope_depth => {
                    Some(local.is_captured)
                }
                _ => None,
            };
            match discarded {
                Some(true) => self.emit_op(OpCode::CloseUpvalue),
                Some(false) => self.emit_op(OpCode::Pop),
                None => break,
            }
            self.state().locals.pop();
        }
    }

    fn identifier_constant(&mut self, name: Token<'a>) -> u8 {
        let string = self.heap.copy_string(name.lexeme);
        self.make_constant(Value::new_string(string))
    }

    fn add_local(&mut self, name: Token<'a>) {
        if self.state().locals.len() > u8::MAX as usize {
            self.error("Too many local variables in function.");
            return;
        }
        self.state().locals.push(Local {
            name: name.lexeme,
            depth: None,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let name = self.previous;

        let state = self.states.last().unwrap();
        let mut shadowed = false;
        for local in state.locals.iter().rev() {
            if matches!(local.depth, Some(depth) if depth < state.scope_depth) {
                break;
            }
            if local.name == name.lexeme {
                shadowed = true;
                break;
            }
        }
        if shadowed {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, msg: &str) -> u8 {
        self.consume(TokenType::Identifier, msg);
        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous)
    }

    fn mark_initialized(&mut self) {
        let state = self.state();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        state.locals.last_mut().unwrap().depth = Some(depth);
    }

    fn define_variable(&mut self, global: u8) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op(OpCode::DefineGlobal);
        self.emit_byte(global);
    }

    fn resolve_local(&mut self, state_idx: usize, name: &str) -> Option<u8> {
        let mut uninitialized = false;
        let mut found = None;
        for (idx, local) in self.states[state_idx].locals.iter().enumerate().rev() {
            if local.name == name {
                uninitialized = local.depth.is_none();
                found = Some(idx as u8);
                break;
            }
        }
        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        found
    }

    fn add_upvalue(&mut self, state_idx: usize, index: u8, is_local: bool) -> u8 {
        let upvalue = UpvalueRef { index, is_local };
        let state = &mut self.states[state_idx];
        if let Some(existing) = state.upvalues.iter().position(|u| *u == upvalue) {
            return existing as u8;
        }
        if state.upvalues.len() > u8::MAX as usize {
            self.error("Too many closure variables in function.");
            return 0;
        }
        state.upvalues.push(upvalue);
        (state.upvalues.len() - 1) as u8
    }

    fn resolve_upvalue(&mut self, state_idx: usize, name: &str) -> Option<u8> {
        if state_idx == 0 {
            return None;
        }
        if let Some(local) = self.resolve_local(state_idx - 1, name) {
            self.states[state_idx - 1].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(state_idx, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(state_idx - 1, name) {
            return Some(self.add_upvalue(state_idx, upvalue, false));
        }
        None
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let state_idx = self.states.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(state_idx, name.lexeme)
        {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(idx) = self.resolve_upvalue(state_idx, name.lexeme) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, idx)
        } else {
            let constant = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };

        if can_assign && self.matches(TokenType::Equal) {
            self.expression();
            self.emit_op(set_op);
        } else {
            self.emit_op(get_op);
        }
        self.emit_byte(arg);
    }
    //<<

    //>> Expressions
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = match rule(self.previous.typ).prefix {
            Some(prefix) => prefix,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.typ).precedence {
            self.advance();
            let infix = rule(self.previous.typ).infix.unwrap();
            infix(self, can_assign);
        }

        if can_assign && self.matches(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn number(&mut self, _can_assign: bool) {
        let n: f64 = self.previous.lexeme.parse().unwrap();
        self.emit_constant(Value::Number(n));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        let string = self.heap.copy_string(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(Value::new_string(string));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.typ {
            TokenType::False => self.emit_op(OpCode::False),
            TokenType::Nil => self.emit_op(OpCode::Nil),
            TokenType::True => self.emit_op(OpCode::True),
            _ => unreachable!(),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let op = self.previous.typ;
        self.parse_precedence(Precedence::Unary);
        match op {
            TokenType::Minus => self.emit_op(OpCode::Negate),
            TokenType::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let op = self.previous.typ;
        self.parse_precedence(rule(op).precedence.next());
        match op {
            TokenType::Plus => self.emit_op(OpCode::Add),
            TokenType::Minus => self.emit_op(OpCode::Subtract),
            TokenType::Star => self.emit_op(OpCode::Multiply),
            TokenType::Slash => self.emit_op(OpCode::Divide),
            TokenType::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenType::EqualEqual => self.emit_op(OpCode::Equal),
            TokenType::Greater => self.emit_op(OpCode::Greater),
            TokenType::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenType::Less => self.emit_op(OpCode::Less),
            TokenType::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!(),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argc: u8 = 0;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if argc == u8::MAX {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    argc += 1;
                }
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        argc
    }

    fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_op(OpCode::Call);
        self.emit_byte(argc);
    }
    //<<

    //>> Declarations and statements
    fn declaration(&mut self) {
        if self.matches(TokenType::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenType::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.matches(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        );
        self.define_variable(global);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function();
        self.define_variable(global);
    }

    fn function(&mut self) {
        let name = self.heap.copy_string(self.previous.lexeme);
        self.states
            .push(FuncState::new(FunctionKind::Function, Some(name)));
        self.begin_scope();

        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                if self.state().arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.state().arity += 1;
                }
                let param = self.parse_variable("Expect parameter name.");
                self.define_variable(param);
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();

        // no end_scope: returning truncates the whole frame window
        self.emit_return();
        let state = self.states.pop().unwrap();
        let upvalues = state.upvalues;
        let function = Function::new(state.name, state.chunk, state.arity, upvalues.len());
        if cfg!(feature = "debug-bytecode") && !self.had_error {
            let name = function.to_string();
            print!("{}", crate::debug::disassemble(function.chunk(), &name));
        }
        let function = self.heap.alloc_function(function);
        let constant = self.make_constant(Value::Obj(Obj::Function(function)));
        self.emit_op(OpCode::Closure);
        self.emit_byte(constant);
        for upvalue in upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn statement(&mut self) {
        if self.matches(TokenType::Print) {
            self.print_statement();
        } else if self.matches(TokenType::For) {
            self.for_statement();
        } else if self.matches(TokenType::If) {
            self.if_statement();
        } else if self.matches(TokenType::Return) {
            self.return_statement();
        } else if self.matches(TokenType::While) {
            self.while_statement();
        } else if self.matches(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.matches(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.state().chunk.len();
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);
        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.matches(TokenType::Semicolon) {
            // no initializer
        } else if self.matches(TokenType::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.state().chunk.len();
        let mut exit_jump = None;
        if !self.matches(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(TokenType::RightParen) {
            // the increment runs after the body, so jump over it for now
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.state().chunk.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");
            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);
        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.state().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.matches(TokenType::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }
    //<<

    fn end(mut self) -> Result<Function, ()> {
        self.emit_return();
        let state = self.states.pop().unwrap();
        let function = Function::new(state.name, state.chunk, state.arity, state.upvalues.len());
        if self.had_error {
            Err(())
        } else {
            if cfg!(feature = "debug-bytecode") {
                print!("{}", crate::debug::disassemble(function.chunk(), "<script>"));
            }
            Ok(function)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    fn compile_str(source: &str) -> Result<Function, ()> {
        let mut heap = Heap::new();
        compile(source, &mut heap)
    }

    fn opcodes(function: &Function) -> Vec<OpCode> {
        let chunk = function.chunk();
        let mut offset = 0;
        let mut ops = Vec::new();
        while offset < chunk.len() {
            let op = OpCode::try_from(chunk.code()[offset]).unwrap();
            ops.push(op);
            let (_, next) = crate::debug::disassemble_instruction(chunk, offset);
            offset = next;
        }
        ops
    }

    #[test]
    fn script_function_shape() {
        let function = compile_str("print 1 + 2;").unwrap();
        assert_eq!(function.arity(), 0);
        assert!(function.name().is_none());
        assert_eq!(function.upvalue_count(), 0);
        assert_eq!(
            opcodes(&function),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Add,
                OpCode::Print,
                OpCode::Nil,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn globals_compile_to_named_constants() {
        let function = compile_str("var greeting = \"hi\"; print greeting;").unwrap();
        let ops = opcodes(&function);
        assert!(ops.contains(&OpCode::DefineGlobal));
        assert!(ops.contains(&OpCode::GetGlobal));
    }

    #[test]
    fn locals_use_slots_not_names() {
        let function = compile_str("{ var a = 1; print a; }").unwrap();
        let ops = opcodes(&function);
        assert!(ops.contains(&OpCode::GetLocal));
        assert!(!ops.contains(&OpCode::GetGlobal));
        // block exit pops the local
        assert!(ops.contains(&OpCode::Pop));
    }

    #[test]
    fn nested_function_captures_an_upvalue() {
        let function = compile_str(
            "fun outer() { var n = 0; fun inner() { n = n + 1; } inner(); }",
        )
        .unwrap();
        let outer = function
            .chunk()
            .constants()
            .iter()
            .find_map(|v| match v {
                Value::Obj(Obj::Function(f)) => Some(Rc::clone(f)),
                _ => None,
            })
            .unwrap();
        let inner = outer
            .chunk()
            .constants()
            .iter()
            .find_map(|v| match v {
                Value::Obj(Obj::Function(f)) => Some(Rc::clone(f)),
                _ => None,
            })
            .unwrap();
        assert_eq!(inner.upvalue_count(), 1);
        assert_eq!(outer.upvalue_count(), 0);
        assert!(opcodes(&inner).contains(&OpCode::SetUpvalue));
    }

    #[test]
    fn captured_block_local_is_closed_not_popped() {
        let function =
            compile_str("{ var n = 1; fun peek() { print n; } peek(); }").unwrap();
        let ops = opcodes(&function);
        assert!(ops.contains(&OpCode::CloseUpvalue));
    }

    #[test]
    fn rejects_bad_syntax() {
        assert!(compile_str("1 +;").is_err());
        assert!(compile_str("var 1 = 2;").is_err());
        assert!(compile_str("print 1").is_err());
        assert!(compile_str("(1 + 2;").is_err());
        assert!(compile_str("\"unterminated").is_err());
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(compile_str("1 + 2 = 3;").is_err());
        assert!(compile_str("var a; var b; a + b = 1;").is_err());
    }

    #[test]
    fn rejects_local_shadowing_in_same_scope() {
        assert!(compile_str("{ var a = 1; var a = 2; }").is_err());
        assert!(compile_str("{ var a = 1; { var a = 2; } }").is_ok());
    }

    #[test]
    fn rejects_reading_local_in_its_own_initializer() {
        assert!(compile_str("{ var a = a; }").is_err());
    }

    #[test]
    fn rejects_top_level_return() {
        assert!(compile_str("return 1;").is_err());
        assert!(compile_str("fun f() { return 1; } f();").is_ok());
    }
}
