use super::chunk::OpCode;
use super::compiler;
use super::heap::Heap;
use super::natives;
use super::table::Table;
use super::value::{Closure, Obj, ObjString, Upvalue, Value};
use std::cell::RefCell;
use std::convert::TryFrom;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::time::Instant;

pub const FRAMES_MAX: usize = 64;
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// One activation: the running closure, its instruction pointer, and the
/// base of its stack window. Slot 0 of the window is the callee itself,
/// slots 1..=arity the arguments.
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    slots: usize,
}

#[derive(Debug)]
pub enum InterpretError {
    Compile,
    Runtime(RuntimeError),
}

#[derive(Debug)]
struct TraceFrame {
    line: u32,
    name: Option<Rc<ObjString>>,
}

/// A fatal error raised by the dispatcher: the message plus one trace entry
/// per live frame, innermost first.
#[derive(Debug)]
pub struct RuntimeError {
    message: String,
    trace: Vec<TraceFrame>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for frame in &self.trace {
            match &frame.name {
                Some(name) => writeln!(f, "[line {}] in {}()", frame.line, name)?,
                None => writeln!(f, "[line {}] in script", frame.line)?,
            }
        }
        Ok(())
    }
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    globals: Table,
    // open cells sorted by stack slot; the tail is the innermost capture
    open_upvalues: Vec<Rc<RefCell<Upvalue>>>,
    heap: Heap,
    started_at: Instant,
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            heap: Heap::new(),
            started_at: Instant::now(),
        };

        for (name, native) in natives::NATIVES {
            let name = vm.heap.copy_string(name);
            vm.globals.set(name, Value::Obj(Obj::Native(native)));
        }

        vm
    }

    /// Compiles and runs `source`, writing PRINT output to `out`. A runtime
    /// error resets the stack and frame state (the heap keeps every object
    /// until the VM itself goes away), so the VM stays usable afterwards.
    pub fn interpret(
        &mut self,
        source: &str,
        out: &mut dyn Write,
    ) -> Result<(), InterpretError> {
        let function = match compiler::compile(source, &mut self.heap) {
            Ok(function) => self.heap.alloc_function(function),
            Err(()) => return Err(InterpretError::Compile),
        };

        self.push(Value::Obj(Obj::Function(Rc::clone(&function))));
        let closure = self.heap.alloc_closure(Closure::new(function, Vec::new()));
        self.pop();
        self.push(Value::Obj(Obj::Closure(Rc::clone(&closure))));

        self.call(closure, 0)
            .and_then(|()| self.run(out))
            .map_err(|err| {
                self.reset_stack();
                InterpretError::Runtime(err)
            })
    }

    pub fn uptime(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    pub(crate) fn intern(&mut self, chars: String) -> Rc<ObjString> {
        self.heap.take_string(chars)
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn runtime_error(&self, message: &str) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = frame.closure.function();
                TraceFrame {
                    // ip already advanced past the failing instruction
                    line: function.chunk().line(frame.ip - 1),
                    name: function.name().cloned(),
                }
            })
            .collect();
        RuntimeError {
            message: message.to_string(),
            trace,
        }
    }

    //>> Stack manipulation
    fn push(&mut self, value: Value) {
        debug_assert!(self.stack.len() < STACK_MAX);
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap()
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }
    //<<

    //>> Instruction stream of the running frame
    fn frame(&self) -> &Frame {
        self.frames.last().unwrap()
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap()
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().unwrap();
        let byte = frame.closure.function().chunk().code()[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let idx = self.read_byte() as usize;
        self.frame().closure.function().chunk().constant(idx).clone()
    }

    fn read_string(&mut self) -> Rc<ObjString> {
        match self.read_constant() {
            Value::Obj(Obj::String(string)) => string,
            _ => unreachable!(),
        }
    }
    //<<

    //>> Calls
    fn call(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), RuntimeError> {
        let arity = closure.function().arity() as usize;
        if argc != arity {
            return Err(self.runtime_error(&format!(
                "Expected {} arguments but got {}.",
                arity, argc
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        let slots = self.stack.len() - argc - 1;
        self.frames.push(Frame {
            closure,
            ip: 0,
            slots,
        });
        Ok(())
    }

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), RuntimeError> {
        match callee {
            Value::Obj(Obj::Closure(closure)) => self.call(closure, argc),
            Value::Obj(Obj::Native(native)) => {
                let first_arg = self.stack.len() - argc;
                let args = self.stack[first_arg..].to_vec();
                let result = native(self, &args);
                self.stack.truncate(first_arg - 1);
                self.push(result);
                Ok(())
            }
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }
    //<<

    //>> Upvalues
    fn capture_upvalue(&mut self, slot: usize) -> Rc<RefCell<Upvalue>> {
        let mut insert_at = 0;
        for (i, upvalue) in self.open_upvalues.iter().enumerate().rev() {
            let open_slot = match *upvalue.borrow() {
                Upvalue::Open(open_slot) => open_slot,
                Upvalue::Closed(_) => unreachable!(),
            };
            if open_slot == slot {
                return Rc::clone(upvalue);
            }
            if open_slot < slot {
                insert_at = i + 1;
                break;
            }
        }
        let created = self.heap.alloc_upvalue(slot);
        self.open_upvalues.insert(insert_at, Rc::clone(&created));
        created
    }

    /// Closes every open upvalue at or above `boundary`, moving the stack
    /// value into the cell itself.
    fn close_upvalues(&mut self, boundary: usize) {
        while let Some(upvalue) = self.open_upvalues.last() {
            let slot = match *upvalue.borrow() {
                Upvalue::Open(slot) => slot,
                Upvalue::Closed(_) => unreachable!(),
            };
            if slot < boundary {
                break;
            }
            let upvalue = self.open_upvalues.pop().unwrap();
            let value = self.stack[slot].clone();
            upvalue.borrow_mut().close(value);
        }
    }
    //<<

    fn run(&mut self, out: &mut dyn Write) -> Result<(), RuntimeError> {
        macro_rules! binary_op {
            ($value:path, $op:tt) => {{
                if !self.peek(0).is_number() || !self.peek(1).is_number() {
                    return Err(self.runtime_error("Operands must be numbers."));
                }
                let b = match self.pop() {
                    Value::Number(n) => n,
                    _ => unreachable!(),
                };
                let a = match self.pop() {
                    Value::Number(n) => n,
                    _ => unreachable!(),
                };
                self.push($value(a $op b));
            }};
        }

        loop {
            if cfg!(feature = "debug-execution") {
                let mut trace = String::from("          ");
                for value in &self.stack {
                    trace += &format!("[ {} ]", value);
                }
                println!("{}", trace);
                let frame = self.frame();
                let (text, _) = super::debug::disassemble_instruction(
                    frame.closure.function().chunk(),
                    frame.ip,
                );
                print!("{}", text);
            }

            let op = OpCode::try_from(self.read_byte()).unwrap();
            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.frame().slots + self.read_byte() as usize;
                    self.push(self.stack[slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = self.frame().slots + self.read_byte() as usize;
                    self.stack[slot] = self.peek(0).clone();
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value);
                        }
                        None => {
                            return Err(self.runtime_error(&format!(
                                "Undefined variable '{}'.",
                                name
                            )));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0).clone();
                    self.globals.set(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0).clone();
                    // assignment never creates a global: undo the probe's
                    // insert before reporting
                    if self.globals.set(Rc::clone(&name), value) {
                        self.globals.delete(&name);
                        return Err(self.runtime_error(&format!(
                            "Undefined variable '{}'.",
                            name
                        )));
                    }
                }
                OpCode::GetUpvalue => {
                    let idx = self.read_byte() as usize;
                    let upvalue = self.frame().closure.upvalue(idx);
                    let value = match &*upvalue.borrow() {
                        Upvalue::Open(slot) => self.stack[*slot].clone(),
                        Upvalue::Closed(value) => value.clone(),
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let idx = self.read_byte() as usize;
                    let upvalue = self.frame().closure.upvalue(idx);
                    let value = self.peek(0).clone();
                    let slot = match &*upvalue.borrow() {
                        Upvalue::Open(slot) => Some(*slot),
                        Upvalue::Closed(_) => None,
                    };
                    match slot {
                        Some(slot) => self.stack[slot] = value,
                        None => *upvalue.borrow_mut() = Upvalue::Closed(value),
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => binary_op!(Value::Bool, >),
                OpCode::Less => binary_op!(Value::Bool, <),
                OpCode::Add => {
                    if self.peek(0).is_string() && self.peek(1).is_string() {
                        let b = self.pop().as_string();
                        let a = self.pop().as_string();
                        let mut chars = String::with_capacity(a.len() + b.len());
                        chars.push_str(a.as_str());
                        chars.push_str(b.as_str());
                        let result = self.heap.take_string(chars);
                        self.push(Value::new_string(result));
                    } else if self.peek(0).is_number() && self.peek(1).is_number() {
                        binary_op!(Value::Number, +);
                    } else {
                        return Err(self.runtime_error(
                            "Operands must be two numbers or two strings.",
                        ));
                    }
                }
                OpCode::Subtract => binary_op!(Value::Number, -),
                OpCode::Multiply => binary_op!(Value::Number, *),
                OpCode::Divide => binary_op!(Value::Number, /),
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    if !self.peek(0).is_number() {
                        return Err(self.runtime_error("Operand must be a number."));
                    }
                    match self.pop() {
                        Value::Number(n) => self.push(Value::Number(-n)),
                        _ => unreachable!(),
                    }
                }
                OpCode::Print => {
                    let value = self.pop();
                    let _ = writeln!(out, "{}", value);
                }
                OpCode::Jump => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip -= offset;
                }
                OpCode::Call => {
                    let argc = self.read_byte() as usize;
                    let callee = self.peek(argc).clone();
                    self.call_value(callee, argc)?;
                }
                OpCode::Closure => {
                    let function = match self.read_constant() {
                        Value::Obj(Obj::Function(function)) => function,
                        _ => unreachable!(),
                    };
                    let mut upvalues = Vec::with_capacity(function.upvalue_count());
                    for _ in 0..function.upvalue_count() {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        if is_local {
                            let slot = self.frame().slots + index;
                            upvalues.push(self.capture_upvalue(slot));
                        } else {
                            upvalues.push(self.frame().closure.upvalue(index));
                        }
                    }
                    let closure = self.heap.alloc_closure(Closure::new(function, upvalues));
                    self.push(Value::Obj(Obj::Closure(closure)));
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    self.close_upvalues(frame.slots);
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots);
                    self.push(result);
                }
            }
        }
    }
}
