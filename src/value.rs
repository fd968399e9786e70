use super::chunk::Chunk;
use super::vm::Vm;
use std::{cell::RefCell, fmt, rc::Rc};

/// FNV-1a, 32-bit. Every `ObjString` caches this so the intern set and the
/// globals table never rehash the bytes.
pub fn hash_str(chars: &str) -> u32 {
    let mut hash = 2166136261u32;
    for byte in chars.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// An immutable, canonical string. Instances are only created through the
/// heap's interner, so content-equal strings share one `Rc` and equality
/// collapses to pointer identity.
pub struct ObjString {
    chars: String,
    hash: u32,
}

impl ObjString {
    pub fn new(chars: String, hash: u32) -> Self {
        Self { chars, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.chars
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }
}

impl fmt::Display for ObjString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chars)
    }
}

impl fmt::Debug for ObjString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chars)
    }
}

pub struct Function {
    name: Option<Rc<ObjString>>,
    chunk: Chunk,
    arity: u8,
    upvalue_count: usize,
}

impl Function {
    pub fn new(
        name: Option<Rc<ObjString>>,
        chunk: Chunk,
        arity: u8,
        upvalue_count: usize,
    ) -> Self {
        Self {
            name,
            chunk,
            arity,
            upvalue_count,
        }
    }

    pub fn name(&self) -> Option<&Rc<ObjString>> {
        self.name.as_ref()
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn arity(&self) -> u8 {
        self.arity
    }

    pub fn upvalue_count(&self) -> usize {
        self.upvalue_count
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "<fn {}>", name),
            None => write!(f, "<script>"),
        }
    }
}

/// Bridges a captured variable from stack-resident to heap-resident. While
/// the declaring frame is live the cell redirects to its stack slot; once
/// that frame returns the value moves into the cell itself.
#[derive(Clone)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

impl Upvalue {
    pub fn close(&mut self, value: Value) {
        *self = Upvalue::Closed(value);
    }
}

pub struct Closure {
    function: Rc<Function>,
    upvalues: Vec<Rc<RefCell<Upvalue>>>,
}

impl Closure {
    pub fn new(function: Rc<Function>, upvalues: Vec<Rc<RefCell<Upvalue>>>) -> Self {
        Self { function, upvalues }
    }

    pub fn function(&self) -> &Rc<Function> {
        &self.function
    }

    pub fn upvalue(&self, idx: usize) -> Rc<RefCell<Upvalue>> {
        Rc::clone(&self.upvalues[idx])
    }
}

pub type NativeFn = fn(&mut Vm, &[Value]) -> Value;

#[derive(Clone)]
pub enum Obj {
    String(Rc<ObjString>),
    Function(Rc<Function>),
    Native(NativeFn),
    Closure(Rc<Closure>),
    Upvalue(Rc<RefCell<Upvalue>>),
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::String(string) => write!(f, "{}", string),
            Obj::Function(function) => write!(f, "{}", function),
            Obj::Native(_) => write!(f, "<native fn>"),
            Obj::Closure(closure) => write!(f, "{}", closure.function()),
            Obj::Upvalue(_) => write!(f, "upvalue"),
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Obj::String(a), Obj::String(b)) => Rc::ptr_eq(a, b),
            (Obj::Function(a), Obj::Function(b)) => Rc::ptr_eq(a, b),
            (Obj::Native(a), Obj::Native(b)) => *a == *b,
            (Obj::Closure(a), Obj::Closure(b)) => Rc::ptr_eq(a, b),
            (Obj::Upvalue(a), Obj::Upvalue(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Obj(Obj),
}

impl Value {
    pub fn new_string(string: Rc<ObjString>) -> Self {
        Value::Obj(Obj::String(string))
    }

    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::Obj(Obj::String(_)))
    }

    pub fn as_string(&self) -> Rc<ObjString> {
        match self {
            Value::Obj(Obj::String(string)) => Rc::clone(string),
            _ => unreachable!(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Obj(obj) => write!(f, "{}", obj),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(chars: &str) -> Rc<ObjString> {
        Rc::new(ObjString::new(chars.to_string(), hash_str(chars)))
    }

    #[test]
    fn truthiness() {
        assert!(Value::Nil.is_falsey());
        assert!(Value::Bool(false).is_falsey());
        assert!(!Value::Bool(true).is_falsey());
        assert!(!Value::Number(0.0).is_falsey());
        assert!(!Value::new_string(string("")).is_falsey());
    }

    #[test]
    fn equality_by_variant() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_eq!(Value::Bool(true), Value::Bool(true));
        assert_ne!(Value::Bool(true), Value::Bool(false));
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_ne!(Value::Number(0.0), Value::Bool(false));
    }

    #[test]
    fn strings_compare_by_identity() {
        let a = string("lox");
        assert_eq!(
            Value::new_string(Rc::clone(&a)),
            Value::new_string(Rc::clone(&a))
        );
        // same content, different cell: only the interner makes these equal
        assert_ne!(Value::new_string(a), Value::new_string(string("lox")));
    }

    #[test]
    fn printing() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::new_string(string("hi")).to_string(), "hi");

        let script = Function::new(None, Chunk::new(), 0, 0);
        assert_eq!(script.to_string(), "<script>");
        let named = Function::new(Some(string("make")), Chunk::new(), 1, 0);
        assert_eq!(Value::Obj(Obj::Function(Rc::new(named))).to_string(), "<fn make>");
    }

    #[test]
    fn fnv1a_reference_values() {
        // reference vectors for 32-bit FNV-1a
        assert_eq!(hash_str(""), 2166136261);
        assert_eq!(hash_str("a"), 0xe40c292c);
        assert_eq!(hash_str("foobar"), 0xbf9cf968);
    }
}
