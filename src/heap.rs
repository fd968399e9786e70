use super::table::Table;
use super::value::{hash_str, Closure, Function, Obj, ObjString, Upvalue, Value};
use std::{cell::RefCell, rc::Rc};

/// Owns every runtime allocation. Objects are registered here at creation,
/// which keeps intermediate garbage alive for the whole run; `free_objects`
/// is the single point of reclamation at VM teardown. No collection happens
/// during execution.
pub struct Heap {
    objects: Vec<Obj>,
    strings: Table,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            strings: Table::new(),
        }
    }

    /// Interns `chars`, copying them only when no canonical entry exists.
    pub fn copy_string(&mut self, chars: &str) -> Rc<ObjString> {
        let hash = hash_str(chars);
        match self.strings.find_string(chars, hash) {
            Some(interned) => interned,
            None => self.intern(ObjString::new(chars.to_string(), hash)),
        }
    }

    /// Interns an owned buffer. When the content is already canonical the
    /// buffer is simply dropped.
    pub fn take_string(&mut self, chars: String) -> Rc<ObjString> {
        let hash = hash_str(&chars);
        match self.strings.find_string(&chars, hash) {
            Some(interned) => interned,
            None => self.intern(ObjString::new(chars, hash)),
        }
    }

    fn intern(&mut self, string: ObjString) -> Rc<ObjString> {
        let string = Rc::new(string);
        self.strings.set(Rc::clone(&string), Value::Nil);
        self.objects.push(Obj::String(Rc::clone(&string)));
        string
    }

    pub fn alloc_function(&mut self, function: Function) -> Rc<Function> {
        let function = Rc::new(function);
        self.objects.push(Obj::Function(Rc::clone(&function)));
        function
    }

    pub fn alloc_closure(&mut self, closure: Closure) -> Rc<Closure> {
        let closure = Rc::new(closure);
        self.objects.push(Obj::Closure(Rc::clone(&closure)));
        closure
    }

    pub fn alloc_upvalue(&mut self, slot: usize) -> Rc<RefCell<Upvalue>> {
        let upvalue = Rc::new(RefCell::new(Upvalue::Open(slot)));
        self.objects.push(Obj::Upvalue(Rc::clone(&upvalue)));
        upvalue
    }

    /// Bulk teardown: drop the registry and the intern set. The `Rc`
    /// handles release each object's storage once the last user is gone.
    pub fn free_objects(&mut self) {
        self.objects.clear();
        self.strings = Table::new();
    }
}
