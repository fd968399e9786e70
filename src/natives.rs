use super::value::{NativeFn, Obj, Value};
use super::vm::Vm;
use rand::Rng;

/// Host functions installed as globals when a VM is created. Natives are
/// infallible: bad arguments produce `nil`, never a runtime error.
pub const NATIVES: [(&str, NativeFn); 4] = [
    ("clock", clock),
    ("random", random),
    ("str", as_string),
    ("number", parse_number),
];

fn clock(vm: &mut Vm, _args: &[Value]) -> Value {
    Value::Number(vm.uptime())
}

fn random(_vm: &mut Vm, _args: &[Value]) -> Value {
    Value::Number(rand::thread_rng().gen::<f64>())
}

fn as_string(vm: &mut Vm, args: &[Value]) -> Value {
    match args.first() {
        Some(value) => Value::new_string(vm.intern(value.to_string())),
        None => Value::Nil,
    }
}

fn parse_number(_vm: &mut Vm, args: &[Value]) -> Value {
    match args.first() {
        Some(Value::Number(n)) => Value::Number(*n),
        Some(Value::Obj(Obj::String(string))) => string
            .as_str()
            .trim()
            .parse()
            .map(Value::Number)
            .unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}
