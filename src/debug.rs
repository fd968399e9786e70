use super::chunk::{Chunk, OpCode};
use super::value::{Obj, Value};
use std::convert::TryFrom;

/// Renders one instruction as `OFFSET LINE MNEMONIC OPERAND` and returns it
/// with the offset of the next instruction. Pure; callers decide where the
/// text goes.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut buffer = format!("{:04} ", offset);
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        buffer += "   | ";
    } else {
        buffer += format!("{:>4} ", chunk.line(offset)).as_str();
    }

    let op = match OpCode::try_from(chunk.code()[offset]) {
        Ok(op) => op,
        Err(()) => {
            buffer += format!("Unknown opcode {}\n", chunk.code()[offset]).as_str();
            return (buffer, offset + 1);
        }
    };

    let next = match op {
        OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal => {
            let idx = chunk.code()[offset + 1] as usize;
            buffer += format!("{:<16} {:4} '{}'\n", mnemonic(op), idx, chunk.constant(idx))
                .as_str();
            offset + 2
        }
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call => {
            buffer += format!("{:<16} {:4}\n", mnemonic(op), chunk.code()[offset + 1]).as_str();
            offset + 2
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
            let operand =
                ((chunk.code()[offset + 1] as usize) << 8) | chunk.code()[offset + 2] as usize;
            let target = if op == OpCode::Loop {
                offset + 3 - operand
            } else {
                offset + 3 + operand
            };
            buffer += format!("{:<16} {:4} -> {}\n", mnemonic(op), offset, target).as_str();
            offset + 3
        }
        OpCode::Closure => {
            let idx = chunk.code()[offset + 1] as usize;
            buffer += format!("{:<16} {:4} {}\n", mnemonic(op), idx, chunk.constant(idx))
                .as_str();
            let upvalue_count = match chunk.constant(idx) {
                Value::Obj(Obj::Function(function)) => function.upvalue_count(),
                _ => 0,
            };
            let mut operand = offset + 2;
            for _ in 0..upvalue_count {
                let is_local = chunk.code()[operand] != 0;
                let index = chunk.code()[operand + 1];
                buffer += format!(
                    "{:04}    |                     {} {}\n",
                    operand,
                    if is_local { "local" } else { "upvalue" },
                    index
                )
                .as_str();
                operand += 2;
            }
            operand
        }
        _ => {
            buffer += format!("{}\n", mnemonic(op)).as_str();
            offset + 1
        }
    };

    (buffer, next)
}

pub fn disassemble(chunk: &Chunk, name: &str) -> String {
    let mut buffer = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.len() {
        let (instr, next) = disassemble_instruction(chunk, offset);
        buffer += &instr;
        offset = next;
    }
    buffer
}

fn mnemonic(op: OpCode) -> &'static str {
    match op {
        OpCode::Constant => "OP_CONSTANT",
        OpCode::Nil => "OP_NIL",
        OpCode::True => "OP_TRUE",
        OpCode::False => "OP_FALSE",
        OpCode::Pop => "OP_POP",
        OpCode::GetLocal => "OP_GET_LOCAL",
        OpCode::SetLocal => "OP_SET_LOCAL",
        OpCode::GetGlobal => "OP_GET_GLOBAL",
        OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
        OpCode::SetGlobal => "OP_SET_GLOBAL",
        OpCode::GetUpvalue => "OP_GET_UPVALUE",
        OpCode::SetUpvalue => "OP_SET_UPVALUE",
        OpCode::Equal => "OP_EQUAL",
        OpCode::Greater => "OP_GREATER",
        OpCode::Less => "OP_LESS",
        OpCode::Add => "OP_ADD",
        OpCode::Subtract => "OP_SUBTRACT",
        OpCode::Multiply => "OP_MULTIPLY",
        OpCode::Divide => "OP_DIVIDE",
        OpCode::Not => "OP_NOT",
        OpCode::Negate => "OP_NEGATE",
        OpCode::Print => "OP_PRINT",
        OpCode::Jump => "OP_JUMP",
        OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
        OpCode::Loop => "OP_LOOP",
        OpCode::Call => "OP_CALL",
        OpCode::Closure => "OP_CLOSURE",
        OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
        OpCode::Return => "OP_RETURN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_and_operand_instructions_advance_correctly() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Number(1.2)).unwrap();
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(idx, 1);
        chunk.write_op(OpCode::Return, 1);

        let (text, next) = disassemble_instruction(&chunk, 0);
        assert!(text.contains("OP_CONSTANT"));
        assert!(text.contains("1.2"));
        assert_eq!(next, 2);

        let (text, next) = disassemble_instruction(&chunk, 2);
        assert!(text.contains("OP_RETURN"));
        assert_eq!(next, 3);
    }

    #[test]
    fn jump_targets_are_resolved() {
        let mut chunk = Chunk::new();
        let offset = chunk.emit_jump(OpCode::JumpIfFalse, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.patch_jump(offset).unwrap();

        let (text, next) = disassemble_instruction(&chunk, 0);
        assert!(text.contains("OP_JUMP_IF_FALSE"));
        assert!(text.contains("-> 4"));
        assert_eq!(next, 3);
    }

    #[test]
    fn repeated_lines_collapse_to_a_bar() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 7);
        chunk.write_op(OpCode::Pop, 7);
        let (first, _) = disassemble_instruction(&chunk, 0);
        let (second, _) = disassemble_instruction(&chunk, 1);
        assert!(first.contains("   7 "));
        assert!(second.contains("   | "));
    }

    #[test]
    fn whole_chunk_listing_has_a_header() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 1);
        chunk.write_op(OpCode::Return, 1);
        let listing = disassemble(&chunk, "script");
        assert!(listing.starts_with("== script ==\n"));
        assert_eq!(listing.lines().count(), 3);
    }
}
