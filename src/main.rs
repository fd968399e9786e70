use loxide::{InterpretError, Vm};
use rustyline::Editor;
use std::{env, fs, io, process};

fn main() {
    let mut args = env::args().skip(1);
    match (args.next(), args.next()) {
        (None, _) => repl(),
        (Some(path), None) => run_file(&path),
        _ => {
            eprintln!("Usage: loxide [path]");
            process::exit(exitcode::USAGE);
        }
    }
}

fn repl() {
    let mut vm = Vm::new();
    let mut rl = Editor::<()>::new();
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                rl.add_history_entry(&line);
                match vm.interpret(&line, &mut io::stdout()) {
                    Err(InterpretError::Runtime(err)) => eprint!("{}", err),
                    _ => {}
                }
            }
            Err(_) => break,
        }
    }
}

fn run_file(path: &str) {
    let source = fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("Could not read \"{}\": {}", path, err);
        process::exit(exitcode::IOERR);
    });

    let mut vm = Vm::new();
    match vm.interpret(&source, &mut io::stdout()) {
        Ok(()) => {}
        Err(InterpretError::Compile) => process::exit(exitcode::DATAERR),
        Err(InterpretError::Runtime(err)) => {
            eprint!("{}", err);
            process::exit(exitcode::SOFTWARE);
        }
    }
}
