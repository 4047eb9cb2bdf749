//! mqjs REPL
//!
//! Interactive JavaScript shell and script runner built on the embedding
//! API. Arguments starting with `--` are engine flags, see
//! [`set_flags_from_string`]. Logging is controlled by `MQJS_LOG`.

use mqjs_bridge::{ContextScope, Engine, FunctionTemplate, PropertyAttribute, ScriptOrigin, set_flags_from_string};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("MQJS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let (flags, files): (Vec<String>, Vec<String>) = std::env::args().skip(1).partition(|arg| arg.starts_with("--"));
    if !flags.is_empty() {
        set_flags_from_string(&flags.join(" "));
    }

    let engine = Engine::new();
    let console_log = engine.new_function_template(|info| {
        let line: Vec<String> = info.args().iter().map(|arg| arg.to_string()).collect();
        println!("{}", line.join(" "));
    });
    let context = engine.new_context(None);

    let ok = context.scope(|scope| {
        install_console(scope, &console_log);
        match files.first() {
            // Run a script file
            Some(filename) => run_file(scope, filename),
            // Interactive REPL
            None => run_repl(scope),
        }
    });
    if !ok {
        std::process::exit(1);
    }
}

/// Global `console.log` and `print`
fn install_console(scope: &ContextScope, log: &FunctionTemplate) {
    let Some(log) = log.new_function(scope) else {
        return;
    };
    let global = scope.global();
    let console = scope.new_object();
    console.set_property("log", &log, PropertyAttribute::DONT_ENUM);
    global.set_property("console", &console, PropertyAttribute::DONT_ENUM);
    global.set_property("print", &log, PropertyAttribute::DONT_ENUM);
}

/// Evaluate `code`, printing the result unless it is `undefined`
fn eval(scope: &ContextScope, code: &str, origin: &ScriptOrigin) -> bool {
    let mut result = None;
    let error = scope.try_catch(true, |scope| {
        if let Some(script) = scope.compile(code, Some(origin), None) {
            result = scope.run(&script);
        }
    });
    if !error.is_empty() {
        eprint!("{}", error);
        if !error.ends_with('\n') {
            eprintln!();
        }
        return false;
    }
    if let Some(result) = result.filter(|result| !result.is_undefined()) {
        println!("{}", result);
    }
    true
}

fn run_file(scope: &ContextScope, filename: &str) -> bool {
    let source = match std::fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", filename, e);
            return false;
        }
    };
    eval(scope, &source, &ScriptOrigin::new(filename, 0, 0))
}

fn run_repl(scope: &ContextScope) -> bool {
    println!("mqjs {}", mqjs_bridge::version());
    println!("Type JavaScript code to evaluate, Ctrl+D to exit.\n");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error starting line editor: {}", e);
            return false;
        }
    };
    let origin = ScriptOrigin::new("<repl>", 0, 0);

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                eval(scope, line, &origin);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                return true;
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                return false;
            }
        }
    }
}
