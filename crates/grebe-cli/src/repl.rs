use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use grebe_lang::check::Checker;
use grebe_lang::errors::report_error;
use grebe_lang::interp::Value;

pub fn run_repl() {
    let mut rl = DefaultEditor::new().expect("failed to create editor");

    let mut checker = Checker::new(grebe_lang::Ctx::new());
    let type_env = grebe_lang::env::root_env(&mut checker.subst);
    let eval_env = grebe_lang::interp::new_eval_env(&type_env);

    let history_path = state_dir().join("repl-history");
    let _ = rl.load_history(&history_path);

    println!("Grebe v0.1.0 REPL — type an expression or :help");

    loop {
        match rl.readline("grebe> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                match trimmed {
                    ":help" | ":h" => {
                        println!("  :help — show this help");
                        println!("  :quit — exit the REPL");
                        continue;
                    }
                    ":quit" | ":q" => break,
                    _ => {}
                }

                let forms = match grebe_lang::parse(trimmed) {
                    Ok(forms) => forms,
                    Err(e) => {
                        report_error("<repl>", trimmed, &e);
                        continue;
                    }
                };

                match grebe_lang::eval_in(&forms, &mut checker, &type_env, &eval_env) {
                    Ok(Value::Null) => {}
                    Ok(value) => println!("{value}"),
                    Err(e) => {
                        // Inline error; the session continues.
                        report_error("<repl>", trimmed, &e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("error: {e}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(state_dir());
    let _ = rl.save_history(&history_path);
    println!("goodbye!");
}

fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".grebe")
}
