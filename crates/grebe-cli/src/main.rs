mod repl;

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;

use grebe_lang::errors::report_error;
use grebe_lang::interp::remote::{RemoteClient, SelectionStep};
use grebe_lang::schema::Schema;
use grebe_lang::types::Type;

#[derive(Parser)]
#[command(name = "grebe", about = "The Grebe programming language", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Grebe file
    Run {
        file: PathBuf,
        /// Path to a schema introspection JSON document
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Type-check without evaluating
    Check {
        file: PathBuf,
        /// Path to a schema introspection JSON document
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Start the REPL
    Repl,
}

/// Placeholder transport: the core treats remote invocation as a
/// pluggable collaborator, and the CLI does not ship one.
struct NoTransport;

impl RemoteClient for NoTransport {
    fn invoke(
        &self,
        path: &[SelectionStep],
        _ret: &Type,
    ) -> Result<serde_json::Value, String> {
        let chain: Vec<&str> = path.iter().map(|s| s.field.as_str()).collect();
        Err(format!(
            "no remote transport configured (while resolving {})",
            chain.join(".")
        ))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { ref file, ref schema } => run_file(file, schema.as_deref(), true),
        Command::Check { ref file, ref schema } => run_file(file, schema.as_deref(), false),
        Command::Repl => {
            repl::run_repl();
            ExitCode::SUCCESS
        }
    }
}

fn run_file(file: &PathBuf, schema_path: Option<&std::path::Path>, evaluate: bool) -> ExitCode {
    let filename = file.display().to_string();
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{} cannot read {}: {e}", "error:".red().bold(), filename);
            return ExitCode::FAILURE;
        }
    };

    let schema = match load_schema(schema_path) {
        Ok(schema) => schema,
        Err(message) => {
            eprintln!("{} {message}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let forms = match grebe_lang::parse(&source) {
        Ok(forms) => forms,
        Err(e) => {
            report_error(&filename, &source, &e);
            return ExitCode::FAILURE;
        }
    };

    let checked = match &schema {
        Some(schema) => grebe_lang::check_program_with_schema(&forms, schema),
        None => grebe_lang::check_program(&forms),
    };
    let (checker, type_env) = match checked {
        Ok(checked) => checked,
        Err(e) => {
            report_error(&filename, &source, &e);
            return ExitCode::FAILURE;
        }
    };

    if !evaluate {
        println!("{} {}", "ok:".green().bold(), filename);
        return ExitCode::SUCCESS;
    }

    let eval_env = match &schema {
        Some(schema) => {
            grebe_lang::interp::eval_env_with_schema(&type_env, schema, Rc::new(NoTransport))
        }
        None => grebe_lang::interp::new_eval_env(&type_env),
    };
    let interp = grebe_lang::interp::Interp::new(&checker, grebe_lang::Ctx::new());
    match interp.eval_program(&eval_env, &forms) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&filename, &source, &e);
            ExitCode::FAILURE
        }
    }
}

fn load_schema(path: Option<&std::path::Path>) -> Result<Option<Schema>, String> {
    let Some(path) = path else { return Ok(None) };
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read schema {}: {e}", path.display()))?;
    let schema = Schema::from_json(&contents).map_err(|e| e.to_string())?;
    Ok(Some(schema))
}
