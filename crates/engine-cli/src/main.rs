use std::{path::PathBuf, process::ExitCode, rc::Rc};

use clap::Parser as ClapParser;
use engine::{
    config::EngineConfig,
    error::{Flow, Sentinel},
    eval::Evaluator,
    log::StderrLog,
    parser::parse_program,
};

/// Runs a single script file through one evaluator and surfaces its exit
/// code, mirroring the embedding contract in spec.md §6 ("CLI / exit
/// codes"): a script-level `exit(code)` becomes the process exit code;
/// everything else that completes without escaping a sentinel exits 0.
#[derive(ClapParser, Debug)]
#[command(name = "engine-cli", about = "Run a script file through the engine")]
struct Cli {
    /// Path to the script to run.
    script: PathBuf,

    /// Path to a TOML configuration file (defaults built in if omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the script's final value to stdout on success.
    #[arg(long)]
    print_result: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("error loading config {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let source = match std::fs::read_to_string(&cli.script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {e}", cli.script.display());
            return ExitCode::FAILURE;
        }
    };

    let file_name = cli.script.to_string_lossy().into_owned();
    let program = match parse_program(file_name, &source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let eval = Evaluator::with_log(Rc::new(config), Rc::new(StderrLog));
    match eval.run(&program) {
        Ok(value) => {
            if cli.print_result {
                println!("{value}");
            }
            ExitCode::SUCCESS
        }
        Err(Flow::Sentinel(Sentinel::Exit(code))) => exit_code_from(code),
        Err(Flow::Sentinel(other)) => {
            eprintln!("uncaught control-flow signal: {other}");
            ExitCode::FAILURE
        }
        Err(Flow::Error(e)) => {
            let structured = e.to_structured();
            eprintln!(
                "{} error: {}{}",
                structured.kind,
                structured.message,
                structured
                    .file
                    .map(|f| format!(" ({f}:{}:{})", structured.line.unwrap_or(0), structured.column.unwrap_or(0)))
                    .unwrap_or_default()
            );
            ExitCode::FAILURE
        }
    }
}

fn exit_code_from(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}
