use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use jsse_arrays::EngineConfig;
use jsse_arrays::shell::{Shell, split_statements};

#[derive(Parser)]
#[command(name = "jsse-arrays", version, about = "Array element storage and typed views, driven from a shell")]
struct Cli {
    /// Script of shell commands to execute
    file: Option<PathBuf>,

    /// Evaluate inline commands, separated by `;`
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Log call-site and representation transitions
    #[arg(short, long)]
    verbose: bool,

    /// Largest gap a write past the end may open before the array turns
    /// into a dictionary
    #[arg(long, default_value_t = EngineConfig::default().sparse_gap)]
    sparse_gap: u32,

    /// Relinks a call site tolerates before it stops speculating
    #[arg(long, default_value_t = EngineConfig::default().max_relinks)]
    max_relinks: u32,
}

impl Cli {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            sparse_gap: self.sparse_gap,
            max_relinks: self.max_relinks,
            ..EngineConfig::default()
        }
    }
}

/// Run every statement, printing results to stdout and errors to stderr.
/// Keeps going after an error; the exit status reports whether any failed.
fn execute_code(shell: &mut Shell, code: &str) -> ExitCode {
    let mut failed = false;
    for stmt in split_statements(code) {
        match shell.eval_line(&stmt) {
            Ok(out) if out.is_empty() => {}
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("error: {e}");
                failed = true;
            }
        }
    }
    if failed { ExitCode::from(1) } else { ExitCode::SUCCESS }
}

fn run_file(shell: &mut Shell, path: &Path) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            return ExitCode::from(1);
        }
    };
    execute_code(shell, &source)
}

fn run_repl(shell: &mut Shell) -> ExitCode {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("jsse-arrays v{}", env!("CARGO_PKG_VERSION"));
    println!("Type `help` for commands. Press Ctrl-D to exit.");

    loop {
        print!("> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        let read_result = stdin.lock().read_line(&mut line);

        match read_result {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    execute_code(shell, trimmed);
                }
            }
            Err(e) => {
                eprintln!("Read error: {e}");
                return ExitCode::from(1);
            }
        }
    }

    println!();
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let mut shell = Shell::new(cli.config());

    if let Some(code) = &cli.eval {
        return execute_code(&mut shell, code);
    }

    if let Some(path) = &cli.file {
        return run_file(&mut shell, path);
    }

    run_repl(&mut shell)
}
