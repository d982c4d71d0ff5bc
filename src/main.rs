use std::{
    cell::RefCell,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    rc::Rc,
};

use clap::{Args, Parser, Subcommand};
use tiny::{
    diagnostic::Diagnostic,
    observer::{Observer, Silent, Tracing},
    tokenizer::{TokenType, Tokenizer},
    tree_walk_interpreter::Interpreter,
};

#[derive(Debug, Parser)]
#[command(version, about = "Runs programs written in a tiny imperative language")]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log every token, statement and assignment
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a source file
    Run(RunArgs),
    /// Read and run one line at a time, keeping variables between lines
    Repl,
    /// Run the built-in FizzBuzz program
    Demo,
    /// List the tokens of a source file
    Tokens(FileArgs),
    /// Print the parsed form of a source file
    Parse(FileArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    file: PathBuf,

    /// Stop after this many statements and loop iterations
    #[arg(long)]
    max_steps: Option<u64>,
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let args = Cli::parse();
    init_logging(args.verbose, args.trace);

    let observer = if args.trace {
        Tracing::shared()
    } else {
        Silent::shared()
    };

    let result = match args.command() {
        Command::Repl => repl_command(&observer),
        Command::Run(args) => run_command(args, &observer),
        Command::Demo => demo_command(&observer),
        Command::Tokens(args) => tokens_command(args),
        Command::Parse(args) => parse_command(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, trace: bool) {
    let level = match verbose {
        _ if trace => tracing::Level::TRACE,
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses and runs `source`, printing diagnostics to stderr. Returns whether
/// the program ran without any error.
fn execute(
    source: &str,
    interpreter: &mut Interpreter,
    observer: &Rc<RefCell<dyn Observer>>,
) -> bool {
    let diagnostics: Vec<Diagnostic> =
        match tiny::parser::program_with_observer(source, observer.clone()) {
            Ok(program) => match interpreter.interpret(&program) {
                Ok(()) => return true,
                Err(e) => {
                    tracing::debug!("{e}");
                    vec![Diagnostic::from(&e)]
                }
            },
            Err(errors) => errors.errors().iter().map(Diagnostic::from).collect(),
        };

    flush_or_warn(&mut std::io::stdout());
    for diagnostic in &diagnostics {
        observer.borrow_mut().diagnostic(diagnostic);
        eprintln!("{diagnostic}");
    }
    false
}

/// Flushes program output so it lands before the diagnostics on stderr.
/// Returns whether the flush succeeded.
fn flush_or_warn(out: &mut dyn Write) -> bool {
    match out.flush() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Could not flush output: {e}");
            false
        }
    }
}

fn repl_command(observer: &Rc<RefCell<dyn Observer>>) -> Result<bool, CliError> {
    println!("Welcome to the tiny REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let mut interpreter = Interpreter::default().with_observer(observer.clone());
    let mut input = String::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        input.clear();
        let read = std::io::stdin().read_line(&mut input)?;
        if read == 0 {
            break;
        }

        execute(input.trim(), &mut interpreter, observer);
    }

    Ok(true)
}

fn run_command(args: &RunArgs, observer: &Rc<RefCell<dyn Observer>>) -> Result<bool, CliError> {
    let source = read_source(&args.file)?;
    tracing::info!(file = %args.file.display(), max_steps = ?args.max_steps, "running");

    let mut interpreter = Interpreter::default()
        .with_observer(observer.clone())
        .with_step_limit(args.max_steps);
    Ok(execute(&source, &mut interpreter, observer))
}

fn demo_command(observer: &Rc<RefCell<dyn Observer>>) -> Result<bool, CliError> {
    let mut interpreter = Interpreter::default().with_observer(observer.clone());
    Ok(execute(fizzbuzz_source(), &mut interpreter, observer))
}

fn fizzbuzz_source() -> &'static str {
    r#"
    i = 1;
    while (i <= 15) {
        if (i % 3 == 0) {
            if (i % 5 == 0) {
                print "FizzBuzz";
            } else {
                print "Fizz";
            }
        } else {
            if (i % 5 == 0) {
                print "Buzz";
            } else {
                print i;
            }
        }
        i = i + 1;
    }
    "#
}

fn tokens_command(args: &FileArgs) -> Result<bool, CliError> {
    let source = read_source(&args.file)?;
    let mut tokenizer = Tokenizer::new(&source);
    let mut line = 0;
    let mut clean = true;

    loop {
        let token = match tokenizer.token() {
            Ok(token) => token,
            Err(e) => {
                eprintln!("{e}");
                clean = false;
                e.unknown_token(&source)
            }
        };

        if token.span.start_line != line {
            print!("{:4} ", token.span.start_line);
            line = token.span.start_line;
        } else {
            print!("   | ");
        }

        println!("{:<10} {}", format!("{:?}", token.token_type), token.lexeme);

        if token.token_type == TokenType::Eof {
            break;
        }
    }

    Ok(clean)
}

fn parse_command(args: &FileArgs) -> Result<bool, CliError> {
    let source = read_source(&args.file)?;
    match tiny::parser::program(&source) {
        Ok(program) => {
            print!("{program}");
            Ok(true)
        }
        Err(errors) => {
            eprint!("{errors}");
            Ok(false)
        }
    }
}
