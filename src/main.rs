use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use clap::Parser;
use clap::Subcommand;
use line_calc::Lexer;
use line_calc::LexError;
use line_calc::Session;
use miette::IntoDiagnostic;
use miette::WrapErr;
use tracing_subscriber::EnvFilter;

/// Integer calculator: reads one arithmetic expression per line and prints
/// its value. An empty line ends the session.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Text written before each line is read.
    #[arg(long, env = "LINE_CALC_PROMPT", default_value = "> ")]
    prompt: String,

    /// Print the full diagnostic of every failed line to stderr.
    #[arg(long)]
    report: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tokens of every line in a file.
    Tokenize { filename: PathBuf },
    /// Print the expression tree of every line in a file.
    Parse { filename: PathBuf },
    /// Evaluate every line in a file without prompting.
    Run { filename: PathBuf },
}

fn read_file(filename: &Path) -> miette::Result<String> {
    fs::read_to_string(filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        None => {
            Session::new(io::stdin().lock(), io::stdout().lock())
                .prompt(args.prompt)
                .filename("<stdin>")
                .report(args.report)
                .run()?;
        }
        Some(Commands::Tokenize { filename }) => {
            let file_contents = read_file(&filename)?;

            for (number, line) in file_contents.split_inclusive('\n').enumerate() {
                for token in Lexer::new(filename.to_str(), line) {
                    let token = match token {
                        Ok(token) => token,
                        Err(e) => {
                            if let Some(lex_error) = e.downcast_ref::<LexError>() {
                                eprintln!(
                                    "[line {}] Error: Unexpected character: {}",
                                    number + 1,
                                    lex_error.token
                                );
                                eprintln!("{e:?}");

                                std::process::exit(65);
                            }
                            return Err(e);
                        }
                    };
                    println!("{token}");
                }
            }
        }
        Some(Commands::Parse { filename }) => {
            let file_contents = read_file(&filename)?;

            for line in file_contents.split_inclusive('\n') {
                match line_calc::Parser::new(filename.to_str(), line).parse_line()? {
                    Some(expr) => println!("{expr}"),
                    None => break,
                }
            }
        }
        Some(Commands::Run { filename }) => {
            let file = fs::File::open(&filename)
                .into_diagnostic()
                .wrap_err_with(|| format!("opening `{}` failed", filename.display()))?;

            Session::new(BufReader::new(file), io::stdout().lock())
                .prompt("")
                .filename(filename.display().to_string())
                .report(args.report)
                .run()?;
        }
    }
    Ok(())
}
