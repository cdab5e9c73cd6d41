//! Small interactive CLI used by the integration tests.

use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "clitest-fixture", version, about = "Test fixture for clitest")]
struct Cli {
    /// Run with verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a string
    Print { input: Option<String> },
    /// Ask text input
    Text,
    /// Exit with error
    Error,
    /// Ask select input
    Select,
    /// Wait for 5 seconds
    Wait,
    /// Print environment variables
    Env,
    /// Print a phrase with random numbers
    Random,
}

const SELECT_CHOICES: [(&str, &str); 2] = [("First", "first option"), ("Second", "second option")];

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Print { input } => {
            if cli.verbose {
                println!("Running in verbose mode.");
            }
            println!("cli:print: {}", input.unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Text => text(),
        Commands::Error => {
            eprintln!("An error occurred");
            Ok(ExitCode::from(1))
        }
        Commands::Select => select(),
        Commands::Wait => {
            thread::sleep(Duration::from_secs(5));
            println!("Done waiting");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Env => {
            let mut vars: Vec<(String, String)> = std::env::vars().collect();
            vars.sort();
            for (key, value) in vars {
                println!("- {key}: {value}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Random => {
            let bytes = Uuid::new_v4().into_bytes();
            println!(
                "{} dogs, {} cats, and {} birds",
                bytes[0] % 10 + 1,
                bytes[1] % 20 + 1,
                bytes[2] % 10 + 1
            );
            Ok(ExitCode::SUCCESS)
        }
    };

    result.unwrap_or_else(|e| {
        eprintln!("clitest-fixture: {e}");
        ExitCode::from(2)
    })
}

fn text() -> io::Result<ExitCode> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "? Give me a number: › ")?;
    stdout.flush()?;

    let mut answer = String::new();
    let mut stdin = io::stdin().lock();
    let mut byte = [0u8; 1];
    while stdin.read(&mut byte)? == 1 {
        match byte[0] {
            b'\r' | b'\n' => break,
            b => answer.push(char::from(b)),
        }
    }

    let answer = answer.trim();
    writeln!(stdout)?;
    writeln!(stdout, "✔ Give me a number: … {answer}")?;
    writeln!(stdout, "Answered: {answer}")?;
    Ok(ExitCode::SUCCESS)
}

fn draw_select(out: &mut impl Write, selected: usize) -> io::Result<()> {
    writeln!(out, "? Pick option: › - Use arrow-keys. Return to submit.")?;
    for (index, (title, _)) in SELECT_CHOICES.iter().enumerate() {
        let marker = if index == selected { "❯" } else { " " };
        writeln!(out, "{marker}   {title}")?;
    }
    out.flush()
}

fn select() -> io::Result<ExitCode> {
    let mut stdout = io::stdout().lock();
    let mut selected = 0;
    draw_select(&mut stdout, selected)?;

    let mut stdin = io::stdin().lock();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = stdin.read(&mut buf)?;
        if n == 0 {
            // Input closed without an answer.
            return Ok(ExitCode::SUCCESS);
        }
        pending.extend_from_slice(&buf[..n]);

        while !pending.is_empty() {
            if pending.starts_with(b"\x1b[A") {
                pending.drain(..3);
                selected = selected.saturating_sub(1);
                draw_select(&mut stdout, selected)?;
            } else if pending.starts_with(b"\x1b[B") {
                pending.drain(..3);
                selected = (selected + 1).min(SELECT_CHOICES.len() - 1);
                draw_select(&mut stdout, selected)?;
            } else if pending[0] == b'\r' || pending[0] == b'\n' {
                let (title, value) = SELECT_CHOICES[selected];
                writeln!(stdout, "✔ Pick option: › {title}")?;
                writeln!(stdout, "Picked: {value}")?;
                return Ok(ExitCode::SUCCESS);
            } else if pending[0] == b'\x1b' && pending.len() < 3 {
                // Partial escape sequence, wait for the rest.
                break;
            } else {
                pending.remove(0);
            }
        }
    }
}
