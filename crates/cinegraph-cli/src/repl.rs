//! Interactive question loop.
//!
//! Uses `rustyline` for line editing and history. A plain stdin loop is used
//! when built with `--no-default-features`.

use anyhow::Result;
use colored::Colorize;
use tokio::runtime::Runtime;

use cinegraph_qa::{Mode, QaService};

struct Session<'a> {
    runtime: &'a Runtime,
    service: &'a QaService,
    mode: Mode,
    show_query: bool,
}

enum ReplControl {
    Continue,
    Exit,
}

pub fn cmd_repl(runtime: &Runtime, service: &QaService, mode: Mode) -> Result<()> {
    let mut session = Session {
        runtime,
        service,
        mode,
        show_query: false,
    };

    println!("{}", "CineGraph".green().bold());
    println!("Ask about movies, directors, actors and genres. Type `help` for commands, `exit` to quit.\n");
    if mode == Mode::Llm && !service.supports(Mode::Llm) {
        eprintln!(
            "{} no completion provider is configured; llm questions will fail",
            "warning:".yellow().bold()
        );
    }

    #[cfg(feature = "repl-rustyline")]
    {
        run_rustyline(&mut session)
    }
    #[cfg(not(feature = "repl-rustyline"))]
    {
        run_stdin(&mut session)
    }
}

#[cfg(feature = "repl-rustyline")]
fn run_rustyline(session: &mut Session<'_>) -> Result<()> {
    use anyhow::anyhow;
    use rustyline::error::ReadlineError;

    let mut rl = rustyline::DefaultEditor::new().map_err(|e| anyhow!("failed to init rustyline: {e}"))?;

    loop {
        let line = match rl.readline(&prompt(session.mode)) {
            Ok(l) => l,
            Err(ReadlineError::Eof) => break,
            Err(ReadlineError::Interrupted) => continue,
            Err(e) => return Err(anyhow!("readline error: {e}")),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line)
            .map_err(|e| anyhow!("failed to record history: {e}"))?;

        match dispatch(session, line) {
            ReplControl::Continue => {}
            ReplControl::Exit => break,
        }
    }
    Ok(())
}

#[cfg(not(feature = "repl-rustyline"))]
fn run_stdin(session: &mut Session<'_>) -> Result<()> {
    use std::io::{self, BufRead, Write};

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", prompt(session.mode));
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let ReplControl::Exit = dispatch(session, line) {
            break;
        }
    }
    Ok(())
}

fn prompt(mode: Mode) -> String {
    format!("cinegraph[{mode}]> ")
}

fn dispatch(session: &mut Session<'_>, line: &str) -> ReplControl {
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(h, r)| (h, r.trim()));

    match head.to_ascii_lowercase().as_str() {
        "exit" | "quit" | ":q" => return ReplControl::Exit,
        "help" | "?" => print_help(),
        "mode" if rest.is_empty() => println!("mode: {}", session.mode),
        "mode" => match rest.parse::<Mode>() {
            Ok(mode) => {
                session.mode = mode;
                println!("mode: {mode}");
            }
            Err(e) => eprintln!("{} {e}", "error:".red().bold()),
        },
        "show-query" => {
            session.show_query = !session.show_query;
            println!("show-query: {}", if session.show_query { "on" } else { "off" });
        }
        "schema" => print!("{}", session.service.schema().describe()),
        "explain" if !rest.is_empty() => {
            match session
                .runtime
                .block_on(session.service.explain(rest, session.mode))
            {
                Ok(explanation) => {
                    if let Err(e) = crate::print_explanation(&explanation) {
                        eprintln!("{} {e}", "error:".red().bold());
                    }
                }
                Err(e) => eprintln!("{} {e}", "error:".red().bold()),
            }
        }
        _ => {
            let run = session
                .runtime
                .block_on(session.service.run(line, session.mode));
            crate::print_run(&run, session.show_query);
        }
    }
    ReplControl::Continue
}

fn print_help() {
    println!("{}", "Commands".bold());
    println!("  <question>          ask a question in the current mode");
    println!("  explain <question>  show intent and query without running it");
    println!("  mode [direct|llm]   show or switch the mode");
    println!("  show-query          toggle printing executed queries");
    println!("  schema              print the graph schema");
    println!("  exit                leave the session");
}
