use std::fs;
use std::process::ExitCode;
use std::sync::mpsc;

use log::{error, info};

use statemachine::cli::{self, ParsedArgs};
use statemachine::event::Event;
use statemachine::lexer::Lexer;
use statemachine::parser;
use statemachine::runtime::{Runtime, Shutdown};
use statemachine::varserver::InMemoryVariableServer;
use statemachine::Arena;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = cli::parse(args);
    let args = match parsed {
        ParsedArgs::Help => {
            println!("{}", cli::usage());
            return ExitCode::SUCCESS;
        }
        ParsedArgs::Run(args) => args,
    };

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let source = match &args.filename {
        Some(path) => match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                error!("cannot read {path:?}: {e}");
                String::new()
            }
        },
        None => {
            error!("no definition file given; nothing to parse");
            String::new()
        }
    };

    let (tx, rx) = mpsc::channel();
    install_signal_bridge(tx.clone());

    let mut vars = InMemoryVariableServer::new();
    let mut arena = Arena::new();

    let tokens = match Lexer::new(&source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("{e}");
            Vec::new()
        }
    };

    let (machine, parse_errors) = parser::parse(tokens, &mut arena, &mut vars, tx.clone());
    for e in &parse_errors {
        error!("{e}");
    }

    let mut runtime = Runtime::new(machine, arena, Box::new(vars), tx, rx);
    match runtime.run() {
        Ok(Shutdown::Terminated) => {
            info!("shut down after termination signal");
            ExitCode::FAILURE
        }
        Ok(Shutdown::ChannelClosed) => {
            info!("shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Bridges `SIGINT`/`SIGTERM` onto the same event channel the timer
/// manager and variable server use, so the single event loop is the
/// only place shutdown is actually handled.
fn install_signal_bridge(tx: mpsc::Sender<Event>) {
    let result = ctrlc::set_handler(move || {
        let _ = tx.send(Event::Terminate);
    });
    if let Err(e) = result {
        error!("failed to install signal handler: {e}");
    }
}
