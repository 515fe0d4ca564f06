//! Hand-rolled argument parsing for `statemachine [-v] [-h] [<filename>]`.
//! Kept minimal and dependency-free — this wrapper is not the
//! architectural focus of the crate.

pub struct Args {
    pub verbose: bool,
    pub filename: Option<String>,
}

pub enum ParsedArgs {
    Run(Args),
    Help,
}

pub fn parse(args: impl IntoIterator<Item = String>) -> ParsedArgs {
    let mut verbose = false;
    let mut filename = None;
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return ParsedArgs::Help,
            "-v" | "--verbose" => verbose = true,
            other => filename = Some(other.to_string()),
        }
    }
    ParsedArgs::Run(Args { verbose, filename })
}

pub fn usage() -> &'static str {
    "usage: statemachine [-v] [-h] [<filename>]\n\n\
     -v, --verbose   enable debug-level logging\n\
     -h, --help      print this message and exit"
}
