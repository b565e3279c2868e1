//! Terminal client: sends one message and streams the answer to stdout.

use std::process::ExitCode;

use cesame_chat::start_cesame_chat;

fn main() -> ExitCode {
    start_cesame_chat::run()
}
