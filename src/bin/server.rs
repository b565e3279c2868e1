//! CESAME demo backend.
//! Run with: cargo run --bin cesame-demo-server

use std::process::ExitCode;

use cesame_chat::start_cesame_chat;

fn main() -> ExitCode {
    start_cesame_chat::run_demo_server()
}
