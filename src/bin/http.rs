use std::net::SocketAddr;

use planner_tool::persistence::load_board_from_json;
use planner_tool::{TaskBoard, http_api};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let mut args = std::env::args().skip(1);
    let mut addr: SocketAddr = ([127, 0, 0, 1], 3000).into();
    let mut board = TaskBoard::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addr" => {
                let value = args.next().unwrap_or_default();
                addr = value.parse().unwrap_or_else(|_| {
                    eprintln!("invalid --addr '{value}', using {addr}");
                    addr
                });
            }
            "--load" => {
                let value = args.next().unwrap_or_default();
                match load_board_from_json(&value) {
                    Ok(loaded) => board = loaded,
                    Err(e) => {
                        eprintln!("failed to load '{value}': {e}");
                        std::process::exit(1);
                    }
                }
            }
            other => {
                eprintln!("unknown argument '{other}'");
                eprintln!("usage: http [--addr HOST:PORT] [--load board.json]");
                std::process::exit(2);
            }
        }
    }

    println!("Planner Tool HTTP API listening on {addr}");
    http_api::serve(addr, board).await
}
