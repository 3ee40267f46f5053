use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use stratdash::dashboard::Dashboard;
use stratdash::grid::{ConsoleGrid, GridEvent};
use stratdash::logging::{log, obj, v_str, Domain, Level};
use stratdash::session::fetch_login_info;
use stratdash::state::Config;
use stratdash::transport::HttpTransport;
use stratdash::verify::row_sm::Command;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: add [kind] | start|pause|stop <id> | edit <id> <product|param1> <value> | remove <id> | list | quit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Event(GridEvent),
    AddKind(String),
    List,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let id = |p: Option<&str>| p.and_then(|v| v.parse::<u64>().ok());
    match verb {
        "add" => match parts.next() {
            Some(kind) => Some(Input::AddKind(kind.to_string())),
            None => Some(Input::Event(GridEvent::AddRow)),
        },
        "list" | "ls" => Some(Input::List),
        "help" | "?" => Some(Input::Help),
        "quit" | "exit" | "q" => Some(Input::Quit),
        "remove" | "rm" => Some(Input::Event(GridEvent::RemoveRow { id: id(parts.next())? })),
        "edit" => {
            let id = id(parts.next())?;
            let field = parts.next()?.to_string();
            let value = parts.collect::<Vec<_>>().join(" ");
            Some(Input::Event(GridEvent::CellEdited { id, field, value }))
        }
        other => {
            let command = Command::parse(other)?;
            Some(Input::Event(GridEvent::Command { id: id(parts.next())?, command }))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("base_url", v_str(&cfg.base_url)),
            ("strategy", v_str(&cfg.strategy_kind)),
            ("command_timeout_ms", json!(cfg.command_timeout_ms)),
            ("journal", cfg.journal_path.as_deref().map(v_str).unwrap_or(serde_json::Value::Null)),
        ]),
    );

    if cfg.fetch_login {
        let client = reqwest::Client::builder().timeout(cfg.http_timeout()).build()?;
        match fetch_login_info(&client, &cfg.base_url).await {
            Ok(creds) => println!("login defaults: {:?}", creds),
            Err(err) => log(
                Level::Warn,
                Domain::Session,
                "login_info_failed",
                obj(&[("msg", v_str(&format!("{:#}", err)))]),
            ),
        }
    }

    let transport = Arc::new(HttpTransport::new(&cfg)?);
    let mut dashboard = Dashboard::open(transport, &cfg)?;
    dashboard.on_grid_ready(Box::new(ConsoleGrid::new(std::io::stdout())));
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Some(Input::Quit) => break,
                    Some(Input::Help) => println!("{}", HELP),
                    Some(Input::List) => dashboard.render(),
                    Some(Input::AddKind(kind)) => {
                        if let Err(err) = dashboard.on_add_row_kind(&kind) {
                            println!("{}", err);
                        }
                    }
                    Some(Input::Event(event)) => {
                        if let Err(err) = dashboard.handle_event(event) {
                            println!("{}", err);
                        }
                    }
                    None => println!("? {}", HELP),
                }
            }
            Some(_) = dashboard.next_outcome() => {}
        }
    }

    if dashboard.in_flight_count() > 0 {
        println!("waiting for {} command(s)...", dashboard.in_flight_count());
        dashboard.settle().await;
    }
    dashboard.log_summary();
    Ok(())
}
