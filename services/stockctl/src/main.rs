use admin_ipc::{send_request, AdminRequest, AdminResponse, DEFAULT_SOCKET_PATH};
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    /// Print the raw JSON response.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Status,
    /// Re-read subscriber preferences from disk.
    Reload,
    /// Show the current stock.
    Stock,
    /// Replace a subscriber's watched items, e.g. `"carrot, seed:all, rareitems"`.
    SetItems { address: String, items: String },
    MyItems { address: String },
    ClearItems { address: String },
}

impl From<Command> for AdminRequest {
    fn from(command: Command) -> Self {
        match command {
            Command::Status => AdminRequest::Status,
            Command::Reload => AdminRequest::Reload,
            Command::Stock => AdminRequest::Stock,
            Command::SetItems { address, items } => AdminRequest::SetItems { address, items },
            Command::MyItems { address } => AdminRequest::MyItems { address },
            Command::ClearItems { address } => AdminRequest::ClearItems { address },
        }
    }
}

fn render(resp: &AdminResponse) -> Result<String> {
    Ok(match resp {
        AdminResponse::Status(status) => serde_json::to_string_pretty(status)?,
        AdminResponse::Items(items) if items.is_empty() => "no items watched".to_string(),
        AdminResponse::Items(items) => items
            .iter()
            .map(|item| format!("▸ {item}"))
            .collect::<Vec<_>>()
            .join("\n"),
        AdminResponse::Text(text) => text.clone(),
        AdminResponse::Ack => "ok".to_string(),
        AdminResponse::Error(err) => format!("error: {err}"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let req = AdminRequest::from(cli.command);

    let resp = send_request(&cli.socket, &req).await?;
    if cli.json {
        println!("{}", serde_json::to_string(&resp)?);
    } else {
        println!("{}", render(&resp)?);
    }
    if matches!(resp, AdminResponse::Error(_)) {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_map_to_requests() {
        let cli = Cli::parse_from(["stockctl", "set-items", "a@g.us", "carrot, seed:all"]);
        assert_eq!(
            AdminRequest::from(cli.command),
            AdminRequest::SetItems {
                address: "a@g.us".into(),
                items: "carrot, seed:all".into(),
            }
        );

        let cli = Cli::parse_from(["stockctl", "--socket", "/tmp/x.sock", "clear-items", "a@g.us"]);
        assert_eq!(cli.socket, "/tmp/x.sock");
        assert_eq!(
            AdminRequest::from(cli.command),
            AdminRequest::ClearItems {
                address: "a@g.us".into()
            }
        );
    }

    #[test]
    fn renders_item_lists() {
        let resp = AdminResponse::Items(vec!["carrot".into(), "seed:all".into()]);
        assert_eq!(render(&resp).unwrap(), "▸ carrot\n▸ seed:all");
        assert_eq!(render(&AdminResponse::Items(vec![])).unwrap(), "no items watched");
        assert_eq!(render(&AdminResponse::Error("boom".into())).unwrap(), "error: boom");
    }
}
