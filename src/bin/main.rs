//! Terminal chat session against the coordinator.
//!
//! Commands: /optimize, /payload, /reset, /quit

use fund_portfolio_advisor::{config::AdvisorConfig, coordinator::Coordinator};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = AdvisorConfig::from_env()?;
    let coordinator = Coordinator::from_config(&config)?;
    let session_id = Uuid::new_v4().to_string();

    println!("Fund Portfolio Advisor (session {})", session_id);
    println!("Tell me a little about what you'd like to invest for. Type /quit to leave.\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match message {
            "/quit" | "/exit" => break,
            "/reset" => {
                coordinator.reset(&session_id).await?;
                println!("Session cleared.\n");
            }
            "/payload" => {
                let context = coordinator.payload(&session_id).await?;
                println!("{}\n", serde_json::to_string_pretty(&context)?);
            }
            "/optimize" => match coordinator.optimize(&session_id).await {
                Ok(allocation) => println!("{}\n", serde_json::to_string_pretty(&allocation)?),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => println!("{}\n", e),
            },
            _ => match coordinator.chat(&session_id, message).await {
                Ok(response) => println!("{}\n", response.reply),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => println!("Something went wrong: {}\n", e),
            },
        }
    }

    Ok(())
}
