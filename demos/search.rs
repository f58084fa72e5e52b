//! Connect to a server, log in, run one search and print the results as JSON.
//!
//! ```text
//! cargo run --example search -- <host> <port> <query>
//! cargo run --example search -- <server.met> <query>
//! ```
//!
//! With a `server.met` file the first listed server is used. Set `RUST_LOG`
//! (e.g. `RUST_LOG=ed2k_client=debug`) for protocol logs.

use std::time::Duration;

use ed2k_client::{Client, ClientConfig, ClientEvent, ServerList, SessionState};
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("usage: search <host> <port> <query>");
    eprintln!("       search <server.met> <query>");
    std::process::exit(2);
}

async fn target(args: &[String]) -> Result<(String, u16, String), Box<dyn std::error::Error>> {
    match args {
        [host, port, query] => Ok((host.clone(), port.parse()?, query.clone())),
        [path, query] => {
            let list = ServerList::from_file(path).await?;
            let server = list
                .servers
                .iter()
                .find(|s| !s.ip.is_empty())
                .ok_or("server list has no usable entry")?;
            tracing::info!("Using {} ({}:{})", server.name, server.ip, server.port);
            Ok((server.ip.clone(), server.port, query.clone()))
        }
        _ => usage(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (host, port, query) = target(&args).await?;

    let config = match std::env::var("ED2K_CONFIG") {
        Ok(path) => ClientConfig::from_json_file(path).await?,
        Err(_) => ClientConfig::default(),
    };
    let (client, mut events) = Client::builder()
        .config(config)
        .search_timeout(Duration::from_secs(20))
        .spawn()?;

    client.connect(host, port).await?;

    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Connected(_) => client.login().await?,
            ClientEvent::IdChange(session) => {
                tracing::info!("Logged in with client id {:?}", session.client_id);
                client.search(query.as_str()).await?;

                // A timed out search reverts to idle without an event.
                let watcher = client.clone();
                tokio::spawn(async move {
                    let mut session = watcher.subscribe();
                    let timed_out = session
                        .wait_for(|s| s.state == SessionState::Idle && s.last_results().is_none())
                        .await
                        .is_ok();
                    if timed_out {
                        tracing::warn!("Search timed out");
                        let _ = watcher.disconnect().await;
                    }
                });
            }
            ClientEvent::ServerMessage(session) => {
                if let Some(line) = session.messages.last() {
                    tracing::info!("Server: {}", line);
                }
            }
            ClientEvent::ServerStatus(session) => {
                tracing::info!("{:?} users, {:?} files", session.users, session.files);
            }
            ClientEvent::SearchResult(session) => {
                let results = session.last_results().unwrap_or_default();
                println!("{}", serde_json::to_string_pretty(results)?);
                client.disconnect().await?;
            }
            ClientEvent::Disconnected(_) => break,
            ClientEvent::Error(e) => tracing::error!("{}", e),
        }
    }
    Ok(())
}
