use std::env;

use rsourcenet::config::QueryOptions;
use rsourcenet::error::SourceError;
use rsourcenet::info::ServerInfo;
use rsourcenet::packet::Engine;
use rsourcenet::server::GameServer;

#[tokio::main]
async fn main() -> Result<(), SourceError> {
    env_logger::init();

    let host = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:27015".to_string());
    let engine = match env::args().nth(2).as_deref() {
        Some("goldsrc") => Engine::GoldSrc,
        _ => Engine::Source,
    };

    let mut server = GameServer::new(&host, engine, QueryOptions::default()).await?;
    let ping = server.ping().await?;
    let info: ServerInfo = server.server_info().await?;
    dbg!(ping, info);

    Ok(())
}
