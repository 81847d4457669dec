use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::debug;

use crate::config::QueryOptions;
use crate::endpoint::Endpoint;
use crate::error::SourceError;
use crate::info::ServerInfo;
use crate::packet::{Engine, RequestPacket, ResponsePacket};
use crate::players::Player;
use crate::query::QuerySocket;
use crate::rcon::RconSocket;
use crate::rules::Rules;
use crate::session::{RconSession, RconState};

/// A Source or GoldSrc game server, queried over UDP and controlled over rcon.
///
/// Example usage:
/// ```no_run
/// use rsourcenet::config::QueryOptions;
/// use rsourcenet::packet::Engine;
/// use rsourcenet::server::GameServer;
///
/// # async fn run() -> Result<(), rsourcenet::error::SourceError> {
/// let host: &str = "nyc-1.us.uncletopia.com:27015"; // Uncletopia New York City 4
/// let mut server = GameServer::new(host, Engine::Source, QueryOptions::default()).await?;
/// let info = server.server_info().await?;
/// println!("{} is playing {}", info.hostname(), info.map());
/// # Ok(())
/// # }
/// ```
pub struct GameServer {
    endpoint: Endpoint,
    engine: Engine,
    options: QueryOptions,
    socket: QuerySocket,
    rcon: Option<RconSession>,
    challenge: Option<i32>,
}

impl GameServer {
    /// Resolve `host`, given as `name:port` or just `name` for port 27015.
    pub async fn new(
        host: &str,
        engine: Engine,
        options: QueryOptions,
    ) -> Result<Self, SourceError> {
        let endpoint = Endpoint::resolve(host).await?;
        Ok(Self::from_endpoint(endpoint, engine, options))
    }

    pub fn from_addr(addr: SocketAddr, engine: Engine, options: QueryOptions) -> Self {
        Self::from_endpoint(Endpoint::from(addr), engine, options)
    }

    fn from_endpoint(endpoint: Endpoint, engine: Engine, options: QueryOptions) -> Self {
        let socket = QuerySocket::new(endpoint.addr(), engine, options.timeout);
        GameServer {
            endpoint,
            engine,
            options,
            socket,
            rcon: None,
            challenge: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.endpoint.addr()
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Round trip time of an A2S_INFO request.
    pub async fn ping(&mut self) -> Result<Duration, SourceError> {
        let start = Instant::now();
        let reply = self.socket.send_recv(&RequestPacket::info(None)).await?;
        let ping = start.elapsed();

        if let ResponsePacket::Challenge(challenge) = reply {
            self.challenge = Some(challenge);
        }
        debug!("ping to {} is {:?}", self.addr(), ping);
        Ok(ping)
    }

    /// Query the server with A2S_INFO, answering a challenge if it sends one.
    pub async fn server_info(&mut self) -> Result<ServerInfo, SourceError> {
        let mut reply = self.socket.send_recv(&RequestPacket::info(None)).await?;

        // absolving challenge
        if let ResponsePacket::Challenge(challenge) = reply {
            debug!("{} challenged the info request", self.addr());
            self.challenge = Some(challenge);
            reply = self.socket.send_recv(&RequestPacket::info(Some(challenge))).await?;
        }

        match reply {
            ResponsePacket::Info(info) => Ok(ServerInfo::Source(info)),
            ResponsePacket::InfoDetailed(info) => Ok(ServerInfo::GoldSrc(info)),
            other => Err(SourceError::UnexpectedPacket(other.name())),
        }
    }

    /// Request a fresh challenge number for player and rules queries.
    pub async fn challenge(&mut self) -> Result<i32, SourceError> {
        let request = match self.engine {
            Engine::Source => RequestPacket::players(-1),
            Engine::GoldSrc => RequestPacket::challenge(),
        };

        match self.socket.send_recv(&request).await? {
            ResponsePacket::Challenge(challenge) => {
                debug!("challenge number of {} is {}", self.addr(), challenge);
                self.challenge = Some(challenge);
                Ok(challenge)
            }
            other => Err(SourceError::UnexpectedPacket(other.name())),
        }
    }

    /// Query the players currently on the server with A2S_PLAYER.
    pub async fn players(&mut self) -> Result<Vec<Player>, SourceError> {
        match self.challenged_request(RequestPacket::players).await? {
            ResponsePacket::Players(players) => Ok(players),
            other => Err(SourceError::UnexpectedPacket(other.name())),
        }
    }

    /// Query the server cvars with A2S_RULES.
    pub async fn rules(&mut self) -> Result<Rules, SourceError> {
        match self.challenged_request(RequestPacket::rules).await? {
            ResponsePacket::Rules(rules) => Ok(rules),
            other => Err(SourceError::UnexpectedPacket(other.name())),
        }
    }

    /// Send a request that has to carry a challenge number. If the server
    /// answers with a new challenge instead, the request is repeated once.
    async fn challenged_request(
        &mut self,
        build: fn(i32) -> RequestPacket,
    ) -> Result<ResponsePacket, SourceError> {
        let challenge = match (self.challenge, self.engine) {
            (Some(challenge), _) => challenge,
            (None, Engine::GoldSrc) => self.challenge().await?,
            (None, Engine::Source) => -1,
        };

        match self.socket.send_recv(&build(challenge)).await? {
            ResponsePacket::Challenge(challenge) => {
                debug!("{} sent a new challenge number {}", self.addr(), challenge);
                self.challenge = Some(challenge);
                self.socket.send_recv(&build(challenge)).await
            }
            reply => Ok(reply),
        }
    }

    /// Authenticate on the rcon port (the game port) with `password`.
    ///
    /// Returns `false` if the password was rejected. After
    /// [SourceError::RconBan], [GameServer::rcon_disconnect] has to be called
    /// before trying again.
    pub async fn rcon_auth(&mut self, password: &str) -> Result<bool, SourceError> {
        let addr = self.addr();
        let timeout = self.options.rcon_timeout;
        let session = self
            .rcon
            .get_or_insert_with(|| RconSession::new(RconSocket::new(addr, timeout)));

        session.authenticate(password).await
    }

    /// Run `command` over rcon and return its output.
    pub async fn rcon_exec(&mut self, command: &str) -> Result<String, SourceError> {
        match self.rcon.as_mut() {
            Some(session) => session.execute(command).await,
            None => Err(SourceError::RconNoAuth),
        }
    }

    pub fn rcon_state(&self) -> RconState {
        self.rcon
            .as_ref()
            .map(RconSession::state)
            .unwrap_or(RconState::Unauthenticated)
    }

    /// Drop the rcon connection; the next [GameServer::rcon_auth] opens a new one.
    pub fn rcon_disconnect(&mut self) {
        if let Some(mut session) = self.rcon.take() {
            session.close();
        }
    }

    /// Close all sockets of this server.
    pub fn disconnect(&mut self) {
        self.socket.close();
        self.rcon_disconnect();
    }
}
