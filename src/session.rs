//! Authentication and command execution on top of an [RconSocket].
//!
//! srcds has two quirks every client has to play along with:
//!
//! - An auth request is answered by an empty SERVERDATA_RESPONSE_VALUE first,
//!   and only then by the SERVERDATA_AUTH_RESPONSE.
//! - Command output can be split over several packets without any marker for
//!   the last one. After the first non-empty packet we send a terminator
//!   packet; the server mirrors it after the real output, followed by another
//!   empty packet. Two empty fragments in a row end the response.

use log::{debug, info, trace, warn};
use rand::Rng;

use crate::error::SourceError;
use crate::rcon::{RconPacket, RconResponse, RconSocket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    /// The server closed the connection on our auth request. Nothing more can
    /// be done with this socket.
    Banned,
}

/// One rcon connection and its authentication state.
pub struct RconSession {
    socket: RconSocket,
    request_id: i32,
    state: RconState,
}

impl RconSession {
    pub fn new(socket: RconSocket) -> Self {
        RconSession {
            socket,
            request_id: 0,
            state: RconState::Unauthenticated,
        }
    }

    pub fn state(&self) -> RconState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == RconState::Authenticated
    }

    /// The request ID chosen at the last authentication.
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    /// Authenticate with `password`.
    ///
    /// Returns `false` if the password was rejected and
    /// [SourceError::RconBan] if the server refused to answer at all.
    pub async fn authenticate(&mut self, password: &str) -> Result<bool, SourceError> {
        if self.state == RconState::Banned {
            return Err(SourceError::RconBan);
        }

        self.request_id = rand::thread_rng().gen_range(0..1 << 16);
        self.state = RconState::Authenticating;
        debug!("authenticating with request id {}", self.request_id);

        if let Err(e) = self.socket.send(&RconPacket::auth(self.request_id, password)).await {
            self.state = RconState::Unauthenticated;
            return Err(e);
        }

        // the empty response that always precedes the auth response
        match self.socket.reply().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("{} closed the connection on authentication", self.socket.addr());
                self.socket.close();
                self.state = RconState::Banned;
                return Err(SourceError::RconBan);
            }
            Err(e) => {
                self.state = RconState::Unauthenticated;
                return Err(e);
            }
        }

        let reply = match self.socket.reply().await {
            Ok(reply) => reply,
            Err(e) => {
                self.state = RconState::Unauthenticated;
                return Err(e);
            }
        };

        let accepted = matches!(reply, Some(ref packet) if packet.id() == self.request_id);
        self.state = if accepted {
            info!("authenticated with {}", self.socket.addr());
            RconState::Authenticated
        } else {
            info!("{} rejected the rcon password", self.socket.addr());
            RconState::Unauthenticated
        };

        Ok(accepted)
    }

    /// Run `command` and return its whole output, trimmed.
    pub async fn execute(&mut self, command: &str) -> Result<String, SourceError> {
        if self.state != RconState::Authenticated {
            return Err(SourceError::RconNoAuth);
        }

        self.socket.send(&RconPacket::exec(self.request_id, command)).await?;

        let mut is_multi = false;
        let mut fragments: Vec<String> = Vec::new();

        loop {
            let reply = match self.socket.reply().await? {
                Some(RconResponse::Exec { body, .. }) => body,
                Some(RconResponse::Auth { .. }) | None => {
                    warn!("rcon connection to {} lost its authentication", self.socket.addr());
                    self.state = RconState::Unauthenticated;
                    return Err(SourceError::RconNoAuth);
                }
            };

            if !is_multi && !reply.is_empty() {
                is_multi = true;
                trace!("sending terminator packet");
                self.socket.send(&RconPacket::terminator(self.request_id)).await?;
            }

            fragments.push(reply);

            if !is_multi || Self::is_terminated(&fragments) {
                break;
            }
        }

        debug!("command output was {} packets", fragments.len());
        Ok(fragments.concat().trim().to_string())
    }

    fn is_terminated(fragments: &[String]) -> bool {
        matches!(fragments, [.., second_last, last] if second_last.is_empty() && last.is_empty())
    }

    /// Close the connection; authentication has to be repeated afterwards.
    pub fn close(&mut self) {
        self.socket.close();
        if self.state != RconState::Banned {
            self.state = RconState::Unauthenticated;
        }
    }
}
