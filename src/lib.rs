//! Pure Rust async implementation of Valve's [server query](https://developer.valvesoftware.com/wiki/Server_queries),
//! [Source RCON](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol) and
//! [master server query](https://developer.valvesoftware.com/wiki/Master_Server_Query_Protocol) protocols.
pub mod config;
pub mod endpoint;
pub mod error;
pub mod info;
pub mod master;
pub mod packet;
pub mod parse;
pub mod players;
pub mod query;
pub mod rcon;
pub mod rules;
pub mod server;
pub mod session;
pub mod socket;
