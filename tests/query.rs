mod common;

use std::io::Write;
use std::time::Duration;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use common::{cstr, single, spawn_silent_udp, spawn_udp};
use rsourcenet::config::QueryOptions;
use rsourcenet::error::SourceError;
use rsourcenet::info::ServerInfo;
use rsourcenet::packet::{Engine, MIN_QUERY_PACKET_SIZE};
use rsourcenet::server::GameServer;

const CHALLENGE: i32 = 0x1122_3344;

fn options() -> QueryOptions {
    QueryOptions::default().with_timeout(Duration::from_millis(200))
}

fn challenge_reply() -> Vec<u8> {
    let mut payload = vec![0x41];
    payload.extend_from_slice(&CHALLENGE.to_le_bytes());
    single(&payload)
}

fn info_reply() -> Vec<u8> {
    let mut payload = vec![0x49, 17];
    cstr(&mut payload, "Test Server");
    cstr(&mut payload, "cp_badlands");
    cstr(&mut payload, "tf");
    cstr(&mut payload, "Team Fortress");
    payload.extend_from_slice(&440u16.to_le_bytes());
    payload.extend_from_slice(&[12, 24, 2, b'd', b'l', 1, 1]);
    cstr(&mut payload, "1.0.0.0");
    payload.push(0x80 | 0x20);
    payload.extend_from_slice(&27015u16.to_le_bytes());
    cstr(&mut payload, "payload,cp");
    single(&payload)
}

fn players_reply() -> Vec<u8> {
    let mut payload = vec![0x44, 1, 0];
    cstr(&mut payload, "Soldier");
    payload.extend_from_slice(&7i32.to_le_bytes());
    payload.extend_from_slice(&60.0f32.to_le_bytes());
    single(&payload)
}

fn rules_payload() -> Vec<u8> {
    let mut payload = vec![0x45, 2, 0];
    cstr(&mut payload, "mp_timelimit");
    cstr(&mut payload, "30");
    cstr(&mut payload, "sv_tags");
    cstr(&mut payload, "payload,cp");
    single(&payload)
}

/// Split `payload` into Source split packets of `chunk` bytes, in reverse order.
fn source_split(payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let parts: Vec<&[u8]> = payload.chunks(chunk).collect();
    let mut packets = Vec::new();
    for (number, part) in parts.iter().enumerate() {
        let mut packet = vec![0xFE, 0xFF, 0xFF, 0xFF];
        packet.extend_from_slice(&77i32.to_le_bytes());
        packet.push(parts.len() as u8);
        packet.push(number as u8);
        packet.extend_from_slice(&1248u16.to_le_bytes());
        packet.extend_from_slice(part);
        packets.push(packet);
    }
    packets.reverse();
    packets
}

/// Compress `payload` with bzip2 and split it like srcds does, the first
/// fragment carrying the decompressed size and CRC32.
fn compressed_split(payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    let compressed = encoder.finish().unwrap();

    let parts: Vec<&[u8]> = compressed.chunks(chunk).collect();
    let mut packets = Vec::new();
    for (number, part) in parts.iter().enumerate() {
        let mut packet = vec![0xFE, 0xFF, 0xFF, 0xFF];
        packet.extend_from_slice(&(0x8000_0000u32 | 77).to_le_bytes());
        packet.push(parts.len() as u8);
        packet.push(number as u8);
        packet.extend_from_slice(&1248u16.to_le_bytes());
        if number == 0 {
            packet.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            packet.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        }
        packet.extend_from_slice(part);
        packets.push(packet);
    }
    packets
}

/// The challenge a request carries at `offset`, if it is not -1 or padding.
fn carried_challenge(request: &[u8], offset: usize) -> Option<i32> {
    let value = i32::from_le_bytes(request[offset..offset + 4].try_into().unwrap());
    (value == CHALLENGE).then_some(value)
}

#[tokio::test]
async fn info_answers_challenge() {
    let (addr, requests) = spawn_udp(|request| {
        assert_eq!(request.len(), MIN_QUERY_PACKET_SIZE);
        assert_eq!(&request[4..25], b"TSource Engine Query\0");
        match carried_challenge(request, 25) {
            Some(_) => vec![info_reply()],
            None => vec![challenge_reply()],
        }
    })
    .await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    let info = server.server_info().await.unwrap();

    let info = match info {
        ServerInfo::Source(info) => info,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(info.hostname, "Test Server");
    assert_eq!(info.map, "cp_badlands");
    assert_eq!(info.extra.port, Some(27015));
    assert_eq!(info.extra.keywords.as_deref(), Some("payload,cp"));
    assert_eq!(info.extra.steam_id, None);
    assert_eq!(requests.get(), 2);
}

#[tokio::test]
async fn info_without_challenge() {
    let (addr, requests) = spawn_udp(|_| vec![info_reply()]).await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    assert_eq!(server.server_info().await.unwrap().players(), 12);
    assert_eq!(requests.get(), 1);
}

#[tokio::test]
async fn players_with_challenge() {
    let (addr, requests) = spawn_udp(|request| {
        assert_eq!(request[4], 0x55);
        match carried_challenge(request, 5) {
            Some(_) => vec![players_reply()],
            None => {
                assert_eq!(&request[5..9], &[0xFF; 4]);
                vec![challenge_reply()]
            }
        }
    })
    .await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    let players = server.players().await.unwrap();

    assert_eq!(players.len(), 1);
    assert_eq!(players[0].name, "Soldier");
    assert_eq!(players[0].score, 7);
    assert_eq!(requests.get(), 2);

    // the challenge number is kept for the next query
    server.players().await.unwrap();
    assert_eq!(requests.get(), 3);
}

#[tokio::test]
async fn split_rules_are_reassembled() {
    let (addr, _) = spawn_udp(|request| {
        assert_eq!(request[4], 0x56);
        match carried_challenge(request, 5) {
            Some(_) => source_split(&rules_payload(), 20),
            None => vec![challenge_reply()],
        }
    })
    .await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    let rules = server.rules().await.unwrap();

    assert_eq!(rules.len(), 2);
    assert_eq!(rules["mp_timelimit"], "30");
    assert_eq!(rules["sv_tags"], "payload,cp");
}

#[tokio::test]
async fn compressed_split_rules_are_decompressed() {
    let (addr, _) = spawn_udp(|request| match carried_challenge(request, 5) {
        Some(_) => compressed_split(&rules_payload(), 16),
        None => vec![challenge_reply()],
    })
    .await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    let rules = server.rules().await.unwrap();

    assert_eq!(rules.len(), 2);
    assert_eq!(rules["sv_tags"], "payload,cp");
}

#[tokio::test]
async fn corrupted_compressed_response_is_a_format_error() {
    let (addr, _) = spawn_udp(|request| match carried_challenge(request, 5) {
        Some(_) => {
            let mut packets = compressed_split(&rules_payload(), 16);
            // damage the announced CRC32
            packets[0][16] ^= 0xFF;
            packets
        }
        None => vec![challenge_reply()],
    })
    .await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    let err = server.rules().await.unwrap_err();
    assert!(matches!(err, SourceError::ChecksumMismatch));
    assert!(err.is_format_error());
}

#[tokio::test]
async fn goldsrc_requests_challenge_separately() {
    let (addr, requests) = spawn_udp(|request| match request[4] {
        0x57 => vec![challenge_reply()],
        0x55 if carried_challenge(request, 5).is_some() => vec![players_reply()],
        _ => Vec::new(),
    })
    .await;

    let mut server = GameServer::from_addr(addr, Engine::GoldSrc, options());
    assert_eq!(server.challenge().await.unwrap(), CHALLENGE);
    assert_eq!(server.players().await.unwrap().len(), 1);
    assert_eq!(requests.get(), 2);
}

#[tokio::test]
async fn silent_server_times_out() {
    let (addr, _) = spawn_silent_udp().await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    assert!(matches!(server.server_info().await, Err(SourceError::Timeout)));
    assert!(matches!(server.ping().await, Err(SourceError::Timeout)));
}

#[tokio::test]
async fn ping_measures_round_trip() {
    let (addr, _) = spawn_udp(|_| vec![info_reply()]).await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    assert!(server.ping().await.unwrap() < Duration::from_millis(200));
}

#[tokio::test]
async fn garbage_reply_is_a_format_error() {
    let (addr, _) = spawn_udp(|_| vec![single(&[0x7A, 1, 2, 3])]).await;

    let mut server = GameServer::from_addr(addr, Engine::Source, options());
    let err = server.server_info().await.unwrap_err();
    assert!(err.is_format_error());
}
