//! Teeworlds 0.6 connless browser packets.
//!
//! Every connless packet starts with six `0xff` bytes followed by an eight
//! byte message id. The master answers a list request with `lis2` packets made
//! of 18 byte entries, a game server answers an info request with an `inf3`
//! packet made of NUL terminated strings.

use crate::server::{
    Client,
    GameServer,
    ServerInfo,
    ServerMap,
};
use std::net::{
    IpAddr,
    Ipv6Addr,
    SocketAddr,
};

pub const CONNLESS_HEADER: [u8; 6] = [0xff; 6];

pub const GET_LIST: [u8; 8] = *b"\xff\xff\xff\xffreq2";
pub const LIST: [u8; 8] = *b"\xff\xff\xff\xfflis2";
pub const GET_INFO: [u8; 8] = *b"\xff\xff\xff\xffgie3";
pub const INFO: [u8; 8] = *b"\xff\xff\xff\xffinf3";

const PREFIX_LEN: usize = CONNLESS_HEADER.len() + 8;
const LIST_ENTRY_LEN: usize = 18;
const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// Bit of the info flags marking a password protected server.
pub const SERVER_FLAG_PASSWORD: i32 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("expected a {expected} packet")]
    UnexpectedMessage { expected: &'static str },
    #[error("list packet has a truncated entry of {0} bytes")]
    TruncatedEntry(usize),
    #[error("info packet ended before the {0} field")]
    MissingField(&'static str),
    #[error("info packet has an invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("info packet answers token {received}, expected {expected}")]
    TokenMismatch { expected: u8, received: i32 },
}

fn packet(message: [u8; 8], payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PREFIX_LEN + payload.len());
    packet.extend_from_slice(&CONNLESS_HEADER);
    packet.extend_from_slice(&message);
    packet.extend_from_slice(payload);
    packet
}

fn payload<'a>(packet: &'a [u8], message: [u8; 8], expected: &'static str) -> Result<&'a [u8], PacketError> {
    if packet.len() < PREFIX_LEN || packet[..6] != CONNLESS_HEADER || packet[6..PREFIX_LEN] != message {
        return Err(PacketError::UnexpectedMessage { expected });
    }
    Ok(&packet[PREFIX_LEN..])
}

pub fn list_request() -> Vec<u8> {
    packet(GET_LIST, &[])
}

pub fn info_request(token: u8) -> Vec<u8> {
    packet(GET_INFO, &[token])
}

pub fn is_list_response(packet: &[u8]) -> bool {
    payload(packet, LIST, "lis2").is_ok()
}

/// Game server addresses of one `lis2` packet. IPv4 servers are sent as
/// IPv4-mapped IPv6 addresses and come back as plain IPv4.
pub fn parse_list_response(packet: &[u8]) -> Result<Vec<SocketAddr>, PacketError> {
    let entries = payload(packet, LIST, "lis2")?;
    if entries.len() % LIST_ENTRY_LEN != 0 {
        return Err(PacketError::TruncatedEntry(entries.len() % LIST_ENTRY_LEN));
    }

    Ok(entries
        .chunks_exact(LIST_ENTRY_LEN)
        .map(|entry| {
            let (ip, port) = entry.split_at(16);
            let ip = if ip[..12] == IPV4_MAPPED_PREFIX {
                IpAddr::from([ip[12], ip[13], ip[14], ip[15]])
            } else {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(ip);
                IpAddr::V6(Ipv6Addr::from(octets))
            };
            SocketAddr::new(ip, u16::from_be_bytes([port[0], port[1]]))
        })
        .collect())
}

/// Builds a `lis2` packet, the inverse of [`parse_list_response`].
pub fn list_response(addresses: &[SocketAddr]) -> Vec<u8> {
    let mut entries = Vec::with_capacity(addresses.len() * LIST_ENTRY_LEN);
    for address in addresses {
        let octets = match address.ip() {
            IpAddr::V4(ip) => ip.to_ipv6_mapped().octets(),
            IpAddr::V6(ip) => ip.octets(),
        };
        entries.extend_from_slice(&octets);
        entries.extend_from_slice(&address.port().to_be_bytes());
    }
    packet(LIST, &entries)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserClient {
    pub name: String,
    pub clan: String,
    pub country: i32,
    pub score: i32,
    pub is_player: bool,
}

/// Decoded `inf3` packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserInfo {
    pub token: i32,
    pub version: String,
    pub name: String,
    pub map: String,
    pub game_type: String,
    pub flags: i32,
    pub num_players: i32,
    pub max_players: i32,
    pub num_clients: i32,
    pub max_clients: i32,
    pub clients: Vec<BrowserClient>,
}

impl BrowserInfo {
    pub fn passworded(&self) -> bool {
        self.flags & SERVER_FLAG_PASSWORD == SERVER_FLAG_PASSWORD
    }

    pub fn into_game_server(self, address: SocketAddr) -> GameServer {
        let passworded = self.passworded();
        GameServer {
            addresses: vec![address.to_string()],
            location: None,
            info: ServerInfo {
                max_clients: self.max_clients.into(),
                max_players: self.max_players.into(),
                passworded,
                game_type: self.game_type,
                name: self.name,
                map: ServerMap {
                    name: self.map,
                    sha256: None,
                    size: None,
                },
                version: self.version,
                client_score_kind: None,
                clients: self
                    .clients
                    .into_iter()
                    .map(|client| Client {
                        name: client.name,
                        clan: client.clan,
                        country: client.country,
                        score: client.score,
                        is_player: client.is_player,
                        ..Default::default()
                    })
                    .collect(),
            },
        }
    }
}

/// Reads NUL terminated strings off an info payload.
struct Unpacker<'a> {
    rest: &'a [u8],
}

impl<'a> Unpacker<'a> {
    fn new(rest: &'a [u8]) -> Self {
        Self { rest }
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn string(&mut self, field: &'static str) -> Result<String, PacketError> {
        let end = self
            .rest
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(PacketError::MissingField(field))?;
        let value = String::from_utf8_lossy(&self.rest[..end]).into_owned();
        self.rest = &self.rest[end + 1..];
        Ok(value)
    }

    fn int(&mut self, field: &'static str) -> Result<i32, PacketError> {
        let value = self.string(field)?;
        value
            .trim()
            .parse()
            .map_err(|_| PacketError::InvalidField { field, value })
    }
}

pub fn parse_info_response(packet: &[u8]) -> Result<BrowserInfo, PacketError> {
    let mut unpacker = Unpacker::new(payload(packet, INFO, "inf3")?);

    let mut info = BrowserInfo {
        token: unpacker.int("token")?,
        version: unpacker.string("version")?,
        name: unpacker.string("name")?,
        map: unpacker.string("map")?,
        game_type: unpacker.string("game type")?,
        flags: unpacker.int("flags")?,
        num_players: unpacker.int("player count")?,
        max_players: unpacker.int("max players")?,
        num_clients: unpacker.int("client count")?,
        max_clients: unpacker.int("max clients")?,
        clients: Vec::new(),
    };

    let announced = usize::try_from(info.num_clients).map_err(|_| PacketError::InvalidField {
        field: "client count",
        value: info.num_clients.to_string(),
    })?;
    // Servers with many clients truncate the list, only read what was sent.
    while info.clients.len() < announced && !unpacker.is_empty() {
        info.clients.push(BrowserClient {
            name: unpacker.string("client name")?,
            clan: unpacker.string("client clan")?,
            country: unpacker.int("client country")?,
            score: unpacker.int("client score")?,
            is_player: unpacker.int("client is_player")? != 0,
        });
    }

    Ok(info)
}

/// Like [`parse_info_response`] but rejects answers to another request.
pub fn parse_info_response_for(packet: &[u8], token: u8) -> Result<BrowserInfo, PacketError> {
    let info = parse_info_response(packet)?;
    if info.token != i32::from(token) {
        return Err(PacketError::TokenMismatch {
            expected: token,
            received: info.token,
        });
    }
    Ok(info)
}

/// Builds an `inf3` packet from raw fields, used by tests and local fakes.
pub fn info_response(fields: &[&str]) -> Vec<u8> {
    let mut payload = Vec::new();
    for field in fields {
        payload.extend_from_slice(field.as_bytes());
        payload.push(0);
    }
    packet(INFO, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info_fields(flags: &str) -> Vec<&str> {
        vec![
            "7", "0.6.4", "My Server", "dm1", "DM", flags, "2", "16", "2", "16", // clients
            "alice", "clan", "276", "12", "1", "bob", "", "-1", "0", "0",
        ]
    }

    #[test]
    fn requests_carry_header_and_message() {
        assert_eq!(list_request(), b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\xffreq2".to_vec());
        let request = info_request(42);
        assert_eq!(&request[..6], &CONNLESS_HEADER);
        assert_eq!(&request[6..14], b"\xff\xff\xff\xffgie3");
        assert_eq!(request[14], 42);
    }

    #[test]
    fn list_response_decodes_ipv4_and_ipv6() {
        let v4: SocketAddr = "192.0.2.7:8303".parse().unwrap();
        let v6: SocketAddr = "[2001:db8::1]:8305".parse().unwrap();
        let packet = list_response(&[v4, v6]);
        assert_eq!(packet.len(), PREFIX_LEN + 2 * LIST_ENTRY_LEN);

        // IPv4 travels mapped into IPv6
        assert_eq!(&packet[PREFIX_LEN..PREFIX_LEN + 12], &IPV4_MAPPED_PREFIX);
        assert_eq!(&packet[PREFIX_LEN + 16..PREFIX_LEN + 18], &8303u16.to_be_bytes());

        assert_eq!(parse_list_response(&packet).unwrap(), vec![v4, v6]);
    }

    #[test]
    fn list_response_rejects_truncated_entries() {
        let mut packet = list_response(&["192.0.2.7:8303".parse().unwrap()]);
        packet.pop();
        assert_eq!(parse_list_response(&packet), Err(PacketError::TruncatedEntry(17)));
    }

    #[test]
    fn other_messages_are_not_lists() {
        let packet = info_response(&info_fields("0"));
        assert!(!is_list_response(&packet));
        assert_eq!(
            parse_list_response(&packet),
            Err(PacketError::UnexpectedMessage { expected: "lis2" })
        );
        assert!(parse_info_response(&[0xff; 3]).is_err());
    }

    #[test]
    fn info_response_decodes_fields_and_clients() {
        let info = parse_info_response(&info_response(&info_fields("0"))).unwrap();
        assert_eq!(info.token, 7);
        assert_eq!(info.name, "My Server");
        assert_eq!(info.max_clients, 16);
        assert_eq!(
            info.clients,
            vec![
                BrowserClient {
                    name: "alice".to_string(),
                    clan: "clan".to_string(),
                    country: 276,
                    score: 12,
                    is_player: true,
                },
                BrowserClient {
                    name: "bob".to_string(),
                    clan: String::new(),
                    country: -1,
                    score: 0,
                    is_player: false,
                },
            ]
        );
    }

    #[test]
    fn password_flag_is_bit_zero() {
        let address: SocketAddr = "192.0.2.7:8303".parse().unwrap();

        let locked = parse_info_response(&info_response(&info_fields("1"))).unwrap();
        assert!(locked.clone().into_game_server(address).info.passworded);

        let other_bits = parse_info_response(&info_response(&info_fields("6"))).unwrap();
        assert!(!other_bits.into_game_server(address).info.passworded);

        let mixed = parse_info_response(&info_response(&info_fields("3"))).unwrap();
        let server = mixed.into_game_server(address);
        assert!(server.info.passworded);
        assert_eq!(server.addresses, vec!["192.0.2.7:8303".to_string()]);
        assert_eq!(server.info.map.name, "dm1");
        assert_eq!(server.player_count(), 2);
    }

    #[test]
    fn truncated_client_list_keeps_what_arrived() {
        let mut fields = info_fields("0");
        fields.truncate(15);
        let info = parse_info_response(&info_response(&fields)).unwrap();
        assert_eq!(info.num_clients, 2);
        assert_eq!(info.clients.len(), 1);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let mut fields = info_fields("0");
        fields[5] = "x";
        assert_eq!(
            parse_info_response(&info_response(&fields)),
            Err(PacketError::InvalidField {
                field: "flags",
                value: "x".to_string(),
            })
        );
    }

    #[test]
    fn answers_to_other_tokens_are_rejected() {
        let packet = info_response(&info_fields("0"));
        assert!(parse_info_response_for(&packet, 7).is_ok());
        assert_eq!(
            parse_info_response_for(&packet, 8),
            Err(PacketError::TokenMismatch {
                expected: 8,
                received: 7,
            })
        );
    }
}
