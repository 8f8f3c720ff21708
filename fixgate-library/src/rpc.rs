//! The library ⇄ engine RPC wire schema (spec §6): a small set of typed
//! messages, each carrying `library_id` and `correlation_id`, that every
//! engine reply echoes back so the library can resolve its pending-reply
//! map.

use std::io::{Cursor, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use fixgate_core::error::GatewayError;

pub type LibraryId = u32;
pub type CorrelationId = i64;
pub type SessionId = i32;

const VERSION: u8 = 1;

const TYPE_LIBRARY_CONNECT: u8 = 0x01;
const TYPE_INITIATE_CONNECTION: u8 = 0x02;
const TYPE_RELEASE_SESSION: u8 = 0x03;
const TYPE_REQUEST_SESSION: u8 = 0x04;
const TYPE_MANAGE_CONNECTION: u8 = 0x05;
const TYPE_LOGON: u8 = 0x06;
const TYPE_DISCONNECT: u8 = 0x07;
const TYPE_ERROR: u8 = 0x08;
const TYPE_APPLICATION_HEARTBEAT: u8 = 0x09;
const TYPE_REQUEST_SESSION_REPLY: u8 = 0x0A;
const TYPE_RELEASE_SESSION_REPLY: u8 = 0x0B;
const TYPE_CATCHUP: u8 = 0x0C;
const TYPE_NEW_SENT_POSITION: u8 = 0x0D;
const TYPE_NOT_LEADER: u8 = 0x0E;

#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// Sent by the library on its connect loop (spec §4.8).
    LibraryConnect {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        nonce: u64,
    },
    InitiateConnection {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        session_id: SessionId,
    },
    ReleaseSession {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        session_id: SessionId,
    },
    RequestSession {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        session_id: SessionId,
    },
    ManageConnection {
        library_id: LibraryId,
        correlation_id: CorrelationId,
    },
    Logon {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        session_id: SessionId,
    },
    Disconnect {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        session_id: SessionId,
    },
    Error {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        message: String,
    },
    ApplicationHeartbeat {
        library_id: LibraryId,
        correlation_id: CorrelationId,
    },
    RequestSessionReply {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        session_id: SessionId,
    },
    ReleaseSessionReply {
        library_id: LibraryId,
        correlation_id: CorrelationId,
    },
    Catchup {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        position: i64,
    },
    NewSentPosition {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        position: i64,
    },
    /// `channel = None` means "I don't know either"; the library should
    /// rotate to the next configured channel (spec §4.8's redirect rule).
    NotLeader {
        library_id: LibraryId,
        correlation_id: CorrelationId,
        channel: Option<SocketAddr>,
    },
}

impl RpcMessage {
    pub fn library_id(&self) -> LibraryId {
        match *self {
            RpcMessage::LibraryConnect { library_id, .. }
            | RpcMessage::InitiateConnection { library_id, .. }
            | RpcMessage::ReleaseSession { library_id, .. }
            | RpcMessage::RequestSession { library_id, .. }
            | RpcMessage::ManageConnection { library_id, .. }
            | RpcMessage::Logon { library_id, .. }
            | RpcMessage::Disconnect { library_id, .. }
            | RpcMessage::Error { library_id, .. }
            | RpcMessage::ApplicationHeartbeat { library_id, .. }
            | RpcMessage::RequestSessionReply { library_id, .. }
            | RpcMessage::ReleaseSessionReply { library_id, .. }
            | RpcMessage::Catchup { library_id, .. }
            | RpcMessage::NewSentPosition { library_id, .. }
            | RpcMessage::NotLeader { library_id, .. } => library_id,
        }
    }

    /// Every reply echoes the correlation id of the request it resolves
    /// (spec §6).
    pub fn correlation_id(&self) -> CorrelationId {
        match *self {
            RpcMessage::LibraryConnect { correlation_id, .. }
            | RpcMessage::InitiateConnection { correlation_id, .. }
            | RpcMessage::ReleaseSession { correlation_id, .. }
            | RpcMessage::RequestSession { correlation_id, .. }
            | RpcMessage::ManageConnection { correlation_id, .. }
            | RpcMessage::Logon { correlation_id, .. }
            | RpcMessage::Disconnect { correlation_id, .. }
            | RpcMessage::Error { correlation_id, .. }
            | RpcMessage::ApplicationHeartbeat { correlation_id, .. }
            | RpcMessage::RequestSessionReply { correlation_id, .. }
            | RpcMessage::ReleaseSessionReply { correlation_id, .. }
            | RpcMessage::Catchup { correlation_id, .. }
            | RpcMessage::NewSentPosition { correlation_id, .. }
            | RpcMessage::NotLeader { correlation_id, .. } => correlation_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.write_u8(self.type_tag()).unwrap();
        buf.write_u8(VERSION).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(self.library_id()).unwrap();
        buf.write_i64::<LittleEndian>(self.correlation_id()).unwrap();

        match self {
            RpcMessage::LibraryConnect { nonce, .. } => {
                buf.write_u64::<LittleEndian>(*nonce).unwrap();
            }
            RpcMessage::InitiateConnection { session_id, .. }
            | RpcMessage::ReleaseSession { session_id, .. }
            | RpcMessage::RequestSession { session_id, .. }
            | RpcMessage::Logon { session_id, .. }
            | RpcMessage::Disconnect { session_id, .. }
            | RpcMessage::RequestSessionReply { session_id, .. } => {
                buf.write_i32::<LittleEndian>(*session_id).unwrap();
            }
            RpcMessage::ManageConnection { .. } | RpcMessage::ApplicationHeartbeat { .. } | RpcMessage::ReleaseSessionReply { .. } => {}
            RpcMessage::Error { message, .. } => {
                let bytes = message.as_bytes();
                buf.write_u16::<LittleEndian>(bytes.len() as u16).unwrap();
                buf.extend_from_slice(bytes);
            }
            RpcMessage::Catchup { position, .. } | RpcMessage::NewSentPosition { position, .. } => {
                buf.write_i64::<LittleEndian>(*position).unwrap();
            }
            RpcMessage::NotLeader { channel, .. } => match channel {
                Some(SocketAddr::V4(addr)) => {
                    buf.write_u8(1).unwrap();
                    buf.extend_from_slice(&addr.ip().octets());
                    buf.write_u16::<LittleEndian>(addr.port()).unwrap();
                }
                _ => {
                    buf.write_u8(0).unwrap();
                }
            },
        }
        buf
    }

    fn type_tag(&self) -> u8 {
        match self {
            RpcMessage::LibraryConnect { .. } => TYPE_LIBRARY_CONNECT,
            RpcMessage::InitiateConnection { .. } => TYPE_INITIATE_CONNECTION,
            RpcMessage::ReleaseSession { .. } => TYPE_RELEASE_SESSION,
            RpcMessage::RequestSession { .. } => TYPE_REQUEST_SESSION,
            RpcMessage::ManageConnection { .. } => TYPE_MANAGE_CONNECTION,
            RpcMessage::Logon { .. } => TYPE_LOGON,
            RpcMessage::Disconnect { .. } => TYPE_DISCONNECT,
            RpcMessage::Error { .. } => TYPE_ERROR,
            RpcMessage::ApplicationHeartbeat { .. } => TYPE_APPLICATION_HEARTBEAT,
            RpcMessage::RequestSessionReply { .. } => TYPE_REQUEST_SESSION_REPLY,
            RpcMessage::ReleaseSessionReply { .. } => TYPE_RELEASE_SESSION_REPLY,
            RpcMessage::Catchup { .. } => TYPE_CATCHUP,
            RpcMessage::NewSentPosition { .. } => TYPE_NEW_SENT_POSITION,
            RpcMessage::NotLeader { .. } => TYPE_NOT_LEADER,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<RpcMessage, GatewayError> {
        if buf.len() < 14 {
            return Err(GatewayError::Malformed("rpc frame shorter than header".into()));
        }
        let mut cursor = Cursor::new(buf);
        let type_tag = cursor.read_u8().unwrap();
        let version = cursor.read_u8().unwrap();
        let _reserved = cursor.read_u16::<LittleEndian>().unwrap();
        if version != VERSION {
            return Err(GatewayError::Malformed(format!("unsupported rpc frame version {version}")));
        }
        let map_err = |_| GatewayError::Malformed("rpc frame truncated".to_string());
        let library_id = cursor.read_u32::<LittleEndian>().map_err(map_err)?;
        let correlation_id = cursor.read_i64::<LittleEndian>().map_err(map_err)?;

        match type_tag {
            TYPE_LIBRARY_CONNECT => Ok(RpcMessage::LibraryConnect {
                library_id,
                correlation_id,
                nonce: cursor.read_u64::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_INITIATE_CONNECTION => Ok(RpcMessage::InitiateConnection {
                library_id,
                correlation_id,
                session_id: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_RELEASE_SESSION => Ok(RpcMessage::ReleaseSession {
                library_id,
                correlation_id,
                session_id: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_REQUEST_SESSION => Ok(RpcMessage::RequestSession {
                library_id,
                correlation_id,
                session_id: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_MANAGE_CONNECTION => Ok(RpcMessage::ManageConnection { library_id, correlation_id }),
            TYPE_LOGON => Ok(RpcMessage::Logon {
                library_id,
                correlation_id,
                session_id: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_DISCONNECT => Ok(RpcMessage::Disconnect {
                library_id,
                correlation_id,
                session_id: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_ERROR => {
                let len = cursor.read_u16::<LittleEndian>().map_err(map_err)? as usize;
                let start = cursor.position() as usize;
                let end = start + len;
                let bytes = buf.get(start..end).ok_or_else(|| GatewayError::Malformed("rpc error message truncated".into()))?;
                let message = String::from_utf8_lossy(bytes).into_owned();
                Ok(RpcMessage::Error {
                    library_id,
                    correlation_id,
                    message,
                })
            }
            TYPE_APPLICATION_HEARTBEAT => Ok(RpcMessage::ApplicationHeartbeat { library_id, correlation_id }),
            TYPE_REQUEST_SESSION_REPLY => Ok(RpcMessage::RequestSessionReply {
                library_id,
                correlation_id,
                session_id: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_RELEASE_SESSION_REPLY => Ok(RpcMessage::ReleaseSessionReply { library_id, correlation_id }),
            TYPE_CATCHUP => Ok(RpcMessage::Catchup {
                library_id,
                correlation_id,
                position: cursor.read_i64::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_NEW_SENT_POSITION => Ok(RpcMessage::NewSentPosition {
                library_id,
                correlation_id,
                position: cursor.read_i64::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_NOT_LEADER => {
                let present = cursor.read_u8().map_err(map_err)?;
                let channel = if present == 1 {
                    let mut octets = [0u8; 4];
                    cursor.read_exact(&mut octets).map_err(map_err)?;
                    let port = cursor.read_u16::<LittleEndian>().map_err(map_err)?;
                    Some(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
                } else {
                    None
                };
                Ok(RpcMessage::NotLeader {
                    library_id,
                    correlation_id,
                    channel,
                })
            }
            other => Err(GatewayError::Malformed(format!("unknown rpc type tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_heartbeat_roundtrip() {
        let messages = [
            RpcMessage::LibraryConnect {
                library_id: 1,
                correlation_id: 42,
                nonce: 0xDEAD_BEEF,
            },
            RpcMessage::ApplicationHeartbeat {
                library_id: 1,
                correlation_id: 43,
            },
        ];
        for msg in messages {
            let encoded = msg.encode();
            let decoded = RpcMessage::decode(&encoded).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn not_leader_with_channel_roundtrips() {
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let msg = RpcMessage::NotLeader {
            library_id: 7,
            correlation_id: 9,
            channel: Some(addr),
        };
        let decoded = RpcMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn not_leader_without_channel_means_rotate() {
        let msg = RpcMessage::NotLeader {
            library_id: 7,
            correlation_id: 9,
            channel: None,
        };
        let decoded = RpcMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, RpcMessage::NotLeader { library_id: 7, correlation_id: 9, channel: None });
    }

    #[test]
    fn error_message_roundtrips() {
        let msg = RpcMessage::Error {
            library_id: 3,
            correlation_id: 11,
            message: "session not found".to_string(),
        };
        let decoded = RpcMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_type_tag_is_malformed() {
        let mut buf = vec![0xFFu8, VERSION, 0, 0];
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&1i64.to_le_bytes());
        assert!(matches!(RpcMessage::decode(&buf), Err(GatewayError::Malformed(_))));
    }
}
