//! Wire schema for the five control messages (spec §4.3, §6).
//!
//! Frames share a 4-byte header (`type:u8`, `version:u8 = 1`,
//! `reserved:u16 = 0`) followed by type-specific little-endian fields.
//! Decoding never panics: an unknown type tag or a frame shorter than the
//! declared layout yields [`GatewayError::Malformed`] and the frame is
//! dropped by the caller -- never fatal to the role.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use fixgate_core::error::GatewayError;

use crate::ids::{NodeId, Position, SessionId, Term};

const VERSION: u8 = 1;

const TYPE_REQUEST_VOTE: u8 = 0x01;
const TYPE_REPLY_VOTE: u8 = 0x02;
const TYPE_HEARTBEAT: u8 = 0x03;
const TYPE_ACK: u8 = 0x04;
const TYPE_RESEND: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    RequestVote {
        term: Term,
        candidate_id: NodeId,
        last_position: Position,
    },
    ReplyVote {
        term: Term,
        candidate_id: NodeId,
        voter_id: NodeId,
        granted: bool,
    },
    Heartbeat {
        term: Term,
        leader_id: NodeId,
        session_id: SessionId,
        position: Position,
    },
    Ack {
        term: Term,
        follower_id: NodeId,
        position: Position,
    },
    Resend {
        term: Term,
        leader_id: NodeId,
        start_position: Position,
        length: i32,
    },
}

impl ControlMessage {
    /// Every variant carries `term`, so stale messages can be filtered
    /// uniformly regardless of kind.
    pub fn term(&self) -> Term {
        match *self {
            ControlMessage::RequestVote { term, .. } => term,
            ControlMessage::ReplyVote { term, .. } => term,
            ControlMessage::Heartbeat { term, .. } => term,
            ControlMessage::Ack { term, .. } => term,
            ControlMessage::Resend { term, .. } => term,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        let type_tag = match self {
            ControlMessage::RequestVote { .. } => TYPE_REQUEST_VOTE,
            ControlMessage::ReplyVote { .. } => TYPE_REPLY_VOTE,
            ControlMessage::Heartbeat { .. } => TYPE_HEARTBEAT,
            ControlMessage::Ack { .. } => TYPE_ACK,
            ControlMessage::Resend { .. } => TYPE_RESEND,
        };
        buf.write_u8(type_tag).unwrap();
        buf.write_u8(VERSION).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();

        match *self {
            ControlMessage::RequestVote {
                term,
                candidate_id,
                last_position,
            } => {
                buf.write_i32::<LittleEndian>(term).unwrap();
                buf.write_i16::<LittleEndian>(candidate_id).unwrap();
                buf.write_i64::<LittleEndian>(last_position).unwrap();
            }
            ControlMessage::ReplyVote {
                term,
                candidate_id,
                voter_id,
                granted,
            } => {
                buf.write_i32::<LittleEndian>(term).unwrap();
                buf.write_i16::<LittleEndian>(candidate_id).unwrap();
                buf.write_i16::<LittleEndian>(voter_id).unwrap();
                buf.write_u8(if granted { 1 } else { 0 }).unwrap();
            }
            ControlMessage::Heartbeat {
                term,
                leader_id,
                session_id,
                position,
            } => {
                buf.write_i32::<LittleEndian>(term).unwrap();
                buf.write_i16::<LittleEndian>(leader_id).unwrap();
                buf.write_i32::<LittleEndian>(session_id).unwrap();
                buf.write_i64::<LittleEndian>(position).unwrap();
            }
            ControlMessage::Ack {
                term,
                follower_id,
                position,
            } => {
                buf.write_i32::<LittleEndian>(term).unwrap();
                buf.write_i16::<LittleEndian>(follower_id).unwrap();
                buf.write_i64::<LittleEndian>(position).unwrap();
            }
            ControlMessage::Resend {
                term,
                leader_id,
                start_position,
                length,
            } => {
                buf.write_i32::<LittleEndian>(term).unwrap();
                buf.write_i16::<LittleEndian>(leader_id).unwrap();
                buf.write_i64::<LittleEndian>(start_position).unwrap();
                buf.write_i32::<LittleEndian>(length).unwrap();
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<ControlMessage, GatewayError> {
        if buf.len() < 4 {
            return Err(GatewayError::Malformed("control frame shorter than header".into()));
        }
        let mut cursor = Cursor::new(buf);
        let type_tag = cursor.read_u8().unwrap();
        let version = cursor.read_u8().unwrap();
        let _reserved = cursor.read_u16::<LittleEndian>().unwrap();
        if version != VERSION {
            return Err(GatewayError::Malformed(format!(
                "unsupported control frame version {version}"
            )));
        }

        let map_err = |_| GatewayError::Malformed("control frame truncated".to_string());

        match type_tag {
            TYPE_REQUEST_VOTE => Ok(ControlMessage::RequestVote {
                term: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
                candidate_id: cursor.read_i16::<LittleEndian>().map_err(map_err)?,
                last_position: cursor.read_i64::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_REPLY_VOTE => {
                let term = cursor.read_i32::<LittleEndian>().map_err(map_err)?;
                let candidate_id = cursor.read_i16::<LittleEndian>().map_err(map_err)?;
                let voter_id = cursor.read_i16::<LittleEndian>().map_err(map_err)?;
                let granted = cursor.read_u8().map_err(map_err)? != 0;
                Ok(ControlMessage::ReplyVote {
                    term,
                    candidate_id,
                    voter_id,
                    granted,
                })
            }
            TYPE_HEARTBEAT => Ok(ControlMessage::Heartbeat {
                term: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
                leader_id: cursor.read_i16::<LittleEndian>().map_err(map_err)?,
                session_id: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
                position: cursor.read_i64::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_ACK => Ok(ControlMessage::Ack {
                term: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
                follower_id: cursor.read_i16::<LittleEndian>().map_err(map_err)?,
                position: cursor.read_i64::<LittleEndian>().map_err(map_err)?,
            }),
            TYPE_RESEND => Ok(ControlMessage::Resend {
                term: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
                leader_id: cursor.read_i16::<LittleEndian>().map_err(map_err)?,
                start_position: cursor.read_i64::<LittleEndian>().map_err(map_err)?,
                length: cursor.read_i32::<LittleEndian>().map_err(map_err)?,
            }),
            other => Err(GatewayError::Malformed(format!("unknown control type tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_roundtrips() {
        let messages = [
            ControlMessage::RequestVote {
                term: 4,
                candidate_id: 2,
                last_position: 1000,
            },
            ControlMessage::ReplyVote {
                term: 4,
                candidate_id: 2,
                voter_id: 3,
                granted: true,
            },
            ControlMessage::Heartbeat {
                term: 4,
                leader_id: 1,
                session_id: 99,
                position: 5000,
            },
            ControlMessage::Ack {
                term: 4,
                follower_id: 3,
                position: 5000,
            },
            ControlMessage::Resend {
                term: 4,
                leader_id: 1,
                start_position: 100,
                length: 256,
            },
        ];
        for msg in messages {
            let encoded = msg.encode();
            let decoded = ControlMessage::decode(&encoded).unwrap();
            assert_eq!(decoded, msg);
            assert_eq!(decoded.term(), 4);
        }
    }

    #[test]
    fn unknown_type_tag_is_malformed_not_fatal() {
        let buf = [0xFF, VERSION, 0, 0];
        assert!(matches!(
            ControlMessage::decode(&buf),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let buf = [TYPE_HEARTBEAT, VERSION, 0, 0, 1, 0, 0]; // missing trailing fields
        assert!(matches!(
            ControlMessage::decode(&buf),
            Err(GatewayError::Malformed(_))
        ));
    }
}
