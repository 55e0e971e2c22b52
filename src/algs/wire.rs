//! Fixed, versioned, little-endian wire types for the dof resolution protocol.
//!
//! Count headers are plain `Pod` records. Requests and replies have variable
//! length and are written field by field with [`BufMut`] and parsed back with
//! [`Buf`]; every read is length-checked so a truncated payload surfaces as
//! [`DofMapError::MalformedMessage`] instead of a panic.

use crate::data::dof_table::DofPoint;
use crate::dof_error::DofMapError;
use crate::topology::ids::{ElementId, FaceId};
use crate::topology::remote::{RemoteEntity, RemoteTarget};
use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, BytesMut};
use static_assertions::assert_eq_size;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 2;

const KIND_REQUEST: u16 = 1;
const KIND_REPLY: u16 = 2;

const ENTITY_FACE: u8 = 0;
const ENTITY_ELEMENT: u8 = 1;

const ANSWER_UNRESOLVED: u8 = 0;
const ANSWER_RESOLVED: u8 = 1;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // number of messages that follow
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

assert_eq_size!(WireCount, u32);

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// One queried dof: its component, its slot within the carrying entity and
/// the physical location of its dof point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DofQuery {
    pub component: u32,
    pub slot: u32,
    pub point: DofPoint,
}

const QUERY_BYTES: usize = 4 + 4 + 3 * 8;

/// A batch of queries about dofs located on one entity of the receiving rank.
#[derive(Clone, Debug, PartialEq)]
pub struct DofRequest {
    pub seq: u32,
    pub target: RemoteEntity,
    pub queries: Vec<DofQuery>,
}

/// Answer to one [`DofQuery`]. When the responder does not know the cluster
/// index yet, `redirects` lists where it expects the owner to be.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DofAnswer {
    pub cluster: Option<u64>,
    pub redirects: Vec<RemoteTarget>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DofReply {
    pub seq: u32,
    pub answers: Vec<DofAnswer>,
}

fn put_header(buf: &mut BytesMut, kind: u16) {
    buf.put_u16_le(WIRE_VERSION);
    buf.put_u16_le(kind);
}

fn put_entity(buf: &mut BytesMut, entity: RemoteEntity) {
    match entity {
        RemoteEntity::Face(f) => {
            buf.put_u8(ENTITY_FACE);
            buf.put_u64_le(f.get() as u64);
        }
        RemoteEntity::Element(e) => {
            buf.put_u8(ENTITY_ELEMENT);
            buf.put_u64_le(e.get() as u64);
        }
    }
}

/// Length-checked reader over a received payload.
struct Reader<'a> {
    buf: &'a [u8],
    neighbor: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], neighbor: usize) -> Self {
        Self { buf, neighbor }
    }

    fn need(&self, n: usize, what: &str) -> Result<(), DofMapError> {
        if self.buf.remaining() < n {
            return Err(DofMapError::MalformedMessage {
                neighbor: self.neighbor,
                reason: format!(
                    "truncated while reading {what}: need {n} bytes, {} left",
                    self.buf.remaining()
                ),
            });
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> Result<u8, DofMapError> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }
    fn u16(&mut self, what: &str) -> Result<u16, DofMapError> {
        self.need(2, what)?;
        Ok(self.buf.get_u16_le())
    }
    fn u32(&mut self, what: &str) -> Result<u32, DofMapError> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }
    fn u64(&mut self, what: &str) -> Result<u64, DofMapError> {
        self.need(8, what)?;
        Ok(self.buf.get_u64_le())
    }
    fn f64(&mut self, what: &str) -> Result<f64, DofMapError> {
        self.need(8, what)?;
        Ok(self.buf.get_f64_le())
    }

    fn header(&mut self, kind: u16) -> Result<(), DofMapError> {
        let version = self.u16("version")?;
        let got = self.u16("kind")?;
        if version != WIRE_VERSION || got != kind {
            return Err(DofMapError::MalformedMessage {
                neighbor: self.neighbor,
                reason: format!(
                    "unexpected header (version {version}, kind {got}); expected version {WIRE_VERSION}, kind {kind}"
                ),
            });
        }
        Ok(())
    }

    fn entity(&mut self) -> Result<RemoteEntity, DofMapError> {
        let tag = self.u8("entity kind")?;
        let id = self.u64("entity id")? as usize;
        match tag {
            ENTITY_FACE => Ok(RemoteEntity::Face(FaceId::new(id))),
            ENTITY_ELEMENT => Ok(RemoteEntity::Element(ElementId::new(id))),
            other => Err(DofMapError::MalformedMessage {
                neighbor: self.neighbor,
                reason: format!("unknown entity kind {other}"),
            }),
        }
    }

    fn finish(self) -> Result<(), DofMapError> {
        if self.buf.has_remaining() {
            return Err(DofMapError::MalformedMessage {
                neighbor: self.neighbor,
                reason: format!("{} trailing bytes", self.buf.remaining()),
            });
        }
        Ok(())
    }
}

impl DofRequest {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(32 + self.queries.len() * QUERY_BYTES);
        put_header(&mut buf, KIND_REQUEST);
        buf.put_u32_le(self.seq);
        put_entity(&mut buf, self.target);
        buf.put_u32_le(self.queries.len() as u32);
        for q in &self.queries {
            buf.put_u32_le(q.component);
            buf.put_u32_le(q.slot);
            for x in q.point.coords() {
                buf.put_f64_le(x);
            }
        }
        buf
    }

    /// Decode a request received from `neighbor`.
    pub fn decode(raw: &[u8], neighbor: usize) -> Result<Self, DofMapError> {
        let mut r = Reader::new(raw, neighbor);
        r.header(KIND_REQUEST)?;
        let seq = r.u32("sequence number")?;
        let target = r.entity()?;
        let n = r.u32("query count")? as usize;
        let mut queries = Vec::with_capacity(n.min(raw.len() / QUERY_BYTES + 1));
        for _ in 0..n {
            let component = r.u32("component")?;
            let slot = r.u32("slot")?;
            let x = r.f64("x")?;
            let y = r.f64("y")?;
            let z = r.f64("z")?;
            queries.push(DofQuery {
                component,
                slot,
                point: DofPoint::new([x, y, z]),
            });
        }
        r.finish()?;
        Ok(Self {
            seq,
            target,
            queries,
        })
    }
}

impl DofReply {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(16 + self.answers.len() * 16);
        put_header(&mut buf, KIND_REPLY);
        buf.put_u32_le(self.seq);
        buf.put_u32_le(self.answers.len() as u32);
        for a in &self.answers {
            match a.cluster {
                Some(c) => {
                    buf.put_u8(ANSWER_RESOLVED);
                    buf.put_u64_le(c);
                }
                None => {
                    buf.put_u8(ANSWER_UNRESOLVED);
                    buf.put_u64_le(0);
                }
            }
            buf.put_u32_le(a.redirects.len() as u32);
            for t in &a.redirects {
                buf.put_u32_le(t.rank as u32);
                put_entity(&mut buf, t.entity);
            }
        }
        buf
    }

    /// Decode a reply received from `neighbor`.
    pub fn decode(raw: &[u8], neighbor: usize) -> Result<Self, DofMapError> {
        let mut r = Reader::new(raw, neighbor);
        r.header(KIND_REPLY)?;
        let seq = r.u32("sequence number")?;
        let n = r.u32("answer count")? as usize;
        let mut answers = Vec::with_capacity(n.min(raw.len() / 13 + 1));
        for _ in 0..n {
            let flag = r.u8("answer flag")?;
            let value = r.u64("cluster index")?;
            let cluster = match flag {
                ANSWER_RESOLVED => Some(value),
                ANSWER_UNRESOLVED => None,
                other => {
                    return Err(DofMapError::MalformedMessage {
                        neighbor,
                        reason: format!("unknown answer flag {other}"),
                    });
                }
            };
            let n_redirects = r.u32("redirect count")? as usize;
            let mut redirects = Vec::with_capacity(n_redirects.min(8));
            for _ in 0..n_redirects {
                let rank = r.u32("redirect rank")? as usize;
                let entity = r.entity()?;
                redirects.push(RemoteTarget { rank, entity });
            }
            answers.push(DofAnswer { cluster, redirects });
        }
        r.finish()?;
        Ok(Self { seq, answers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_survives_encoding() {
        let req = DofRequest {
            seq: 3,
            target: RemoteEntity::Face(FaceId::new(17)),
            queries: vec![
                DofQuery {
                    component: 0,
                    slot: 0,
                    point: DofPoint::new([0.5, -1.0, 0.0]),
                },
                DofQuery {
                    component: 2,
                    slot: 1,
                    point: DofPoint::new([1e-12, 2.0, 3.25]),
                },
            ],
        };
        let bytes = req.encode();
        assert_eq!(DofRequest::decode(&bytes, 1).unwrap(), req);
    }

    #[test]
    fn reply_with_redirects_survives_encoding() {
        let reply = DofReply {
            seq: 0,
            answers: vec![
                DofAnswer {
                    cluster: Some(42),
                    redirects: vec![],
                },
                DofAnswer {
                    cluster: None,
                    redirects: vec![RemoteTarget {
                        rank: 0,
                        entity: RemoteEntity::Element(ElementId::new(9)),
                    }],
                },
            ],
        };
        let bytes = reply.encode();
        assert_eq!(DofReply::decode(&bytes, 0).unwrap(), reply);
    }

    #[test]
    fn truncated_request_is_rejected() {
        let req = DofRequest {
            seq: 1,
            target: RemoteEntity::Face(FaceId::new(2)),
            queries: vec![DofQuery {
                component: 0,
                slot: 0,
                point: DofPoint::new([1.0, 2.0, 3.0]),
            }],
        };
        let bytes = req.encode();
        let err = DofRequest::decode(&bytes[..bytes.len() - 3], 4).unwrap_err();
        assert!(matches!(err, DofMapError::MalformedMessage { neighbor: 4, .. }));
    }

    #[test]
    fn reply_is_not_a_request() {
        let reply = DofReply {
            seq: 0,
            answers: vec![],
        };
        assert!(DofRequest::decode(&reply.encode(), 0).is_err());
    }

    #[test]
    fn exact_len() {
        assert!(expect_exact_len(3, 4).is_err());
        assert!(expect_exact_len(4, 4).is_ok());
    }
}
