//! Ghost-dof resolution rounds.
//!
//! Each round batches the still-unresolved ghost dofs per `(rank, entity)`
//! into one request, exchanges per-peer message counts, ships the requests,
//! answers the requests addressed to this rank, and applies the replies.
//! Dofs are identified across ranks by their dof point, component and slot.
//! A responder that does not know a cluster index yet redirects the
//! requester to the owner recorded in its own ownership map; redirects are
//! followed to the lowest rank not queried before for that dof.
//!
//! Integrity violations found while answering or applying replies do not
//! leave peers blocked: every rank drains the round, the failure count is
//! summed across ranks, and all ranks return an error together.

use crate::algs::communicator::{Communicator, Wait};
use crate::algs::size_exchange::exchange_counts;
use crate::algs::wire::{DofAnswer, DofQuery, DofReply, DofRequest};
use crate::data::dof_table::LocalDofTable;
use crate::dof_error::DofMapError;
use crate::dofmap::config::DofTableConfig;
use crate::topology::ids::DofId;
use crate::topology::ownership::DofOwnership;
use crate::topology::remote::{RemoteEntity, RemoteTarget};
use std::collections::{BTreeMap, BTreeSet};

/// A ghost dof waiting for its cluster index.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingDof {
    pub dof: DofId,
    /// Where the next request goes.
    pub target: RemoteTarget,
    pub query: DofQuery,
    /// Ranks already asked about this dof, this rank included.
    visited: BTreeSet<usize>,
}

impl PendingDof {
    pub fn new(dof: DofId, target: RemoteTarget, query: DofQuery, my_rank: usize) -> Self {
        Self {
            dof,
            target,
            query,
            visited: BTreeSet::from([my_rank]),
        }
    }

    pub fn visited(&self) -> &BTreeSet<usize> {
        &self.visited
    }

    /// Consume one answer. Returns the dof again when it must be asked elsewhere.
    fn apply(
        mut self,
        answer: DofAnswer,
        clusters: &mut [Option<u64>],
        my_rank: usize,
    ) -> Result<Option<PendingDof>, DofMapError> {
        if let Some(cluster) = answer.cluster {
            let len = clusters.len();
            let slot = clusters
                .get_mut(self.dof.get())
                .ok_or(DofMapError::DofOutOfRange {
                    rank: my_rank,
                    dof: self.dof.get(),
                    len,
                })?;
            *slot = Some(cluster);
            return Ok(None);
        }
        self.visited.insert(self.target.rank);
        let next = answer
            .redirects
            .into_iter()
            .filter(|t| !self.visited.contains(&t.rank))
            .min();
        match next {
            Some(target) => {
                log::trace!(
                    "rank {my_rank}: {} redirected from rank {} to rank {} ({})",
                    self.dof,
                    self.target.rank,
                    target.rank,
                    target.entity
                );
                self.target = target;
                Ok(Some(self))
            }
            None => Err(DofMapError::RedirectExhausted {
                rank: my_rank,
                dof: self.dof.get(),
            }),
        }
    }
}

/// Find the local dof matching `query` on `entity` by linear search over its
/// dof points. The slot separates dofs sharing one point.
pub fn locate_dof<T: LocalDofTable>(
    table: &T,
    rank: usize,
    entity: RemoteEntity,
    query: &DofQuery,
    tolerance: f64,
) -> Result<DofId, DofMapError> {
    let component = query.component as usize;
    let slot = query.slot as usize;
    let n = match entity {
        RemoteEntity::Face(f) => table.n_face_dofs(f)?,
        RemoteEntity::Element(e) => table.n_element_dofs(e)?,
    };
    for local in 0..n {
        let found = match entity {
            RemoteEntity::Face(f) => table.face_local_to_global(f, local, component)?,
            RemoteEntity::Element(e) => table.element_local_to_global(e, local, component)?,
        };
        if table.dof_slot(found.dof)? == slot
            && table.dof_point(found.dof)?.matches(&query.point, tolerance)
        {
            return Ok(found.dof);
        }
    }
    let err = DofMapError::DofPointNotFound {
        rank,
        entity: entity.to_string(),
        component,
        slot,
        coords: query.point.coords(),
    };
    log::error!("{err}");
    Err(err)
}

/// Counters accumulated over all rounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProtocolStats {
    pub rounds: usize,
    pub requests_sent: usize,
    pub queries_sent: usize,
    pub requests_answered: usize,
    pub redirects_followed: usize,
}

pub struct GhostPass<'a, C, T> {
    comm: &'a C,
    table: &'a T,
    ownership: &'a DofOwnership,
    config: &'a DofTableConfig,
    next_seq: Vec<u32>,
    stats: ProtocolStats,
}

type Batch = (DofRequest, Vec<PendingDof>);

impl<'a, C, T> GhostPass<'a, C, T>
where
    C: Communicator,
    T: LocalDofTable,
{
    pub fn new(
        comm: &'a C,
        table: &'a T,
        ownership: &'a DofOwnership,
        config: &'a DofTableConfig,
    ) -> Self {
        Self {
            comm,
            table,
            ownership,
            config,
            next_seq: vec![0; comm.size()],
            stats: ProtocolStats::default(),
        }
    }

    /// Run rounds until no rank has pending dofs. Every rank must call this.
    pub fn run(
        mut self,
        clusters: &mut [Option<u64>],
        mut pending: Vec<PendingDof>,
    ) -> Result<ProtocolStats, DofMapError> {
        let me = self.comm.rank();
        let cap = self.config.round_cap(self.comm.size());
        loop {
            let total = self.comm.allreduce_sum_u64(pending.len() as u64)?;
            if total == 0 {
                break;
            }
            if self.stats.rounds >= cap {
                let err = DofMapError::RoundLimitExceeded {
                    rank: me,
                    rounds: self.stats.rounds,
                    pending: total,
                };
                log::error!("{err}");
                return Err(err);
            }
            self.stats.rounds += 1;
            log::debug!(
                "rank {me}: ghost round {} with {} local / {total} global pending dofs",
                self.stats.rounds,
                pending.len()
            );
            pending = self.round(clusters, pending)?;
        }
        Ok(self.stats)
    }

    fn batch(&mut self, pending: Vec<PendingDof>) -> Vec<Vec<Batch>> {
        let mut by_target: BTreeMap<RemoteTarget, Vec<PendingDof>> = BTreeMap::new();
        for p in pending {
            by_target.entry(p.target).or_default().push(p);
        }
        let mut per_peer: Vec<Vec<Batch>> = (0..self.comm.size()).map(|_| Vec::new()).collect();
        for (target, dofs) in by_target {
            let seq = self.next_seq[target.rank];
            self.next_seq[target.rank] = seq.wrapping_add(1);
            let request = DofRequest {
                seq,
                target: target.entity,
                queries: dofs.iter().map(|p| p.query).collect(),
            };
            per_peer[target.rank].push((request, dofs));
        }
        per_peer
    }

    fn answer(&self, request: &DofRequest, clusters: &[Option<u64>]) -> Result<DofReply, DofMapError> {
        let me = self.comm.rank();
        let answers = request
            .queries
            .iter()
            .map(|q| {
                let dof = locate_dof(self.table, me, request.target, q, self.config.tolerance)?;
                Ok(match clusters.get(dof.get()).copied().flatten() {
                    Some(cluster) => DofAnswer {
                        cluster: Some(cluster),
                        redirects: Vec::new(),
                    },
                    None => DofAnswer {
                        cluster: None,
                        redirects: self.ownership.remote(dof).into_iter().collect(),
                    },
                })
            })
            .collect::<Result<Vec<_>, DofMapError>>()?;
        Ok(DofReply {
            seq: request.seq,
            answers,
        })
    }

    fn apply_reply(
        &mut self,
        peer: usize,
        request: &DofRequest,
        raw: Option<Vec<u8>>,
        dofs: Vec<PendingDof>,
        clusters: &mut [Option<u64>],
        next: &mut Vec<PendingDof>,
    ) -> Result<(), DofMapError> {
        let raw = raw.ok_or_else(|| DofMapError::CommError {
            neighbor: peer,
            reason: "failed to receive reply".into(),
        })?;
        let reply = DofReply::decode(&raw, peer)?;
        if reply.seq != request.seq {
            return Err(DofMapError::SequenceMismatch {
                neighbor: peer,
                expected: request.seq,
                got: reply.seq,
            });
        }
        if reply.answers.len() != dofs.len() {
            return Err(DofMapError::AnswerCountMismatch {
                neighbor: peer,
                expected: dofs.len(),
                got: reply.answers.len(),
            });
        }
        let me = self.comm.rank();
        for (p, answer) in dofs.into_iter().zip(reply.answers) {
            if let Some(again) = p.apply(answer, clusters, me)? {
                self.stats.redirects_followed += 1;
                next.push(again);
            }
        }
        Ok(())
    }

    fn round(
        &mut self,
        clusters: &mut [Option<u64>],
        pending: Vec<PendingDof>,
    ) -> Result<Vec<PendingDof>, DofMapError> {
        let comm = self.comm;
        let tags = self.config.tags;
        let me = comm.rank();
        let size = comm.size();
        let per_peer = self.batch(pending);

        // 1) message counts
        let outgoing: Vec<usize> = per_peer.iter().map(Vec::len).collect();
        let incoming = exchange_counts(&outgoing, comm, tags.counts)?;

        // 2) requests
        let mut pending_sends = Vec::new();
        for (peer, batches) in per_peer.iter().enumerate() {
            for (request, _) in batches {
                pending_sends.push(comm.isend(peer, tags.requests.as_u16(), &request.encode()));
                self.stats.requests_sent += 1;
                self.stats.queries_sent += request.queries.len();
            }
        }

        // 3) answer what others asked; always reply so no peer blocks
        let mut failure: Option<DofMapError> = None;
        let known: &[Option<u64>] = clusters;
        for peer in (0..size).filter(|&p| p != me) {
            for _ in 0..incoming[peer] {
                let raw = comm.irecv(peer, tags.requests.as_u16()).wait();
                let reply = raw
                    .ok_or_else(|| DofMapError::CommError {
                        neighbor: peer,
                        reason: "failed to receive request".into(),
                    })
                    .and_then(|raw| DofRequest::decode(&raw, peer))
                    .and_then(|request| self.answer(&request, known));
                let reply = match reply {
                    Ok(reply) => reply,
                    Err(err) => {
                        failure.get_or_insert(err);
                        DofReply {
                            seq: u32::MAX,
                            answers: Vec::new(),
                        }
                    }
                };
                pending_sends.push(comm.isend(peer, tags.responses.as_u16(), &reply.encode()));
                self.stats.requests_answered += 1;
            }
        }

        // 4) replies to our own requests, in the order the requests were sent
        let mut next = Vec::new();
        for (peer, batches) in per_peer.into_iter().enumerate() {
            for (request, dofs) in batches {
                let raw = comm.irecv(peer, tags.responses.as_u16()).wait();
                if failure.is_some() {
                    continue;
                }
                if let Err(err) = self.apply_reply(peer, &request, raw, dofs, clusters, &mut next) {
                    failure = Some(err);
                }
            }
        }

        // 5) drain sends before the round ends
        for send in pending_sends {
            let _ = send.wait();
        }

        let failed = comm.allreduce_sum_u64(u64::from(failure.is_some()))?;
        if failed > 0 {
            let err = failure.unwrap_or(DofMapError::PeerFailure { rank: me, failed });
            log::error!("rank {me}: ghost resolution failed: {err}");
            return Err(err);
        }
        Ok(next)
    }
}
