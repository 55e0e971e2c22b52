//! Stage 1 of every ghost-resolution round: tell each peer how many messages follow.
//!
//! Every rank sends one [`WireCount`] to every other rank, so a responder
//! learns how many requests to expect without knowing in advance who will
//! ask. All handles are drained before returning, even on error.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, expect_exact_len};
use crate::dof_error::DofMapError;

/// Exchange per-peer message counts with every other rank.
///
/// `outgoing[p]` is the number of messages this rank will send to `p`; the
/// entry for this rank is ignored. Returns `incoming[p]`, the number of
/// messages `p` will send here (zero for this rank).
///
/// Sends are posted before receives, so backends whose receives block make
/// progress.
pub fn exchange_counts<C: Communicator>(
    outgoing: &[usize],
    comm: &C,
    tag: CommTag,
) -> Result<Vec<usize>, DofMapError> {
    let me = comm.rank();
    let size = comm.size();
    if outgoing.len() != size {
        return Err(DofMapError::MissingRankCounts {
            expected: size,
            got: outgoing.len(),
        });
    }

    // 1) post all sends
    let mut pending_sends = Vec::with_capacity(size.saturating_sub(1));
    for peer in (0..size).filter(|&p| p != me) {
        let count = WireCount::new(outgoing[peer]);
        pending_sends.push(comm.isend(peer, tag.as_u16(), bytemuck::bytes_of(&count)));
    }

    // 2) post all receives
    let recvs: Vec<(usize, C::RecvHandle)> = (0..size)
        .filter(|&p| p != me)
        .map(|peer| (peer, comm.irecv(peer, tag.as_u16())))
        .collect();

    // 3) wait for all receives, keeping the first error
    let mut incoming = vec![0usize; size];
    let mut maybe_err = None;
    for (peer, h) in recvs {
        match h.wait() {
            Some(data) => {
                let len_check = expect_exact_len(data.len(), std::mem::size_of::<WireCount>());
                match len_check {
                    Ok(()) => {
                        let cnt: WireCount = bytemuck::pod_read_unaligned(&data);
                        incoming[peer] = cnt.get();
                    }
                    Err(_) if maybe_err.is_none() => {
                        maybe_err = Some(DofMapError::BufferSizeMismatch {
                            neighbor: peer,
                            expected: std::mem::size_of::<WireCount>(),
                            got: data.len(),
                        });
                    }
                    Err(_) => {}
                }
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(DofMapError::CommError {
                    neighbor: peer,
                    reason: "failed to receive message count".into(),
                });
            }
            None => {}
        }
    }

    // 4) always drain the sends
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(incoming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};

    #[test]
    fn counts_reach_their_peers() {
        let world = ThreadComm::world(3);
        let results: Vec<Vec<usize>> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let r = comm.rank();
                        let outgoing: Vec<usize> = (0..3).map(|p| 10 * r + p).collect();
                        exchange_counts(&outgoing, comm, CommTag::new(7)).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0], vec![0, 10, 20]);
        assert_eq!(results[1], vec![1, 0, 21]);
        assert_eq!(results[2], vec![2, 12, 0]);
    }

    #[test]
    fn single_rank_has_no_peers() {
        assert_eq!(exchange_counts(&[5], &NoComm, CommTag::new(1)).unwrap(), vec![0]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = exchange_counts(&[1, 2], &NoComm, CommTag::new(1)).unwrap_err();
        assert_eq!(err, DofMapError::MissingRankCounts { expected: 1, got: 2 });
    }
}
