use dof_cluster::algs::communicator::{CommTag, Communicator, NoComm, ThreadComm, Wait};
use dof_cluster::algs::exchange_counts;
use dof_cluster::DofMapError;

#[test]
fn thread_comm_fifo_order() {
    let tag = CommTag::new(0x1001);
    let world = ThreadComm::world(2);
    for i in 0..10u8 {
        world[0].isend(1, tag.base(), &[i]);
    }
    let out: Vec<u8> = (0..10)
        .map(|_| world[1].irecv(0, tag.base()).wait().unwrap()[0])
        .collect();
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
fn receive_posted_before_send_completes() {
    let tag = CommTag::new(0x1002);
    let world = ThreadComm::world(2);
    std::thread::scope(|s| {
        let rx = s.spawn(|| world[1].irecv(0, tag.as_u16()).wait());
        world[0].isend(1, tag.as_u16(), b"late");
        assert_eq!(rx.join().unwrap().as_deref(), Some(&b"late"[..]));
    });
}

#[test]
fn no_comm_has_nothing_to_receive() {
    let comm = NoComm;
    assert_eq!(comm.rank(), 0);
    assert_eq!(comm.size(), 1);
    assert!(comm.irecv(0, 123).wait().is_none());
    assert_eq!(comm.allgather_u64(5).unwrap(), vec![5]);
    assert_eq!(exchange_counts(&[0], &comm, CommTag::new(0x10)).unwrap(), vec![0]);
}

#[test]
fn malformed_count_is_reported_and_sends_drain() {
    let tag = CommTag::new(0x12);
    let world = ThreadComm::world(3);
    // rank 1 sends a 3-byte count, rank 2 a proper one
    world[1].isend(0, tag.as_u16(), &[1, 2, 3]);
    world[2].isend(0, tag.as_u16(), &4u32.to_le_bytes());

    let err = exchange_counts(&[0, 1, 1], &world[0], tag).unwrap_err();
    assert_eq!(
        err,
        DofMapError::BufferSizeMismatch {
            neighbor: 1,
            expected: 4,
            got: 3
        }
    );
    // rank 0 still delivered its counts to both peers
    assert_eq!(world[1].irecv(0, tag.as_u16()).wait().unwrap().len(), 4);
    assert_eq!(world[2].irecv(0, tag.as_u16()).wait().unwrap().len(), 4);
}
