//! End-to-end runs over loopback TCP

use tempsync::distributed::coordinator::serve;
use tempsync::distributed::{
    recv_message, send_message, Coordinator, CoordinatorSettings, FailureKind, Message,
    Participant, ParticipantSettings, SyncError, TransferError, MESSAGE_LEN,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

fn settings(participants: usize) -> CoordinatorSettings {
    CoordinatorSettings { participants, initial_aggregate: 50.0, tolerance: 1e-3 }
}

async fn listen(participants: usize) -> (TcpListener, String) {
    let coordinator = Coordinator::new(settings(participants), "127.0.0.1:0");
    let listener = coordinator.bind().await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

#[tokio::test]
async fn four_participants_reach_the_same_value() {
    let (listener, addr) = listen(4).await;
    let server = tokio::spawn(serve(settings(4), listener));

    let mut handles = Vec::new();
    for (i, estimate) in [0.0, 10.0, 20.0, 30.0].into_iter().enumerate() {
        let participant = Participant::new(ParticipantSettings {
            id: i as i32 + 1,
            initial_estimate: estimate,
            coordinator: addr.clone(),
        });
        handles.push(tokio::spawn(participant.run()));
    }

    let outcome = server.await.unwrap().unwrap();
    assert!(outcome.rounds > 0);
    assert!(outcome.history.last().unwrap().terminal);

    for handle in handles {
        let participant = handle.await.unwrap().unwrap();
        assert_eq!(participant.final_value.to_bits(), outcome.aggregate.to_bits());
        assert_eq!(participant.rounds, outcome.rounds);
    }
}

#[tokio::test]
async fn raw_socket_peer_speaks_the_wire_format() {
    let (listener, addr) = listen(1).await;
    let server = tokio::spawn(serve(settings(1), listener));

    // Hand-built record: id 1, value 20.0, continue
    let mut record = [0u8; MESSAGE_LEN];
    record[0..4].copy_from_slice(&1i32.to_le_bytes());
    record[8..16].copy_from_slice(&20.0f64.to_le_bytes());

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream.write_all(&record).await.unwrap();

    // (2·50 + 20) / 3
    let reply = recv_message(&mut stream).await.unwrap();
    assert_eq!(reply, Message::broadcast(40.0));

    stream.write_all(&record).await.unwrap();
    let reply = recv_message(&mut stream).await.unwrap();
    assert_eq!(reply, Message::terminal(40.0));

    let outcome = server.await.unwrap().unwrap();
    assert_eq!(outcome.aggregate, 40.0);
}

#[tokio::test]
async fn participant_vanishing_mid_round_is_fatal_for_coordinator() {
    let (listener, addr) = listen(2).await;
    let server = tokio::spawn(serve(settings(2), listener));

    let mut first = TcpStream::connect(&addr).await.unwrap();
    let mut second = TcpStream::connect(&addr).await.unwrap();

    send_message(&mut first, &Message::report(1, 1.0)).await.unwrap();
    second.write_all(&Message::report(2, 2.0).encode()[..5]).await.unwrap();
    drop(second);

    let err = server.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), FailureKind::PeerClosed);
    match err {
        SyncError::Collect { slot, source: TransferError::PeerClosed { transferred, .. }, .. } => {
            assert_eq!(slot, 2);
            assert_eq!(transferred, 5);
        }
        other => panic!("expected Collect error, got {:?}", other),
    }
}

#[tokio::test]
async fn coordinator_vanishing_is_fatal_for_participant() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let fake = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let report = recv_message(&mut stream).await.unwrap();
        assert_eq!(report, Message::report(3, 9.0));
        // Close without answering
    });

    let participant = Participant::new(ParticipantSettings {
        id: 3,
        initial_estimate: 9.0,
        coordinator: addr,
    });
    let err = participant.run().await.unwrap_err();
    fake.await.unwrap();

    assert!(matches!(err, SyncError::Receive { id: 3, round: 0, .. }));
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let err = Coordinator::new(settings(1), addr).run().await.unwrap_err();
    assert!(matches!(err, SyncError::Bind { .. }));
    assert_eq!(err.kind(), FailureKind::Connect);
}
