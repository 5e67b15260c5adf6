use std::time::Duration;

use comms::{
    Channel, CommsErr, Frame,
    specs::{Command, DeviceKind, DeviceTag, Reply, TaskKind},
};
use tokio::io;

#[tokio::test]
async fn control_frame_roundtrip() {
    let (one, two) = io::duplex(4096);

    let (_, mut tx) = {
        let (rx, tx) = io::split(one);
        comms::channel(rx, tx)
    };
    let (mut rx, _) = {
        let (rx, tx) = io::split(two);
        comms::channel(rx, tx)
    };

    tx.send(&Command::Task {
        task: TaskKind::Train,
    })
    .await
    .unwrap();

    let cmd: Command = rx.recv().await.unwrap();
    assert_eq!(
        cmd,
        Command::Task {
            task: TaskKind::Train
        }
    );
}

#[tokio::test]
async fn bytes_frame_roundtrip() {
    let (one, two) = io::duplex(4096);
    let (rx1, tx1) = io::split(one);
    let (rx2, tx2) = io::split(two);
    let (_, mut tx) = comms::channel(rx1, tx1);
    let (mut rx, _) = comms::channel(rx2, tx2);

    let payload = vec![0u8, 1, 2, 3, 255];
    tx.send_bytes(&payload).await.unwrap();
    assert_eq!(rx.recv_bytes().await.unwrap(), payload);
}

#[tokio::test]
async fn err_frame_roundtrip() {
    let (one, two) = io::duplex(4096);
    let (rx1, tx1) = io::split(one);
    let (rx2, tx2) = io::split(two);
    let (_, mut tx) = comms::channel(rx1, tx1);
    let (mut rx, _) = comms::channel(rx2, tx2);

    tx.send_err("runtime fault on device cpu0").await.unwrap();
    match rx.recv_frame().await.unwrap() {
        Frame::Err(detail) => assert_eq!(detail, "runtime fault on device cpu0"),
        other => panic!("expected err frame, got {other:?}"),
    }
}

#[tokio::test]
async fn typed_recv_rejects_wrong_kind() {
    let (one, two) = io::duplex(4096);
    let (rx1, tx1) = io::split(one);
    let (rx2, tx2) = io::split(two);
    let (_, mut tx) = comms::channel(rx1, tx1);
    let (mut rx, _) = comms::channel(rx2, tx2);

    tx.send_bytes(&[1, 2, 3]).await.unwrap();
    match rx.recv::<Command>().await {
        Err(CommsErr::Protocol { expected, got }) => {
            assert_eq!(expected, "control frame");
            assert_eq!(got, "bytes");
        }
        other => panic!("expected protocol violation, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_drop_is_channel_death() {
    let (one, two) = io::duplex(4096);
    let (rx1, tx1) = io::split(one);
    let (mut rx, _tx) = comms::channel(rx1, tx1);

    drop(two);

    match rx.recv_frame().await {
        Err(CommsErr::ChannelDeath) => {}
        other => panic!("expected channel death, got {other:?}"),
    }
}

#[tokio::test]
async fn channel_poll_buffers_one_frame() {
    let (coord_end, worker_end) = io::duplex(4096);
    let (crx, ctx) = io::split(coord_end);
    let mut chan = Channel::new(crx, ctx);

    let (_wrx, mut wtx) = {
        let (rx, tx) = io::split(worker_end);
        comms::channel(rx, tx)
    };

    // Nothing sent yet: poll times out without consuming anything.
    assert!(!chan.poll(Duration::from_millis(20)).await.unwrap());

    wtx.send(&Reply::Done).await.unwrap();

    assert!(chan.poll(Duration::from_secs(1)).await.unwrap());
    // A positive poll leaves the frame buffered for recv.
    assert!(chan.poll(Duration::from_millis(1)).await.unwrap());

    let reply: Reply = chan.recv_control().await.unwrap();
    assert_eq!(reply, Reply::Done);
}

#[tokio::test]
async fn channel_death_on_worker_drop() {
    let (coord_end, worker_end) = io::duplex(4096);
    let (crx, ctx) = io::split(coord_end);
    let mut chan = Channel::new(crx, ctx);

    drop(worker_end);

    match chan.poll(Duration::from_secs(1)).await {
        Err(CommsErr::ChannelDeath) => {}
        other => panic!("expected channel death, got {other:?}"),
    }
}

#[test]
fn device_tag_parsing() {
    let tag = DeviceTag::parse("accel1").unwrap();
    assert_eq!(tag.kind, DeviceKind::Accelerator);
    assert_eq!(tag.index, Some(1));
    assert_eq!(tag.resolve(), (1, "accel1".to_string()));

    let tag = DeviceTag::parse("accelerator2").unwrap();
    assert_eq!(tag.resolve(), (2, "accel2".to_string()));

    let tag = DeviceTag::parse("cpuX").unwrap();
    assert_eq!(tag.kind, DeviceKind::Cpu);
    assert_eq!(tag.index, None);
    assert_eq!(tag.resolve(), (0, "cpu0".to_string()));

    assert!(DeviceTag::parse("tpu3").is_err());
    assert!(DeviceTag::parse("cpu").is_err());
}
