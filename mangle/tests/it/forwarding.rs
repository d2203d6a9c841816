use mangle::Direction;
use rand::Rng;

use crate::daemon::Daemon;

/// Declares a MAC rewrite from eth0 to eth1.
async fn mac_rewrite(daemon: &mut Daemon) {
    daemon
        .send(
            "field add mac_dst offt=eth.dst len=6\n\
             field add any offt=0 len=0\n\
             iface add eth0\n\
             iface add eth1\n\
             rule add r1 match mac_dst=any:any write mac_dst=mac_dst:0a:00:27:00:00:00\n\
             process add eth0 r1:eth1\n",
        )
        .await;
    daemon.skip(6).await;
}

#[tokio::test]
async fn rewrites_and_forwards() {
    let mut daemon = Daemon::start();
    mac_rewrite(&mut daemon).await;

    daemon.inject("eth0", &[0u8; 6]).await;
    daemon.inject("eth0", &[0xff; 14]).await;

    let sent = daemon.hub.take_sent("eth1");
    assert_eq!(sent.len(), 2);
    assert_eq!(&sent[0][..], &[0x0a, 0x00, 0x27, 0x00, 0x00, 0x00]);
    assert_eq!(&sent[1][..6], &[0x0a, 0x00, 0x27, 0x00, 0x00, 0x00]);
    assert_eq!(&sent[1][6..], &[0xff; 8]);

    // Too short for the write: dropped, not forwarded.
    daemon.inject("eth0", &[0u8; 4]).await;
    assert!(daemon.hub.sent("eth1").is_empty());

    assert_eq!(
        daemon.show("iface show", 2).await,
        vec![
            r#"- {"show":{"iface":"eth0","rx":3,"tx":0,"drop":1,"egress":0,"refs":1}}"#,
            r#"- {"show":{"iface":"eth1","rx":0,"tx":2,"drop":0,"egress":0,"refs":1}}"#,
        ]
    );
    assert_eq!(daemon.stats.forwarded(), 2);

    daemon.stop().await;
}

#[tokio::test]
async fn first_matching_route_wins() {
    let mut daemon = Daemon::start();

    daemon
        .send(
            "field add proto offt=ip.proto len=1\n\
             field add flags offt=tcp.flags len=1 mask=0x12\n\
             iface add in\n\
             iface add syn\n\
             iface add tcp\n\
             rule add syn match proto=proto:6 match flags=flags:0x02\n\
             rule add tcp match proto=proto:6\n\
             process add in syn:syn tcp:tcp\n",
        )
        .await;
    daemon.skip(8).await;

    let mut packet = [0u8; 64];
    packet[23] = 6;

    // SYN, with unrelated flag bits set.
    packet[47] = 0x02 | 0x08;
    daemon.inject("in", &packet).await;

    // SYN-ACK: the ack bit is inside the mask.
    packet[47] = 0x12;
    daemon.inject("in", &packet).await;

    // UDP goes nowhere.
    packet[23] = 17;
    daemon.inject("in", &packet).await;

    assert_eq!(daemon.hub.sent("syn").len(), 1);
    assert_eq!(daemon.hub.sent("tcp").len(), 1);
    assert_eq!(
        daemon.show("process show in", 1).await,
        vec![r#"- {"show":{"process":"in","routes":["syn:syn","tcp:tcp"],"hits":[1,1]}}"#]
    );

    daemon.stop().await;
}

#[tokio::test]
async fn egress_and_unbound_frames_are_not_dispatched() {
    let mut daemon = Daemon::start();
    mac_rewrite(&mut daemon).await;

    daemon.inject_as("eth0", Direction::Egress, &[0u8; 6]).await;
    // eth1 has no process.
    daemon.inject("eth1", &[0u8; 6]).await;

    assert!(daemon.hub.sent("eth1").is_empty());
    assert_eq!(
        daemon.show("iface show", 2).await,
        vec![
            r#"- {"show":{"iface":"eth0","rx":0,"tx":0,"drop":0,"egress":1,"refs":1}}"#,
            r#"- {"show":{"iface":"eth1","rx":1,"tx":0,"drop":1,"egress":0,"refs":1}}"#,
        ]
    );

    daemon.stop().await;
}

#[tokio::test]
async fn failed_send_drops() {
    let mut daemon = Daemon::start();
    mac_rewrite(&mut daemon).await;

    daemon.hub.set_down("eth1", true);
    daemon.inject("eth0", &[0u8; 6]).await;
    assert!(daemon.hub.sent("eth1").is_empty());
    assert_eq!(daemon.stats.forwarded(), 0);

    daemon.hub.set_down("eth1", false);
    daemon.inject("eth0", &[0u8; 6]).await;
    assert_eq!(daemon.hub.sent("eth1").len(), 1);

    daemon.stop().await;
}

#[tokio::test]
async fn state_swaps_between_packets() {
    let mut daemon = Daemon::start();

    // Each packet leaves with the source port of the previous one.
    daemon
        .send(
            "field add sport offt=udp.sport len=2\n\
             iface add eth0\n\
             rule add swap write sport@tmp=sport@prev write sport@prev=sport write sport=sport@tmp\n\
             process add eth0 swap:eth0\n",
        )
        .await;
    daemon.skip(4).await;

    let mut packet = [0u8; 42];
    for port in [0x1234u16, 0x5678, 0x9abc] {
        packet[34..36].copy_from_slice(&port.to_be_bytes());
        daemon.inject("eth0", &packet).await;
    }

    let ports: Vec<[u8; 2]> = daemon.hub.sent("eth0").iter().map(|frame| [frame[34], frame[35]]).collect();
    assert_eq!(ports, vec![[0, 0], [0x12, 0x34], [0x56, 0x78]]);

    assert_eq!(
        daemon.show("state show prev", 1).await,
        vec![r#"- {"show":{"state":"prev","len":2,"value":"0x9abc","refs":2}}"#]
    );

    daemon.stop().await;
}

#[tokio::test]
async fn masked_bits_are_preserved() {
    let mut daemon = Daemon::start();

    daemon
        .send(
            "field add tos offt=ip.tos len=1 mask=0xfc\n\
             iface add eth0\n\
             iface add eth1\n\
             rule add dscp write tos=tos:0xb8\n\
             process add eth0 dscp:eth1\n",
        )
        .await;
    daemon.skip(5).await;

    let mut rng = rand::thread_rng();
    for _ in 0..32 {
        let mut packet = [0u8; 20];
        rng.fill(&mut packet[..]);
        daemon.inject("eth0", &packet).await;

        let sent = daemon.hub.take_sent("eth1");
        let out = &sent[0];

        // DSCP rewritten, ECN bits kept, everything else untouched.
        assert_eq!(out[15], 0xb8 | (packet[15] & 0x03));
        assert_eq!(&out[..15], &packet[..15]);
        assert_eq!(&out[16..], &packet[16..]);
    }

    daemon.stop().await;
}
