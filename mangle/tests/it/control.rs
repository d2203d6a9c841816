use mangle::{EngineOptions, Redefine};

use crate::daemon::Daemon;

#[tokio::test]
async fn field_lifecycle() {
    let mut daemon = Daemon::start();

    assert_eq!(daemon.command("field add mac_dst offt=0 len=6").await, r#"- {"add":{"field":"mac_dst","offt":0,"len":6}}"#);
    assert_eq!(
        daemon.command("field add flags offt=tcp.flags len=1 mask=0x0f").await,
        r#"- {"add":{"field":"flags","offt":47,"len":1,"mask":"0x0f"}}"#
    );

    // Same shape again is accepted, a different one is not.
    assert_eq!(daemon.command("field add mac_dst offt=0 len=6 mask=0xff").await, r#"- {"add":{"field":"mac_dst","offt":0,"len":6}}"#);
    assert_eq!(
        daemon.command("field add mac_dst offt=6 len=6").await,
        r#"- {"error":{"kind":"conflict","cmd":"field add mac_dst offt=6 len=6","msg":"field \"mac_dst\" already exists with a different shape"}}"#
    );

    assert_eq!(
        daemon.show("field show", 2).await,
        vec![
            r#"- {"show":{"field":"flags","offt":47,"len":1,"mask":"0x0f","refs":0}}"#,
            r#"- {"show":{"field":"mac_dst","offt":0,"len":6,"refs":0}}"#,
        ]
    );

    assert_eq!(daemon.command("field del flags").await, r#"- {"del":{"field":"flags"}}"#);
    assert_eq!(
        daemon.command("field del flags").await,
        r#"- {"error":{"kind":"not_found","cmd":"field del flags","msg":"field \"flags\" not found"}}"#
    );

    assert!(daemon.stop().await.is_clean());
}

#[tokio::test]
async fn names_are_always_strings() {
    let mut daemon = Daemon::start();

    for name in ["True", "null", "1e3", "0x10"] {
        assert_eq!(
            daemon.command(&format!("field add {name} offt=0 len=1")).await,
            format!(r#"- {{"add":{{"field":"{name}","offt":0,"len":1}}}}"#)
        );
    }
    assert_eq!(daemon.command("iface add 123").await, r#"- {"add":{"iface":"123"}}"#);

    daemon.stop().await;
}

#[tokio::test]
async fn overlong_lines_are_rejected() {
    let mut daemon = Daemon::start();

    let long = format!("field add {} offt=0 len=1", "f".repeat(mangle::DEFAULT_MAX_LINE_LENGTH));
    daemon.send(&long).await;
    let reply = daemon.reply().await;
    assert!(reply.starts_with(r#"- {"error":{"kind":"malformed","cmd":"","msg":"line 1: line exceeds"#), "{reply}");

    assert_eq!(daemon.command("iface add eth0").await, r#"- {"add":{"iface":"eth0"}}"#);
    daemon.stop().await;
}

#[tokio::test]
async fn errors_do_not_stop_the_stream() {
    let mut daemon = Daemon::start();

    daemon
        .send(
            "# set up\n\
             \n\
             iface frob eth0\n\
             field add tiny offt=0 len=1\n\
             rule add bad match tiny=tiny:300\n\
             iface add eth0\n",
        )
        .await;

    assert_eq!(
        daemon.reply().await,
        r#"- {"error":{"kind":"malformed","cmd":"iface frob eth0","msg":"line 3: unknown mode \"frob\""}}"#
    );
    assert_eq!(daemon.reply().await, r#"- {"add":{"field":"tiny","offt":0,"len":1}}"#);

    let overflow = daemon.reply().await;
    assert!(overflow.starts_with(r#"- {"error":{"kind":"overflow","cmd":"rule add bad match tiny=tiny:300","#), "{overflow}");

    assert_eq!(daemon.reply().await, r#"- {"add":{"iface":"eth0"}}"#);

    assert_eq!(daemon.stats.commands(), 2);
    assert_eq!(daemon.stats.failed_commands(), 2);
    daemon.stop().await;
}

#[tokio::test]
async fn rule_delete_waits_for_process() {
    let mut daemon = Daemon::start();

    daemon.send("field add mac_dst offt=0 len=6\nfield add any offt=0 len=0\niface add eth0\niface add eth1").await;
    daemon.skip(4).await;

    assert_eq!(
        daemon.command("rule add r1 match mac_dst=any:any write mac_dst=mac_dst:0a:00:27:00:00:00").await,
        r#"- {"add":{"rule":"r1","match":["mac_dst=any:any"],"write":["mac_dst=mac_dst:0a:00:27:00:00:00"]}}"#
    );
    assert_eq!(daemon.command("process add eth0 r1:eth1").await, r#"- {"add":{"process":"eth0","routes":["r1:eth1"]}}"#);

    assert_eq!(
        daemon.command("rule del r1").await,
        r#"- {"error":{"kind":"in_use","cmd":"rule del r1","msg":"rule \"r1\" is in use (1 references)"}}"#
    );
    assert_eq!(
        daemon.command("iface del eth1").await,
        r#"- {"error":{"kind":"in_use","cmd":"iface del eth1","msg":"iface \"eth1\" is in use (1 references)"}}"#
    );
    assert_eq!(
        daemon.show("process show", 1).await,
        vec![r#"- {"show":{"process":"eth0","routes":["r1:eth1"],"hits":[0]}}"#]
    );

    assert_eq!(daemon.command("process del eth0").await, r#"- {"del":{"process":"eth0"}}"#);
    assert_eq!(daemon.command("rule del r1").await, r#"- {"del":{"rule":"r1"}}"#);
    assert_eq!(daemon.command("iface del eth1").await, r#"- {"del":{"iface":"eth1"}}"#);

    assert!(daemon.stop().await.is_clean());
}

#[tokio::test]
async fn states_are_shown_while_referenced() {
    let mut daemon = Daemon::start();

    daemon.send("field add proto offt=ip.proto len=1").await;
    daemon.reply().await;
    daemon.command("rule add keep write proto@last=proto").await;

    assert_eq!(daemon.show("state show", 1).await, vec![r#"- {"show":{"state":"last","len":1,"value":"0x00","refs":1}}"#]);

    daemon.command("rule del keep").await;
    assert_eq!(
        daemon.command("state show last").await,
        r#"- {"error":{"kind":"not_found","cmd":"state show last","msg":"state \"last\" not found"}}"#
    );

    daemon.stop().await;
}

#[tokio::test]
async fn replace_mode_swaps_fields() {
    let mut daemon = Daemon::with_options(EngineOptions::default().redefine(Redefine::Replace));

    daemon.command("field add f offt=0 len=1").await;
    daemon.command("rule add r match f=f:1").await;
    assert_eq!(daemon.command("field add f offt=2 len=2").await, r#"- {"add":{"field":"f","offt":2,"len":2}}"#);

    // The rule still uses the field it was compiled against, which is no longer registered.
    assert_eq!(daemon.show("field show f", 1).await, vec![r#"- {"show":{"field":"f","offt":2,"len":2,"refs":0}}"#]);
    assert!(daemon.stop().await.is_clean());
}

#[tokio::test]
async fn shutdown_reports_nothing_when_balanced() {
    let mut daemon = Daemon::start();

    daemon.command("field add a offt=0 len=2").await;
    daemon.command("iface add eth0").await;
    daemon.command("rule add r match a=a:x0102").await;
    daemon.command("process add eth0 r:eth0").await;

    let report = daemon.stop().await;
    assert!(report.is_clean(), "{:?}", report.leaks);
}
