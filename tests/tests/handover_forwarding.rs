//! Source eNB side of an X2 handover: downlink data for the UE is forwarded to the target.
use enb_gtpu::{TunnelControl, TunnelEvent, TunnelState};
use enb_gtpu_tests::{MockPeer, build_ipv4_udp_packet, framework::*};
use gtpu::MessageType;
use std::net::Ipv4Addr;

const UE_IP: Ipv4Addr = Ipv4Addr::new(10, 255, 0, 1);
const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const TARGET_TEID: u32 = 0x2002;

#[async_std::test]
async fn forward_to_target_enb() -> anyhow::Result<()> {
    let (enb, logger) = init().await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;
    let target_enb = MockPeer::new("Target eNB", &logger).await?;

    let teid = enb.handle.add_tunnel(0x46, 5, 0x1001, sgw.addr()).await?;
    let fwd_teid = enb
        .handle
        .add_tunnel(0x46, 5, TARGET_TEID, target_enb.addr())
        .await?;
    enb.handle.setup_forwarding(teid, fwd_teid).await?;
    assert_eq!(
        enb.tunnel(teid).await?.unwrap().state,
        TunnelState::ForwardTo
    );
    assert_eq!(
        enb.tunnel(fwd_teid).await?.unwrap().state,
        TunnelState::ForwardedFrom
    );

    // SDUs that PDCP was holding go first, tagged with their PDCP SN.
    let held = build_ipv4_udp_packet(SERVER_IP, UE_IP, b"held");
    assert!(enb.handle.forward_pdcp_sdu(0x46, 5, 99, held.clone()).await?);
    let (pdcp_sn, payload) = target_enb.recv_gpdu(TARGET_TEID).await?;
    assert_eq!(pdcp_sn, Some(99));
    assert_eq!(payload, held);

    // New downlink data is passed through unchanged.
    for n in 0..3u8 {
        let packet = build_ipv4_udp_packet(SERVER_IP, UE_IP, &[n; 10]);
        sgw.send_gpdu(enb.addr(), teid, None, &packet).await?;
        let (pdcp_sn, payload) = target_enb.recv_gpdu(TARGET_TEID).await?;
        assert_eq!(pdcp_sn, None);
        assert_eq!(payload, packet);
    }
    assert!(enb.no_sdu_pending());

    // Path switch: the S-GW's End Marker is relayed and the tunnels go.
    sgw.send_end_marker(enb.addr(), teid).await?;
    let (header, _) = target_enb.recv_gtpu().await?;
    assert_eq!(header.message_type, MessageType::EndMarker);
    assert_eq!(header.teid, TARGET_TEID);

    assert!(enb.handle.rnti_tunnels(0x46).await?.is_empty());
    let events = enb.handle.drain_events().await?;
    assert!(events.iter().any(|e| matches!(e, TunnelEvent::Removed { teid: t, .. } if *t == teid)));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, TunnelEvent::Removed { teid: t, .. } if *t == fwd_teid))
    );

    enb.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn forwarding_stops_when_source_goes_quiet() -> anyhow::Result<()> {
    let (enb, logger) = init_with(enb_gtpu::Config {
        indirect_tunnel_timeout_msec: 100,
        ..test_config()
    })
    .await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;
    let target_enb = MockPeer::new("Target eNB", &logger).await?;

    let teid = enb.handle.add_tunnel(0x46, 5, 0x1001, sgw.addr()).await?;
    let fwd_teid = enb
        .handle
        .add_tunnel(0x46, 5, TARGET_TEID, target_enb.addr())
        .await?;
    enb.handle.setup_forwarding(teid, fwd_teid).await?;

    // No End Marker ever comes from the S-GW.
    let (header, _) = target_enb.recv_gtpu().await?;
    assert_eq!(header.message_type, MessageType::EndMarker);
    assert_eq!(header.teid, TARGET_TEID);
    assert!(enb.tunnel(teid).await?.is_none());
    assert!(enb.tunnel(fwd_teid).await?.is_none());

    enb.shutdown().await;
    Ok(())
}
