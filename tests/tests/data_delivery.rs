use enb_gtpu::{TunnelControl, TunnelState};
use enb_gtpu_tests::{MockPeer, build_ipv4_udp_packet, framework::*};
use gtpu::{MessageType, RECOVERY_IE};
use std::net::Ipv4Addr;

const UE_IP: Ipv4Addr = Ipv4Addr::new(10, 255, 0, 1);
const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

#[async_std::test]
async fn downlink_and_uplink() -> anyhow::Result<()> {
    let (enb, logger) = init().await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;

    let teid = enb.handle.add_tunnel(0x46, 5, 0x1001, sgw.addr()).await?;
    let info = enb.tunnel(teid).await?.unwrap();
    assert_eq!(info.state, TunnelState::PdcpActive);
    assert_eq!(info.teid_out, 0x1001);

    // Downlink
    let packet = build_ipv4_udp_packet(SERVER_IP, UE_IP, b"downlink");
    sgw.send_gpdu(enb.addr(), teid, None, &packet).await?;
    let sdu = enb.recv_sdu().await?;
    assert_eq!(sdu.rnti, 0x46);
    assert_eq!(sdu.eps_bearer_id, 5);
    assert_eq!(sdu.sdu, packet);
    assert_eq!(sdu.pdcp_sn, None);

    // Uplink
    let packet = build_ipv4_udp_packet(UE_IP, SERVER_IP, b"uplink");
    assert!(enb.handle.write_pdu(0x46, 5, packet.clone()).await?);
    let (pdcp_sn, payload) = sgw.recv_gpdu(0x1001).await?;
    assert_eq!(pdcp_sn, None);
    assert_eq!(payload, packet);

    // No tunnel for this bearer
    assert!(!enb.handle.write_pdu(0x46, 6, packet).await?);

    enb.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn large_datagrams_are_delivered() -> anyhow::Result<()> {
    let (enb, logger) = init().await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;
    let teid = enb.handle.add_tunnel(0x46, 5, 1, sgw.addr()).await?;

    // An 8-byte header makes the first datagram exactly 2000 bytes.
    for len in [1992, 9000] {
        let payload: Vec<u8> = (0..len).map(|n| n as u8).collect();
        sgw.send_gpdu(enb.addr(), teid, None, &payload).await?;
        let sdu = enb.recv_sdu().await?;
        assert_eq!(sdu.sdu, payload);
    }

    enb.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn stale_teid_is_ignored() -> anyhow::Result<()> {
    let (enb, logger) = init().await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;

    let old_teid = enb.handle.add_tunnel(0x46, 5, 1, sgw.addr()).await?;
    assert!(enb.handle.remove_tunnel(old_teid).await?);
    assert!(!enb.handle.remove_tunnel(old_teid).await?);
    let teid = enb.handle.add_tunnel(0x46, 5, 1, sgw.addr()).await?;

    sgw.send_gpdu(enb.addr(), old_teid, None, b"late").await?;
    sgw.send_gpdu(enb.addr(), teid, Some(4), b"current").await?;
    let sdu = enb.recv_sdu().await?;
    assert_eq!(sdu.sdu, b"current".to_vec());
    assert_eq!(sdu.pdcp_sn, Some(4));
    assert!(enb.no_sdu_pending());

    enb.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn echo() -> anyhow::Result<()> {
    let (enb, logger) = init().await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;

    sgw.send_echo_request(enb.addr(), 77).await?;
    let (header, payload) = sgw.recv_gtpu().await?;
    assert_eq!(header.message_type, MessageType::EchoResponse);
    assert_eq!(header.seq_number, Some(77));
    assert_eq!(payload, RECOVERY_IE.to_vec());

    enb.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn ue_release_removes_all_tunnels() -> anyhow::Result<()> {
    let (enb, logger) = init().await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;

    for eps_bearer_id in 5..8 {
        enb.handle
            .add_tunnel(0x46, eps_bearer_id, eps_bearer_id as u32, sgw.addr())
            .await?;
    }
    let other = enb.handle.add_tunnel(0x47, 5, 9, sgw.addr()).await?;
    assert_eq!(enb.handle.rnti_tunnels(0x46).await?.len(), 3);

    // RNTI reassignment keeps the tunnels.
    assert!(enb.handle.update_rnti(0x46, 0x48).await?);
    assert!(enb.handle.rnti_tunnels(0x46).await?.is_empty());
    assert_eq!(enb.handle.rnti_tunnels(0x48).await?.len(), 3);

    assert!(enb.handle.remove_rnti(0x48).await?);
    assert!(enb.handle.rnti_tunnels(0x48).await?.is_empty());
    assert!(enb.tunnel(other).await?.is_some());
    let removed = enb
        .handle
        .drain_events()
        .await?
        .into_iter()
        .filter(|e| matches!(e, enb_gtpu::TunnelEvent::Removed { .. }))
        .count();
    assert_eq!(removed, 3);

    enb.shutdown().await;
    Ok(())
}
