//! Target eNB side of an X2 handover: forwarded data arrives on an indirect tunnel while
//! the direct tunnel from the S-GW holds its data back until the source has finished.
use enb_gtpu::{Config, TunnelControl, TunnelState};
use enb_gtpu_tests::{MockPeer, framework::*};

struct Handover {
    enb: TestNode,
    sgw: MockPeer,
    source_enb: MockPeer,
    indirect_teid: u32,
    direct_teid: u32,
}

async fn start_handover(config: Config) -> anyhow::Result<Handover> {
    let (enb, logger) = init_with(config).await?;
    let sgw = MockPeer::new("S-GW", &logger).await?;
    let source_enb = MockPeer::new("Source eNB", &logger).await?;

    let indirect_teid = enb
        .handle
        .add_tunnel(0x46, 5, 0x3003, source_enb.addr())
        .await?;
    let direct_teid = enb.handle.add_tunnel(0x46, 5, 0x4004, sgw.addr()).await?;
    enb.handle
        .set_tunnel_priority(indirect_teid, direct_teid)
        .await?;

    // Forwarded data is delivered straight away.
    source_enb
        .send_gpdu(enb.addr(), indirect_teid, Some(1), b"f1")
        .await?;
    let sdu = enb.recv_sdu().await?;
    assert_eq!(sdu.sdu, b"f1".to_vec());
    assert_eq!(sdu.pdcp_sn, Some(1));

    // Direct data waits.
    sgw.send_gpdu(enb.addr(), direct_teid, None, b"d1").await?;
    sgw.send_gpdu(enb.addr(), direct_teid, None, b"d2").await?;
    enb.wait_for_buffered(direct_teid, 2).await?;
    assert_eq!(
        enb.tunnel(direct_teid).await?.unwrap().state,
        TunnelState::Buffering
    );
    assert!(enb.no_sdu_pending());

    Ok(Handover {
        enb,
        sgw,
        source_enb,
        indirect_teid,
        direct_teid,
    })
}

async fn check_switched_over(h: Handover) -> anyhow::Result<()> {
    for expected in [b"d1", b"d2"] {
        assert_eq!(h.enb.recv_sdu().await?.sdu, expected.to_vec());
    }
    assert!(h.enb.tunnel(h.indirect_teid).await?.is_none());
    let direct = h.enb.tunnel(h.direct_teid).await?.unwrap();
    assert_eq!(direct.state, TunnelState::PdcpActive);
    assert_eq!(direct.buffered_sdus, 0);

    h.sgw
        .send_gpdu(h.enb.addr(), h.direct_teid, None, b"d3")
        .await?;
    assert_eq!(h.enb.recv_sdu().await?.sdu, b"d3".to_vec());

    h.enb.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn end_marker_releases_buffered_data() -> anyhow::Result<()> {
    let h = start_handover(test_config()).await?;

    h.source_enb
        .send_gpdu(h.enb.addr(), h.indirect_teid, Some(2), b"f2")
        .await?;
    assert_eq!(h.enb.recv_sdu().await?.sdu, b"f2".to_vec());

    h.source_enb
        .send_end_marker(h.enb.addr(), h.indirect_teid)
        .await?;
    check_switched_over(h).await
}

#[async_std::test]
async fn timeout_releases_buffered_data() -> anyhow::Result<()> {
    let h = start_handover(Config {
        indirect_tunnel_timeout_msec: 300,
        ..test_config()
    })
    .await?;
    // The source never sends an End Marker.
    check_switched_over(h).await
}
