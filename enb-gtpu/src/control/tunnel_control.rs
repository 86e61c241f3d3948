use super::GtpuHandle;
use crate::{PdcpInterface, TunnelEvent, TunnelInfo};
use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;

/// The tunnel operations available to the control plane (S1AP, X2AP and RRC procedures).
///
/// Errors fall into two groups.  The outer `anyhow::Error` means the stack is no longer
/// running; anything else (`UnknownTeid`, `PoolExhausted`, ...) is a `GtpuError` wrapped
/// in it, and must be handled by rejecting the procedure that asked for it.
#[async_trait]
pub trait TunnelControl: Send + Sync + Clone + 'static {
    /// Create a tunnel and return its local TEID.
    async fn add_tunnel(
        &self,
        rnti: u16,
        eps_bearer_id: u8,
        teid_out: u32,
        remote_addr: SocketAddr,
    ) -> Result<u32>;
    async fn remove_tunnel(&self, teid: u32) -> Result<bool>;
    async fn remove_bearer(&self, rnti: u16, eps_bearer_id: u8) -> Result<bool>;
    async fn remove_rnti(&self, rnti: u16) -> Result<bool>;
    async fn update_rnti(&self, old_rnti: u16, new_rnti: u16) -> Result<bool>;

    async fn setup_forwarding(&self, rx_teid: u32, tx_teid: u32) -> Result<()>;
    async fn set_tunnel_priority(&self, preferred_teid: u32, standby_teid: u32) -> Result<()>;
    async fn activate_tunnel(&self, teid: u32) -> Result<()>;
    async fn suspend_tunnel(&self, teid: u32) -> Result<()>;
    async fn deactivate_tunnel(&self, teid: u32) -> Result<()>;
    async fn send_end_marker(&self, teid: u32) -> Result<bool>;

    async fn write_pdu(&self, rnti: u16, eps_bearer_id: u8, sdu: Vec<u8>) -> Result<bool>;
    async fn forward_pdcp_sdu(
        &self,
        rnti: u16,
        eps_bearer_id: u8,
        pdcp_sn: u16,
        sdu: Vec<u8>,
    ) -> Result<bool>;

    async fn tunnel_info(&self, teid: u32) -> Result<Option<TunnelInfo>>;
    async fn rnti_tunnels(&self, rnti: u16) -> Result<Vec<TunnelInfo>>;
    async fn drain_events(&self) -> Result<Vec<TunnelEvent>>;
}

#[async_trait]
impl<P: PdcpInterface + Send + 'static> TunnelControl for GtpuHandle<P> {
    async fn add_tunnel(
        &self,
        rnti: u16,
        eps_bearer_id: u8,
        teid_out: u32,
        remote_addr: SocketAddr,
    ) -> Result<u32> {
        let teid = self
            .call(move |ep| {
                ep.manager_mut()
                    .add_tunnel(rnti, eps_bearer_id, teid_out, remote_addr)
                    .map(|tunnel| tunnel.teid_in())
            })
            .await??;
        Ok(teid)
    }

    async fn remove_tunnel(&self, teid: u32) -> Result<bool> {
        self.call(move |ep| ep.manager_mut().remove_tunnel(teid))
            .await
    }

    async fn remove_bearer(&self, rnti: u16, eps_bearer_id: u8) -> Result<bool> {
        self.call(move |ep| ep.manager_mut().remove_bearer(rnti, eps_bearer_id))
            .await
    }

    async fn remove_rnti(&self, rnti: u16) -> Result<bool> {
        self.call(move |ep| ep.manager_mut().remove_rnti(rnti)).await
    }

    async fn update_rnti(&self, old_rnti: u16, new_rnti: u16) -> Result<bool> {
        self.call(move |ep| ep.manager_mut().update_rnti(old_rnti, new_rnti))
            .await
    }

    async fn setup_forwarding(&self, rx_teid: u32, tx_teid: u32) -> Result<()> {
        self.call(move |ep| ep.manager_mut().setup_forwarding(rx_teid, tx_teid))
            .await??;
        Ok(())
    }

    async fn set_tunnel_priority(&self, preferred_teid: u32, standby_teid: u32) -> Result<()> {
        self.call(move |ep| {
            ep.manager_mut()
                .set_tunnel_priority(preferred_teid, standby_teid)
        })
        .await??;
        Ok(())
    }

    async fn activate_tunnel(&self, teid: u32) -> Result<()> {
        self.call(move |ep| ep.manager_mut().activate_tunnel(teid))
            .await??;
        Ok(())
    }

    async fn suspend_tunnel(&self, teid: u32) -> Result<()> {
        self.call(move |ep| ep.manager_mut().suspend_tunnel(teid))
            .await??;
        Ok(())
    }

    async fn deactivate_tunnel(&self, teid: u32) -> Result<()> {
        self.call(move |ep| ep.manager_mut().deactivate_tunnel(teid))
            .await??;
        Ok(())
    }

    async fn send_end_marker(&self, teid: u32) -> Result<bool> {
        self.call(move |ep| ep.send_end_marker(teid)).await
    }

    async fn write_pdu(&self, rnti: u16, eps_bearer_id: u8, sdu: Vec<u8>) -> Result<bool> {
        self.call(move |ep| ep.write_pdu(rnti, eps_bearer_id, &sdu))
            .await
    }

    async fn forward_pdcp_sdu(
        &self,
        rnti: u16,
        eps_bearer_id: u8,
        pdcp_sn: u16,
        sdu: Vec<u8>,
    ) -> Result<bool> {
        self.call(move |ep| ep.forward_pdcp_sdu(rnti, eps_bearer_id, pdcp_sn, &sdu))
            .await
    }

    async fn tunnel_info(&self, teid: u32) -> Result<Option<TunnelInfo>> {
        self.call(move |ep| ep.manager().find_tunnel(teid).map(|t| t.info()))
            .await
    }

    async fn rnti_tunnels(&self, rnti: u16) -> Result<Vec<TunnelInfo>> {
        self.call(move |ep| {
            let manager = ep.manager();
            manager
                .find_rnti_tunnels(rnti)
                .iter()
                .filter_map(|bearer_teid| manager.find_tunnel(bearer_teid.teid))
                .map(|tunnel| tunnel.info())
                .collect()
        })
        .await
    }

    async fn drain_events(&self) -> Result<Vec<TunnelEvent>> {
        self.call(|ep| ep.manager_mut().drain_events()).await
    }
}
