use derive_deref::Deref;
use std::collections::HashMap;

pub const MAX_TUNNELS_PER_UE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerTeid {
    pub eps_bearer_id: u8,
    pub teid: u32,
}

/// The tunnels of each UE, ordered by EPS bearer ID and then by creation order.
#[derive(Debug, Default, Deref)]
pub struct RntiIndex(HashMap<u16, Vec<BearerTeid>>);

impl RntiIndex {
    pub fn has_room(&self, rnti: u16) -> bool {
        self.0
            .get(&rnti)
            .is_none_or(|tunnels| tunnels.len() < MAX_TUNNELS_PER_UE)
    }

    pub fn add(&mut self, rnti: u16, eps_bearer_id: u8, teid: u32) {
        let tunnels = self
            .0
            .entry(rnti)
            .or_insert_with(|| Vec::with_capacity(MAX_TUNNELS_PER_UE));
        let idx = tunnels.partition_point(|t| t.eps_bearer_id <= eps_bearer_id);
        tunnels.insert(
            idx,
            BearerTeid {
                eps_bearer_id,
                teid,
            },
        );
    }

    pub fn remove(&mut self, rnti: u16, teid: u32) -> bool {
        let Some(tunnels) = self.0.get_mut(&rnti) else {
            return false;
        };
        let Some(idx) = tunnels.iter().position(|t| t.teid == teid) else {
            return false;
        };
        tunnels.remove(idx);
        if tunnels.is_empty() {
            self.0.remove(&rnti);
        }
        true
    }

    pub fn tunnels(&self, rnti: u16) -> &[BearerTeid] {
        self.0.get(&rnti).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bearer_tunnels(&self, rnti: u16, eps_bearer_id: u8) -> &[BearerTeid] {
        let tunnels = self.tunnels(rnti);
        let start = tunnels.partition_point(|t| t.eps_bearer_id < eps_bearer_id);
        let end = tunnels.partition_point(|t| t.eps_bearer_id <= eps_bearer_id);
        &tunnels[start..end]
    }

    /// Move a UE's tunnels to a new RNTI.  Fails if the old RNTI is unknown or the new one is taken.
    pub fn rekey(&mut self, old_rnti: u16, new_rnti: u16) -> bool {
        if self.0.contains_key(&new_rnti) {
            return false;
        }
        let Some(tunnels) = self.0.remove(&old_rnti) else {
            return false;
        };
        self.0.insert(new_rnti, tunnels);
        true
    }
}
