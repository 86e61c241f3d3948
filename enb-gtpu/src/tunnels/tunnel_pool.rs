use super::Tunnel;
use index_pool::IndexPool;
use rand::Rng;

// The low 16 bits of a TEID select the pool slot.  The top 16 bits are random and
// non-zero, so that TEIDs are hard to guess and a recycled slot does not revive an old TEID.
const SLOT_MASK: u32 = 0xffff;

/// Fixed-capacity store of tunnels indexed by TEID.
pub struct TunnelPool {
    index_pool: IndexPool,
    slots: Vec<Option<Tunnel>>,
    len: usize,
}

impl TunnelPool {
    pub fn new(capacity: usize) -> Self {
        TunnelPool {
            index_pool: IndexPool::new(),
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reserve a slot and return the TEID for it.  The caller must then `insert` a tunnel
    /// with this TEID.
    pub fn allocate_teid(&mut self) -> Option<u32> {
        let idx = self.index_pool.new_id();
        if idx >= self.slots.len() {
            let _ = self.index_pool.return_id(idx);
            return None;
        }
        let prefix: u32 = rand::rng().random_range(1..=0xffff);
        Some((prefix << 16) | idx as u32)
    }

    pub fn insert(&mut self, tunnel: Tunnel) {
        let idx = slot_index(tunnel.teid_in);
        debug_assert!(self.slots[idx].is_none());
        self.slots[idx] = Some(tunnel);
        self.len += 1;
    }

    pub fn get(&self, teid: u32) -> Option<&Tunnel> {
        self.slots
            .get(slot_index(teid))?
            .as_ref()
            .filter(|t| t.teid_in == teid)
    }

    pub fn get_mut(&mut self, teid: u32) -> Option<&mut Tunnel> {
        self.slots
            .get_mut(slot_index(teid))?
            .as_mut()
            .filter(|t| t.teid_in == teid)
    }

    pub fn remove(&mut self, teid: u32) -> Option<Tunnel> {
        let idx = slot_index(teid);
        let slot = self.slots.get_mut(idx)?;
        if slot.as_ref().is_none_or(|t| t.teid_in != teid) {
            return None;
        }
        let tunnel = slot.take();
        let _ = self.index_pool.return_id(idx);
        self.len -= 1;
        tunnel
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tunnel> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tunnel> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

fn slot_index(teid: u32) -> usize {
    (teid & SLOT_MASK) as usize
}
