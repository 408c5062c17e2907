//! Shard routing
//!
//! Keys hash onto a fixed ring of slots (CRC16/XMODEM, as Redis Cluster
//! does), and slots are split into contiguous equal ranges, one per shard.
//! Routing is a pure function of the key and the shard list.

use crc::{CRC_16_XMODEM, Crc};

use crate::error::{Result, StoreError};
use crate::id::EntityId;
use crate::types::Value;

/// Total number of hash slots
pub const TOTAL_SLOTS: u32 = 16384;

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// One backing partition
#[derive(Debug)]
pub struct Shard<B> {
    index: usize,
    address: String,
    backend: B,
}

impl<B> Shard<B> {
    /// Position of this shard in the configured list
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Maps ids and index keys to shards
#[derive(Debug)]
pub struct ShardRouter<B> {
    shards: Vec<Shard<B>>,
}

impl<B> ShardRouter<B> {
    /// Build a router over `(address, backend)` pairs
    ///
    /// Fails with a configuration error when no shards are given.
    pub fn new(shards: Vec<(String, B)>) -> Result<Self> {
        if shards.is_empty() {
            return Err(StoreError::configuration("No shards configured"));
        }
        let shards = shards
            .into_iter()
            .enumerate()
            .map(|(index, (address, backend))| Shard {
                index,
                address,
                backend,
            })
            .collect();
        Ok(Self { shards })
    }

    /// Hash slot for a key
    pub fn slot_for_key(key: &[u8]) -> u32 {
        u32::from(CRC16.checksum(key)) % TOTAL_SLOTS
    }

    /// Shard position owning a slot
    fn shard_for_slot(&self, slot: u32) -> usize {
        (slot as usize * self.shards.len()) / TOTAL_SLOTS as usize
    }

    /// Shard holding the entity row for `id`
    pub fn route(&self, id: &EntityId) -> &Shard<B> {
        let slot = Self::slot_for_key(id.as_bytes());
        &self.shards[self.shard_for_slot(slot)]
    }

    /// Shard holding index rows whose partition column equals `value`
    pub fn route_value(&self, value: &Value) -> &Shard<B> {
        let slot = Self::slot_for_key(&value.routing_key());
        &self.shards[self.shard_for_slot(slot)]
    }

    pub fn shards(&self) -> &[Shard<B>] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::generate_id;

    fn router(count: usize) -> ShardRouter<()> {
        ShardRouter::new((0..count).map(|i| (format!("s{}", i), ())).collect()).unwrap()
    }

    #[test]
    fn test_zero_shards_rejected() {
        let err = ShardRouter::<()>::new(Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_slot_in_range() {
        for key in [&b"a"[..], b"user:1000", b""] {
            assert!(ShardRouter::<()>::slot_for_key(key) < TOTAL_SLOTS);
        }
    }

    #[test]
    fn test_route_is_stable() {
        let router = router(4);
        for _ in 0..100 {
            let id = generate_id();
            assert_eq!(router.route(&id).index(), router.route(&id).index());
        }
    }

    #[test]
    fn test_single_shard_takes_everything() {
        let router = router(1);
        for _ in 0..50 {
            assert_eq!(router.route(&generate_id()).index(), 0);
        }
        assert_eq!(router.route_value(&Value::from("x")).index(), 0);
    }

    #[test]
    fn test_routes_spread_over_shards() {
        let router = router(4);
        let mut hits = [0usize; 4];
        for _ in 0..2000 {
            hits[router.route(&generate_id()).index()] += 1;
        }
        assert!(hits.iter().all(|&h| h > 0), "uneven routing: {:?}", hits);
    }

    #[test]
    fn test_last_slot_maps_to_last_shard() {
        let router = router(3);
        assert_eq!(router.shard_for_slot(TOTAL_SLOTS - 1), 2);
        assert_eq!(router.shard_for_slot(0), 0);
    }

    #[test]
    fn test_route_value_is_stable() {
        let router = router(8);
        let a = router.route_value(&Value::from("evan")).index();
        let b = router.route_value(&Value::from("evan")).index();
        assert_eq!(a, b);
        assert_eq!(router.shards()[a].address(), format!("s{}", a));
    }
}
