//! Fixed, little-endian wire records for the layer protocol.
//!
//! All multi-byte integers are **little-endian** on the wire: stored pre-LE
//! with `.to_le()` and decoded with `.from_le()`. Records are `Pod` so whole
//! buffers cast to and from byte slices without copying.

use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// An entity id (the receiver's local handle) carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireEntity {
    pub id_le: u64,
}

impl WireEntity {
    pub fn of(id: u64) -> Self {
        Self { id_le: id.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.id_le)
    }
}

/// An (entity, value) pair: diagonal seeds, global numbers.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WirePair {
    pub id_le: u64,
    pub value_le: u64,
}

impl WirePair {
    pub fn new(id: u64, value: u64) -> Self {
        Self {
            id_le: id.to_le(),
            value_le: value.to_le(),
        }
    }
    pub fn id(&self) -> u64 {
        u64::from_le(self.id_le)
    }
    pub fn value(&self) -> u64 {
        u64::from_le(self.value_le)
    }
}

const _: () = {
    assert!(size_of::<WireEntity>() == 8);
    assert!(size_of::<WirePair>() == 16);
};
