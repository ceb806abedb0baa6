use std::sync::atomic::{AtomicU64, Ordering};

/// Documents normally arrive with caller-assigned stable ids; generated ids
/// only back the `new()` constructors for programmatically built palettes
/// and objects. They have to be unique within a process, nothing more, so a
/// splitmix64 step over an atomic counter is plenty.
static ID_STATE: AtomicU64 = AtomicU64::new(0x6a09_e667_f3bc_c909);

fn next_raw() -> u64 {
    let mut z = ID_STATE.fetch_add(0x9e37_79b9_7f4a_7c15, Ordering::Relaxed);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// 16 hex characters, distinct per call
pub(crate) fn generated_id() -> String {
    format!("{:016x}", next_raw())
}

#[test]
fn generated_ids_are_distinct() {
    let a = generated_id();
    let b = generated_id();
    assert_eq!(a.len(), 16);
    assert_ne!(a, b);
}
