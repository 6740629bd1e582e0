//! Deterministic asset selection
//!
//! Every snapshotter node must pick the same asset for the same
//! (epoch, identity, slot, day) without talking to the others. The identity
//! hash is the integer hash other snapshotter implementations already use:
//! the identity read as an unsigned integer, reduced modulo 2^61 - 1.

use crate::error::{Result, SnapshotError};

/// 2^61 - 1
const HASH_MODULUS: u128 = (1 << 61) - 1;

/// Hash of a hex identity (optional `0x` prefix, any case).
pub fn identity_hash(identity: &str) -> Result<u64> {
    let hex = identity.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if hex.is_empty() {
        return Err(SnapshotError::configuration("instance identity is empty"));
    }

    hex.chars()
        .try_fold(0u128, |acc, c| {
            let digit = c.to_digit(16)?;
            Some((acc * 16 + u128::from(digit)) % HASH_MODULUS)
        })
        .map(|h| h as u64)
        .ok_or_else(|| {
            SnapshotError::configuration(format!("instance identity {identity:?} is not hex"))
        })
}

/// Index into the monitored asset list for this node and epoch.
pub fn select(
    epoch_id: u64,
    day: u64,
    identity: &str,
    slot_id: u64,
    asset_count: usize,
) -> Result<usize> {
    if asset_count == 0 {
        return Err(SnapshotError::configuration("monitored asset list is empty"));
    }
    let sum = u128::from(epoch_id)
        + u128::from(identity_hash(identity)?)
        + u128::from(slot_id)
        + u128::from(day);
    Ok((sum % asset_count as u128) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const NODE: &str = "0x6C1b8e5D5bA9E1F0D1dF3D4B1cC3a7e2b9F7E4d1";

    #[test]
    fn test_identity_hash() {
        assert_eq!(identity_hash("0x10").unwrap(), 16);
        assert_eq!(identity_hash("ff").unwrap(), 255);
        // 2^61 - 1 reduces to zero, 2^61 to one
        assert_eq!(identity_hash("0x1fffffffffffffff").unwrap(), 0);
        assert_eq!(identity_hash("0x2000000000000000").unwrap(), 1);
        // Case does not matter
        assert_eq!(identity_hash(NODE).unwrap(), identity_hash(&NODE.to_lowercase()).unwrap());

        assert!(identity_hash("").is_err());
        assert!(identity_hash("0x").is_err());
        assert!(identity_hash("0xnothex").is_err());
    }

    #[test]
    fn test_select_known_value() {
        // (1 + 16 + 2 + 0) mod 8
        assert_eq!(select(1, 0, "0x10", 2, 8).unwrap(), 3);
        assert!(select(u64::MAX, u64::MAX, "0x10", u64::MAX, 7).is_ok());
    }

    #[test]
    fn test_select_is_pure() {
        let first = select(4242, 19, NODE, 3, 8).unwrap();
        for _ in 0..100 {
            assert_eq!(select(4242, 19, NODE, 3, 8).unwrap(), first);
        }
    }

    #[test]
    fn test_consecutive_epochs_cover_every_asset() {
        for count in 1..=12 {
            let picked: HashSet<usize> = (1000..1000 + count as u64)
                .map(|epoch| select(epoch, 3, NODE, 5, count).unwrap())
                .collect();
            assert_eq!(picked.len(), count);
            assert!(picked.iter().all(|i| *i < count));
        }
    }

    #[test]
    fn test_empty_asset_list() {
        assert!(matches!(
            select(1, 1, NODE, 1, 0),
            Err(SnapshotError::Configuration(_))
        ));
    }
}
