//! Property-based tests for fragmentation and assembly
//!
//! Tests for:
//! - Round-trip: fragment then assemble reproduces the input for any size
//! - Hashing: every fragment's hash matches its bytes
//! - Structure: counts, sizes, contiguous indices
//! - Order independence, completeness enforcement, tamper detection

use super::assembler::{assemble_to_vec, AssemblyError};
use super::fragmenter::Fragmenter;
use proptest::prelude::*;

// ============================================================================
// FRAGMENTATION PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: Round-trip preserves data
    /// For any bytes and any fragment size, assemble(fragment(B)) == B
    #[test]
    fn roundtrip_preserves_data(
        data in prop::collection::vec(any::<u8>(), 0..20_000),
        fragment_size in 1usize..4096,
    ) {
        let fragments = Fragmenter::new(fragment_size).unwrap().fragment(&data, "prop").unwrap();
        let assembled = assemble_to_vec(&fragments).unwrap();

        prop_assert_eq!(assembled, data, "Round-trip must reproduce input exactly");
    }

    /// Property: Every fragment hash matches its data
    #[test]
    fn fragment_hashes_match_data(
        data in prop::collection::vec(any::<u8>(), 0..10_000),
        fragment_size in 1usize..2048,
    ) {
        let fragments = Fragmenter::new(fragment_size).unwrap().fragment(&data, "prop").unwrap();

        for fragment in &fragments {
            prop_assert!(fragment.is_intact(), "Fragment {} hash mismatch", fragment.index);
        }
    }

    /// Property: Fragment count and sizes follow ceil(len / size)
    #[test]
    fn fragment_count_and_sizes(
        len in 1usize..50_000,
        fragment_size in 1usize..8192,
    ) {
        let data = vec![0xA5u8; len];
        let fragments = Fragmenter::new(fragment_size).unwrap().fragment(&data, "prop").unwrap();

        prop_assert_eq!(fragments.len(), len.div_ceil(fragment_size));
        prop_assert_eq!(fragments.iter().map(|f| f.size).sum::<usize>(), len);

        let (last, rest) = fragments.split_last().unwrap();
        prop_assert!(rest.iter().all(|f| f.size == fragment_size));
        prop_assert!(last.size > 0 && last.size <= fragment_size);

        for (i, fragment) in fragments.iter().enumerate() {
            prop_assert_eq!(fragment.index as usize, i);
            prop_assert_eq!(fragment.total_fragments as usize, fragments.len());
        }
    }
}

// ============================================================================
// ASSEMBLY PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: Assembly is independent of fragment order
    #[test]
    fn assembly_order_independent(
        data in prop::collection::vec(any::<u8>(), 1..10_000),
        fragment_size in 1usize..1024,
        seed in any::<u64>(),
    ) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut fragments = Fragmenter::new(fragment_size).unwrap().fragment(&data, "prop").unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        fragments.shuffle(&mut rng);

        prop_assert_eq!(assemble_to_vec(&fragments).unwrap(), data);
    }

    /// Property: Dropping any fragment is a completeness failure
    #[test]
    fn missing_fragment_detected(
        data in prop::collection::vec(any::<u8>(), 2..10_000),
        fragment_size in 1usize..512,
        drop_at in any::<prop::sample::Index>(),
    ) {
        let mut fragments = Fragmenter::new(fragment_size).unwrap().fragment(&data, "prop").unwrap();
        prop_assume!(fragments.len() > 1);

        fragments.remove(drop_at.index(fragments.len()));
        let result = assemble_to_vec(&fragments);

        prop_assert!(
            matches!(result, Err(ref e) if e.is_completeness_failure()),
            "Missing fragment must be reported, got {:?}",
            result.map(|v| v.len())
        );
    }

    /// Property: Flipping any byte of any fragment is an integrity failure
    #[test]
    fn tamper_detected_at_any_position(
        data in prop::collection::vec(any::<u8>(), 1..10_000),
        fragment_size in 1usize..1024,
        fragment_at in any::<prop::sample::Index>(),
        byte_at in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut fragments = Fragmenter::new(fragment_size).unwrap().fragment(&data, "prop").unwrap();
        let target = fragment_at.index(fragments.len());
        let bytes = fragments[target].data.as_mut().unwrap();
        let position = byte_at.index(bytes.len());
        bytes[position] ^= flip;

        let result = assemble_to_vec(&fragments);
        prop_assert!(
            matches!(result, Err(AssemblyError::Integrity { index, .. }) if index as usize == target),
            "Tampered fragment {} must fail integrity",
            target
        );
    }
}
