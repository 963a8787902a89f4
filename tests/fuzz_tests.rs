//! Deterministic fuzz coverage for the container codec.
//!
//! Run with `cargo test --features arbitrary`.

#[cfg(feature = "arbitrary")]
mod fuzz {
    use arbitrary::{Arbitrary, Unstructured};
    use aurora_dlg::gff::{decode, encode, GffStruct};

    fn fill_deterministic(buf: &mut [u8], seed: u64) {
        let mut state = seed;
        for byte in buf.iter_mut() {
            // xorshift64*
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            state = state.wrapping_mul(0x2545_F491_4F6C_DD1D);
            *byte = (state & 0xFF) as u8;
        }
    }

    #[test]
    fn fuzz_encode_decode_roundtrip() {
        let mut raw_data = [0u8; 1024 * 16];

        for i in 0..128u64 {
            fill_deterministic(&mut raw_data, 0xD1A1_06u64 ^ i);
            let mut u = Unstructured::new(&raw_data);

            let Ok(tree) = GffStruct::arbitrary(&mut u) else {
                continue;
            };
            let Ok(bytes) = encode(&tree) else {
                continue;
            };
            let decoded = decode(&bytes).expect("encoded container must decode");
            // Compare re-encoded bytes, which also covers NaN payloads
            // that defeat value equality.
            let bytes_again = encode(&decoded).expect("decoded container must re-encode");
            assert_eq!(bytes_again, bytes, "seed {i}");
        }
    }

    #[test]
    fn fuzz_decode_never_panics_on_garbage() {
        let mut raw_data = [0u8; 4096];
        for i in 0..256u64 {
            fill_deterministic(&mut raw_data, 0xBADD_ECADEu64 ^ i);
            // Any outcome is fine as long as it is a Result, not a panic.
            let _ = decode(&raw_data);

            // A plausible header in front of garbage must also fail
            // closed.
            let mut with_header = raw_data.to_vec();
            with_header[0..4].copy_from_slice(b"DLG ");
            with_header[4..8].copy_from_slice(b"V3.2");
            let _ = decode(&with_header);
        }
    }

    #[test]
    fn fuzz_mutated_valid_containers_fail_closed() {
        let mut seed_data = [0u8; 8192];
        fill_deterministic(&mut seed_data, 0x5EED);
        let mut u = Unstructured::new(&seed_data);
        let tree = GffStruct::arbitrary(&mut u).expect("seed tree");
        let Ok(bytes) = encode(&tree) else {
            return;
        };

        for i in 0..512usize {
            let mut mutated = bytes.clone();
            let position = (i * 37) % mutated.len();
            mutated[position] = mutated[position].wrapping_add(1 + (i % 255) as u8);
            // Decode may succeed (the mutation hit a text byte) or fail;
            // it must never panic or hang.
            let _ = decode(&mutated);
        }
    }
}
