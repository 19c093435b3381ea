//! Property tests for the frame codec, the stream decoder and the retry queue.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use phc_serial::crc::crc16;
use phc_serial::{
    Frame, FrameDecoder, ModuleRegistry, ModuleType, PendingCommand, PhcCommand, RetryQueue,
    ToggleMap, MAX_DECODED_PAYLOAD, MAX_PAYLOAD_SIZE,
};
use proptest::prelude::*;

const ADDRESSES: [u8; 3] = [0x05, 0x43, 0x41];

fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(ModuleType::Em, 5).unwrap();
    registry.register(ModuleType::Am, 3).unwrap();
    registry.register(ModuleType::Jrm, 1).unwrap();
    registry
}

fn arb_frame() -> impl Strategy<Value = Frame> {
    (
        any::<u8>(),
        proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
        any::<bool>(),
    )
        .prop_map(|(address, payload, toggle)| Frame::new(address, payload, toggle).unwrap())
}

/// Frames the decoder accepts: registered address, short payload.
fn arb_bus_frame() -> impl Strategy<Value = Frame> {
    (
        prop::sample::select(ADDRESSES.to_vec()),
        proptest::collection::vec(any::<u8>(), 0..=MAX_DECODED_PAYLOAD),
        any::<bool>(),
    )
        .prop_map(|(address, payload, toggle)| Frame::new(address, payload, toggle).unwrap())
}

fn unique(frames: Vec<Frame>) -> Vec<Frame> {
    let mut seen = HashSet::new();
    frames
        .into_iter()
        .filter(|f| seen.insert(f.to_bytes()))
        .collect()
}

// ── Frame codec ──────────────────────────────────────────────

proptest! {
    #[test]
    fn frame_survives_encoding(frame in arb_frame()) {
        let bytes = frame.to_bytes();
        prop_assert_eq!(bytes.len(), frame.payload.len() + 4);
        prop_assert_eq!(Frame::from_bytes(&bytes).unwrap(), frame);
    }

    #[test]
    fn trailer_is_crc_of_header_and_payload(frame in arb_frame()) {
        let bytes = frame.to_bytes();
        let n = bytes.len();
        let crc = u16::from_le_bytes([bytes[n - 2], bytes[n - 1]]);
        prop_assert_eq!(crc, crc16(&bytes[..n - 2]));
    }

    /// Any single flipped bit is rejected.
    #[test]
    fn single_bit_error_detected(frame in arb_frame(), bit in any::<prop::sample::Index>()) {
        let mut bytes = frame.to_bytes();
        let bit = bit.index(bytes.len() * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);
        prop_assert!(Frame::from_bytes(&bytes).is_err());
    }
}

// ── Stream decoder ───────────────────────────────────────────

proptest! {
    /// Frames come out in order whatever the read boundaries are.
    #[test]
    fn decoder_reassembles_any_split(
        frames in proptest::collection::vec(arb_bus_frame(), 1..8),
        chunk_sizes in proptest::collection::vec(1usize..8, 1..16),
    ) {
        let frames = unique(frames);
        let stream: Vec<u8> = frames.iter().flat_map(|f| f.to_bytes()).collect();
        let registry = registry();

        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        let mut pos = 0;
        for size in chunk_sizes.iter().cycle() {
            if pos >= stream.len() {
                break;
            }
            let end = (pos + size).min(stream.len());
            decoded.extend(decoder.feed(&stream[pos..end], &registry));
            pos = end;
        }

        prop_assert_eq!(decoded, frames);
        prop_assert!(decoder.pending().is_empty());
    }

    #[test]
    fn decoder_returns_repeats_once(frame in arb_bus_frame(), repeats in 2usize..6) {
        let bytes = frame.to_bytes();
        let stream: Vec<u8> = std::iter::repeat(bytes).take(repeats).flatten().collect();

        let mut decoder = FrameDecoder::new();
        prop_assert_eq!(decoder.feed(&stream, &registry()), vec![frame]);
    }

    #[test]
    fn decoder_skips_unknown_bytes(
        noise in proptest::collection::vec(any::<u8>(), 0..32),
        frame in arb_bus_frame(),
    ) {
        let mut stream: Vec<u8> = noise
            .into_iter()
            .filter(|b| !ADDRESSES.contains(b))
            .collect();
        stream.extend(frame.to_bytes());

        let mut decoder = FrameDecoder::new();
        prop_assert_eq!(decoder.feed(&stream, &registry()), vec![frame]);
    }
}

// ── Retry queue and toggles ──────────────────────────────────

proptest! {
    #[test]
    fn queue_pops_in_deadline_order(
        offsets in proptest::collection::vec(0u64..500, 1..32),
        cutoff in 0u64..600,
    ) {
        let queue = RetryQueue::new();
        let t0 = Instant::now();
        for (i, offset) in offsets.iter().enumerate() {
            let command = PendingCommand::new(ModuleType::Am, 0, (i % 8) as u8, PhcCommand::On)
                .with_attempts(*offset as u32);
            queue.push(t0 + Duration::from_millis(*offset), command);
        }

        let due = queue.pop_due(t0 + Duration::from_millis(cutoff));
        let expected = offsets.iter().filter(|&&o| o <= cutoff).count();
        prop_assert_eq!(due.len(), expected);
        prop_assert_eq!(queue.len(), offsets.len() - expected);
        prop_assert!(due.windows(2).all(|w| w[0].attempts <= w[1].attempts));
    }

    #[test]
    fn toggle_alternates_per_channel(
        calls in proptest::collection::vec((0u8..4, 0u8..8), 1..64),
    ) {
        let mut toggles = ToggleMap::new();
        let mut counts = std::collections::HashMap::new();
        for (module, channel) in calls {
            let n = counts.entry((module, channel)).or_insert(0u32);
            prop_assert_eq!(toggles.next(module, channel), *n % 2 == 1);
            *n += 1;
        }
    }
}
