#![no_main]

use baindex::{read_index, ReferenceSequence, SamHeader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // First byte picks the reference layout so both metadata-bin
    // interpretations get exercised
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let lengths: &[u32] = match selector % 3 {
        0 => &[],
        1 => &[1_000_000, 50_000],
        _ => &[536_887_296],
    };
    let references = lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| ReferenceSequence::new(format!("r{i}"), len))
        .collect();
    let header = SamHeader::from_references(references);

    // Parsing may fail on invalid input - that's OK
    // We're looking for panics/crashes, not errors
    let _ = read_index(Cursor::new(rest), &header);
});
