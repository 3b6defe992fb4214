#![no_main]

use ferrous_boot::address::canonical;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let first = canonical(input);
    assert!(!first.is_empty());
    assert_eq!(first, canonical(input));
});
