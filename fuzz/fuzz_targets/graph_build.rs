#![no_main]

use ferrous_boot::{Address, DiError, Graph};
use libfuzzer_sys::fuzz_target;

// Each byte pair is an edge between two of 16 nodes; a third byte marks break points.
fuzz_target!(|data: &[u8]| {
    let nodes: Vec<Address> = (0..16)
        .map(|i| Address::from_type_name(&format!("fuzz::N{}", i)))
        .collect();
    let mut graph = Graph::new();
    for chunk in data.chunks_exact(3) {
        let from = &nodes[(chunk[0] % 16) as usize];
        let to = &nodes[(chunk[1] % 16) as usize];
        graph.add(from, to);
        if chunk[2] == 0xff {
            graph.break_point(to);
        }
    }

    match graph.build() {
        Ok(order) => {
            let mut seen: Vec<&Address> = order.order.iter().chain(&order.deferred).collect();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), graph.len());
        }
        Err(DiError::Cycle(stuck)) => assert!(!stuck.is_empty()),
        Err(other) => panic!("unexpected error: {}", other),
    }
});
