#![no_main]

use graphtrace::node_id::NodeIdGenerator;
use graphtrace::processor::aggregate_and_trace;
use graphtrace::replay::parse_requests;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing may fail; anything it accepts must replay without panicking
        if let Ok(requests) = parse_requests(input) {
            let ids = Arc::new(NodeIdGenerator::new());
            for request in &requests {
                if let Ok(tree) = request.build_tree(Arc::clone(&ids)) {
                    let _ = aggregate_and_trace(&tree);
                }
            }
        }
    }
});
