//! Proptest strategies for partition layouts.

#![allow(dead_code)]

use proptest::prelude::*;

/// Total line counts, header included, biased toward small files and exact multiples
pub fn total_lines_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        0u64..=3,
        2u64..2_000,
        (1u64..20).prop_map(|k| k * 250 + 1),
    ]
}

pub fn partition_size_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![1u64..=10, 1u64..=500, Just(250u64)]
}

/// Per-line contents for a small generated file
pub fn data_line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Z]-[0-9]{1,4},2024-05-01T09:00:00,[0-9]{1,3}\\.[0-9]{2}",
        "[a-z ,]{0,20}",
    ]
}
