// src/limiters/tests/mod.rs





/// Tests for the sliding window counter limiter
mod sliding_window_counter_tests;


/// Tests for multi-tier composition
mod multi_tier_tests;
