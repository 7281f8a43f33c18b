//! Cross-module behaviour tests for `cardwise-core`, run against the mock transport.

pub mod support;
