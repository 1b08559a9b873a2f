//! Cross-strategy routing tests.

mod council_test;
