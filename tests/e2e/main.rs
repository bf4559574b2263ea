//! End-to-end scenarios against an in-process gateway and a mocked
//! downstream service.

mod billing_tests;
mod failure_tests;
mod transport_tests;

use bytes::Bytes;
use request_directory_catalog::Credits;
use serde_json::Value;

pub fn credits_of(value: &Value) -> Credits {
    value
        .as_f64()
        .and_then(Credits::from_f64)
        .unwrap_or_else(|| panic!("not an amount: {value}"))
}

pub fn png_bytes() -> Bytes {
    Bytes::from_static(b"\x89PNG\r\n\x1a\n e2e test image")
}
