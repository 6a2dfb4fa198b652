//! JSON test vector loader for wire frame tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    pub frame: FrameData,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameData {
    pub encoding: String,
    pub data: String,
}

impl FrameData {
    pub fn decode(&self) -> String {
        match self.encoding.as_str() {
            "text" => self.data.clone(),
            "base64" => {
                let raw = base64::engine::general_purpose::STANDARD
                    .decode(&self.data)
                    .expect("invalid base64 in test vector");
                String::from_utf8(raw).expect("vector frame must be utf-8")
            }
            other => panic!("unsupported encoding: {other}"),
        }
    }
}
