// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Serde adapter for raw byte strings, like KIP names, that are usually but
//! not necessarily valid UTF-8. Bytes are written as a string with non-UTF-8
//! sequences escaped as `\xNN`, which keeps the common case human-editable.

use std::fmt;

use bstr::{ByteSlice, ByteVec};
use serde::{Deserializer, Serializer, de::Visitor};

pub fn serialize<S, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    let s = data.as_ref().escape_bytes().to_string();
    serializer.serialize_str(&s)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EscapedVisitor;

    impl Visitor<'_> for EscapedVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "an escaped byte string")
        }

        fn visit_str<E>(self, data: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Vec::unescape_bytes(data))
        }
    }

    deserializer.deserialize_str(EscapedVisitor)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
    struct Header {
        #[serde(with = "super")]
        name: Vec<u8>,
    }

    #[test]
    fn round_trip_toml() {
        for name in [&b"FS"[..], b"\xffS", b""] {
            let header = Header {
                name: name.to_vec(),
            };
            let serialized = toml_edit::ser::to_string(&header).unwrap();
            let decoded: Header = toml_edit::de::from_str(&serialized).unwrap();

            assert_eq!(decoded, header);
        }

        let serialized = toml_edit::ser::to_string(&Header {
            name: b"\xffS".to_vec(),
        })
        .unwrap();
        assert!(serialized.contains(r"\xFFS"), "{serialized}");
    }
}
