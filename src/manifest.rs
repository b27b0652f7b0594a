//! Lazy decoding of multi-document manifests.
//!
//! A manifest is either a YAML stream (documents separated by `---`) or a
//! stream of concatenated JSON objects. Documents are decoded one at a time;
//! the end of the input is the only termination signal.

use serde::Deserialize;
use serde_json::{StreamDeserializer, Value, de::SliceRead};

use crate::{Error, Result, dynamic::UntypedResource};

enum Documents<'a> {
    Yaml(serde_yaml::Deserializer<'a>),
    Json(StreamDeserializer<'a, SliceRead<'a>, Value>),
}

/// Iterator over the resources of one manifest.
///
/// Yields `Ok` for every decoded document and stops with `None` at end of input.
/// Malformed input yields a single `Err` after which the iterator is exhausted.
/// Empty documents (such as a trailing `---`) are skipped.
///
/// Each cluster gets its own decoder over the shared manifest bytes, so every
/// cluster works on freshly decoded objects.
pub struct ManifestDecoder<'a> {
    documents: Documents<'a>,
    failed: bool,
}

impl<'a> ManifestDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let documents = if looks_like_json(bytes) {
            Documents::Json(serde_json::Deserializer::from_slice(bytes).into_iter())
        } else {
            Documents::Yaml(serde_yaml::Deserializer::from_slice(bytes))
        };
        Self {
            documents,
            failed: false,
        }
    }

    fn next_value(&mut self) -> Option<Result<Value>> {
        match &mut self.documents {
            Documents::Yaml(stream) => {
                let document = stream.next()?;
                Some(Value::deserialize(document).map_err(|e| Error::Decode(e.to_string())))
            }
            Documents::Json(stream) => {
                let value = stream.next()?;
                Some(value.map_err(|e| Error::Decode(e.to_string())))
            }
        }
    }
}

impl Iterator for ManifestDecoder<'_> {
    type Item = Result<UntypedResource>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let decoded = match self.next_value()? {
                Ok(Value::Null) => continue,
                Ok(value) => into_resource(value),
                Err(e) => Err(e),
            };
            if decoded.is_err() {
                self.failed = true;
            }
            return Some(decoded);
        }
    }
}

fn looks_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

fn into_resource(value: Value) -> Result<UntypedResource> {
    let obj: UntypedResource =
        serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))?;
    obj.type_meta()?;
    Ok(obj)
}
