// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed values to tier payloads and back.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use strata_tier::Error;

/// JSON encoding shared by both tiers, so a payload written to one decodes from the other.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct JsonCodec;

impl JsonCodec {
    pub(crate) fn encode<V: Serialize>(self, value: &V) -> Result<Bytes, Error> {
        serde_json::to_vec(value).map(Bytes::from).map_err(Error::codec)
    }

    pub(crate) fn decode<V: DeserializeOwned>(self, payload: &[u8]) -> Result<V, Error> {
        serde_json::from_slice(payload).map_err(Error::codec)
    }
}
