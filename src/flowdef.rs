// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Flow descriptor JSON schema, trimmed to the fields the core consumes.
//!
//! The full NMOS IS-04 flow-definition parser is out of scope (`spec.md`
//! §1): producers hand us JSON and we pull out identifier, format, rate,
//! and geometry. Everything else in the document is opaque and is
//! persisted verbatim to the `<uuid>.json` sidecar so it round-trips
//! through [`crate::manager::FlowManager::get_flow_def`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Rational;
use crate::error::{Error, Result};
use crate::layout::{ContinuousGeom, DataFormat, DiscreteGeom, FlowKind};

/// A grain rate or sample rate as it appears in flow descriptor JSON
/// (`{"numerator": 30000, "denominator": 1001}`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateJson {
    pub numerator: u64,
    pub denominator: u64,
}

impl From<RateJson> for Rational {
    fn from(r: RateJson) -> Self {
        Rational::new(r.numerator, r.denominator)
    }
}

/// The subset of an NMOS IS-04 flow definition this core consumes.
///
/// Unrecognized fields are preserved in `extra` so the full document can be
/// written back byte-for-byte by [`crate::manager::FlowManager::get_flow_def`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FlowDef {
    pub id: Uuid,
    pub format: String,
    #[serde(default)]
    pub grain_rate: Option<RateJson>,
    #[serde(default)]
    pub sample_rate: Option<RateJson>,
    #[serde(default)]
    pub frame_width: Option<u32>,
    #[serde(default)]
    pub frame_height: Option<u32>,
    #[serde(default)]
    pub grain_size: Option<u64>,
    #[serde(default)]
    pub channel_count: Option<u64>,
    #[serde(default)]
    pub sample_width: Option<u64>,
    #[serde(default)]
    pub buffer_length: Option<u64>,
    #[serde(default)]
    pub ring_size: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// NMOS `format` URNs this core recognizes.
const URN_VIDEO: &str = "urn:x-nmos:format:video";
const URN_AUDIO: &str = "urn:x-nmos:format:audio";
const URN_DATA: &str = "urn:x-nmos:format:data";

/// A fully-resolved flow descriptor: the pieces of [`FlowDef`] the core
/// actually needs to size and lay out a flow, independent of NMOS JSON
/// vocabulary.
pub struct Descriptor {
    pub id: Uuid,
    pub data_format: DataFormat,
    pub rate: Rational,
    pub kind: FlowKind,
}

impl FlowDef {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }

    /// Resolves this descriptor's format, rate, and geometry into a
    /// [`Descriptor`] the flow manager can use to size a new flow.
    ///
    /// `default_ring_size` is used for discrete flows that don't specify
    /// one explicitly (the descriptor schema doesn't require it — ring
    /// sizing is a local policy choice, not part of the wire format).
    pub fn resolve(&self, default_ring_size: u64) -> Result<Descriptor> {
        let data_format = match self.format.as_str() {
            URN_VIDEO => DataFormat::Video,
            URN_AUDIO => DataFormat::Audio,
            URN_DATA => DataFormat::Data,
            other => {
                return Err(Error::invalid_argument(format!(
                    "unrecognized flow format \"{other}\""
                )));
            }
        };

        let kind = if data_format.is_discrete() {
            let grain_size = self.grain_size.ok_or_else(|| {
                Error::invalid_argument("discrete flow descriptor is missing grain_size")
            })?;
            let ring_size = self.ring_size.unwrap_or(default_ring_size);
            crate::layout::validate_ring_size(ring_size)?;
            FlowKind::Discrete(DiscreteGeom {
                ring_size,
                grain_size,
            })
        } else {
            let channel_count = self.channel_count.ok_or_else(|| {
                Error::invalid_argument("continuous flow descriptor is missing channel_count")
            })?;
            let sample_width = self.sample_width.ok_or_else(|| {
                Error::invalid_argument("continuous flow descriptor is missing sample_width")
            })?;
            let buffer_length = self.buffer_length.ok_or_else(|| {
                Error::invalid_argument("continuous flow descriptor is missing buffer_length")
            })?;
            if channel_count == 0 {
                return Err(Error::invalid_argument("channel_count must be >= 1"));
            }
            FlowKind::Continuous(ContinuousGeom {
                channel_count,
                sample_width,
                buffer_length,
            })
        };

        let rate = if data_format.is_discrete() {
            self.grain_rate
        } else {
            self.sample_rate
        }
        .ok_or_else(|| Error::invalid_argument("flow descriptor is missing its rate"))?
        .into();

        Ok(Descriptor {
            id: self.id,
            data_format,
            rate,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_video_descriptor() {
        let json = r#"{
            "id": "3b7b6a2c-9c4d-4e8e-8f2d-4a0b6f1a5d63",
            "format": "urn:x-nmos:format:video",
            "label": "cam1",
            "grain_rate": {"numerator": 30000, "denominator": 1001},
            "grain_size": 4147200,
            "frame_width": 1920,
            "frame_height": 1080
        }"#;
        let def = FlowDef::parse(json).unwrap();
        let descriptor = def.resolve(256).unwrap();
        assert_eq!(descriptor.data_format, DataFormat::Video);
        assert_eq!(descriptor.rate, Rational::new(30000, 1001));
        assert!(matches!(descriptor.kind, FlowKind::Discrete(g) if g.grain_size == 4147200 && g.ring_size == 256));
    }

    #[test]
    fn parses_audio_descriptor() {
        let json = r#"{
            "id": "3b7b6a2c-9c4d-4e8e-8f2d-4a0b6f1a5d63",
            "format": "urn:x-nmos:format:audio",
            "sample_rate": {"numerator": 48000, "denominator": 1},
            "channel_count": 2,
            "sample_width": 4,
            "buffer_length": 48000
        }"#;
        let def = FlowDef::parse(json).unwrap();
        let descriptor = def.resolve(256).unwrap();
        assert_eq!(descriptor.data_format, DataFormat::Audio);
        assert!(matches!(descriptor.kind, FlowKind::Continuous(g) if g.channel_count == 2));
    }

    #[test]
    fn rejects_unrecognized_format() {
        let json = r#"{"id": "3b7b6a2c-9c4d-4e8e-8f2d-4a0b6f1a5d63", "format": "urn:x-nmos:format:mux"}"#;
        let def = FlowDef::parse(json).unwrap();
        assert!(def.resolve(256).is_err());
    }

    #[test]
    fn preserves_unknown_fields_for_roundtrip() {
        let json = r#"{"id": "3b7b6a2c-9c4d-4e8e-8f2d-4a0b6f1a5d63", "format": "urn:x-nmos:format:data", "grain_rate": {"numerator": 25, "denominator": 1}, "grain_size": 1500, "label": "ancillary"}"#;
        let def = FlowDef::parse(json).unwrap();
        assert_eq!(
            def.extra.get("label").and_then(|v| v.as_str()),
            Some("ancillary")
        );
    }
}
