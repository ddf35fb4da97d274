// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Writes a handful of video grains into a flow, then exits.
//!
//! Run a `read_video` pointed at the same domain concurrently (or
//! afterwards) to see the reader side. Usage:
//!
//! ```text
//! write_video <domain-path> <flow-id> [grain-count]
//! ```

#[path = "common.rs"]
mod common;

use std::time::Duration;

use mxl::{Instance, InstanceOptions};

fn main() -> Result<(), mxl::Error> {
    common::setup_logging();

    let mut args = std::env::args().skip(1);
    let domain = args.next().unwrap_or_else(|| "/dev/shm/mxl_demo".to_string());
    let flow_id = args.next().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let grain_count: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(30);

    let instance = Instance::new(&domain, InstanceOptions::default())?;

    let grain_size: u64 = 1920 * 1080 * 2;
    let flow_def = format!(
        r#"{{
            "id": "{flow_id}",
            "format": "urn:x-nmos:format:video",
            "grain_rate": {{"numerator": 30000, "denominator": 1001}},
            "grain_size": {grain_size},
            "ring_size": 64
        }}"#
    );

    let (writer, config, created) = instance.create_flow_writer(&flow_def)?;
    tracing::info!(flow_id = %flow_id, created, "attached video flow writer");
    let grain_writer = writer.to_grain_writer()?;

    let rate = config.grain_rate()?;
    let mut index = instance.index(instance.now(), rate)?;
    for _ in 0..grain_count {
        let mut access = grain_writer.open_grain(index)?;
        access.payload_mut().fill((index % 256) as u8);
        access.commit_complete(grain_size as usize)?;
        tracing::info!(index, "committed grain");

        index += 1;
        instance.sleep_until_index(index, rate)?;
    }

    // Keep the flow attached for a moment so a reader started just after
    // this process can still find it before the handle drops.
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}
