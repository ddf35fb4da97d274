// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Attaches to an existing video flow and prints each grain as it commits.
//!
//! ```text
//! read_video <domain-path> <flow-id>
//! ```

#[path = "common.rs"]
mod common;

use std::time::Duration;

use mxl::Instance;

fn main() -> Result<(), mxl::Error> {
    common::setup_logging();

    let mut args = std::env::args().skip(1);
    let domain = args.next().unwrap_or_else(|| "/dev/shm/mxl_demo".to_string());
    let flow_id: uuid::Uuid = args
        .next()
        .expect("usage: read_video <domain-path> <flow-id>")
        .parse()
        .expect("flow-id must be a UUID");

    let instance = Instance::new(&domain, Default::default())?;
    let (reader, config) = instance.create_flow_reader(flow_id)?;
    let grain_reader = reader.to_grain_reader()?;
    let rate = config.grain_rate()?;

    let mut index = instance.index(instance.now(), rate)?;
    loop {
        match grain_reader.get_grain(index, Duration::from_secs(5)) {
            Ok(view) => {
                tracing::info!(
                    index,
                    committed_size = view.committed_size(),
                    complete = view.is_complete(),
                    "received grain"
                );
                index += 1;
            }
            Err(mxl::Error::Timeout) => {
                tracing::warn!("no grain arrived within the timeout, stopping");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
