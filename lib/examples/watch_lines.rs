// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of watching a set of tagged input lines for edges.

use anyhow::Context;
use gpiotag::{Device, EdgeDetection, LineOptions, SessionOptions, Watcher};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let dev = Device::open(0).context("Failed to open chip")?;
    let mut opts = SessionOptions::default();
    opts.with_consumer("watch-lines")
        .with_bias(gpiotag::line::Bias::PullUp);
    let watcher = Watcher::acquire(
        &dev,
        [
            (
                23,
                LineOptions::tagged("button")
                    .with_edge_detection(EdgeDetection::FallingEdge)
                    .clone(),
            ),
            (24, LineOptions::tagged("door")),
        ],
        &opts,
    )
    .context("Failed to watch lines")?;

    let mut buf = watcher.buffer();
    println!("door open: {}", watcher.poll(&mut buf, "door")?);
    loop {
        match watcher.wait_for_event(Some(Duration::from_secs(5)))? {
            Some(evt) => println!(
                "{:?} {} {:?}",
                evt.timestamp(),
                evt.tag,
                evt.edge
            ),
            None => println!("quiet..."),
        }
    }
}
