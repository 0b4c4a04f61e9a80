// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of toggling a pair of tagged output lines.

use anyhow::Context;
use gpiotag::{Device, Handle, LineOptions, SessionOptions};
use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let dev = Device::open("/dev/gpiochip0").context("Failed to open chip")?;
    let mut opts = SessionOptions::default();
    opts.as_output().with_consumer("toggle-lines");
    let handle = Handle::acquire(
        &dev,
        [
            (22, LineOptions::tagged("led").with_initial_value(true).clone()),
            (12, LineOptions::tagged("relay")),
        ],
        &opts,
    )
    .context("Failed to request lines")?;
    // the handle holds its own descriptor
    dev.close()?;

    let mut buf = handle.buffer();
    handle.read(&mut buf)?;
    loop {
        println!("{:?}", buf);
        thread::sleep(Duration::from_millis(500));
        buf.toggle_all();
        handle.write(&buf).context("Failed to set values")?;
    }
}
