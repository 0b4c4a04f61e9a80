// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Example of listing the chips on the system and describing their lines.

use gpiotag::chip::chips;
use gpiotag::Device;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for path in chips()? {
        let dev = Device::open(path.as_path())?;
        let ci = dev.describe_chip()?;
        println!(
            "{} - {} lines [{}]",
            ci.name.as_deref().unwrap_or("??"),
            ci.num_lines,
            ci.label.as_deref().unwrap_or("unlabelled")
        );
        for li in dev.line_infos()? {
            let li = li?;
            println!(
                "\t{:>3}: {:<16} {:<16} {:?}{}",
                li.offset,
                li.name.as_deref().unwrap_or("unnamed"),
                li.consumer.as_deref().unwrap_or("unused"),
                li.direction,
                if li.active_low { " active-low" } else { "" }
            );
        }
    }
    Ok(())
}
