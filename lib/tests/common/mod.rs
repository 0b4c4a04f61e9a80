// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use gpiotag::sim::Simulator;
use gpiotag::{Device, LineOptions, Offset};

// a chip with enough lines to cover the typical header pins
pub fn sim() -> Simulator {
    Simulator::new(32)
}

pub fn device(sim: &Simulator) -> Device<Simulator> {
    Device::open_with(sim.clone(), sim.dev_path()).unwrap()
}

#[allow(dead_code)]
pub fn tagged(lines: &[(Offset, &str)]) -> Vec<(Offset, LineOptions)> {
    lines
        .iter()
        .map(|(o, t)| (*o, LineOptions::tagged(*t)))
        .collect()
}
