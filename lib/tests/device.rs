// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod common;

use common::{device, sim};
use gpiotag::line::Direction;
use gpiotag::sim::{SimCall, Simulator};
use gpiotag::{Device, Errno, ErrorKind, Handle, LineOptions, SessionOptions};

#[test]
fn open() {
    let s = Simulator::at(8, "/dev/gpiochip2");
    let dev = Device::open_with(s.clone(), 2).unwrap();
    assert_eq!(dev.path(), s.dev_path());
    dev.close().unwrap();
    assert_eq!(s.open_fds(), 0);

    let err = Device::open_with(s.clone(), 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchDevice);
    assert_eq!(err.errno(), Some(Errno::ENOENT));

    s.inject_fault(SimCall::Open, 1, Errno::EACCES);
    let err = Device::open_with(s.clone(), "/dev/gpiochip2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn open_cdev_missing() {
    let err = Device::open("/dev/gpiochip_does_not_exist").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchDevice);
}

#[test]
fn open_cdev_not_a_chip() {
    let dev = Device::open("/dev/null").unwrap();
    let err = dev.describe_chip().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InappropriateDevice);
}

#[test]
fn describe_chip() {
    let s = sim();
    s.set_label("banana");
    let dev = device(&s);
    let info = dev.describe_chip().unwrap();
    assert_eq!(info.name.as_deref(), Some("gpiochip0"));
    assert_eq!(info.label.as_deref(), Some("banana"));
    assert_eq!(info.num_lines, 32);
}

#[test]
fn describe_line() {
    let s = sim();
    s.name(17, "LED").unwrap();
    s.hog(4, "w1-gpio").unwrap();
    let dev = device(&s);

    let li = dev.describe_line(17).unwrap();
    assert_eq!(li.offset, 17);
    assert_eq!(li.name.as_deref(), Some("LED"));
    assert_eq!(li.consumer, None);
    assert!(!li.used);
    assert_eq!(li.direction, Direction::Input);

    let li = dev.describe_line(4).unwrap();
    assert!(li.used);
    assert_eq!(li.consumer.as_deref(), Some("w1-gpio"));

    let err = dev.describe_line(32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn describe_requested_line() {
    let s = sim();
    let dev = device(&s);
    let mut opts = SessionOptions::default();
    opts.as_output()
        .as_active_low()
        .as_open_drain()
        .with_consumer("relays");
    let _h = Handle::acquire(&dev, [(9, LineOptions::default())], &opts).unwrap();
    let li = dev.describe_line(9).unwrap();
    assert!(li.used);
    assert_eq!(li.consumer.as_deref(), Some("relays"));
    assert_eq!(li.direction, Direction::Output);
    assert!(li.active_low);
    assert!(li.open_drain);
    assert!(!li.open_source);
}

#[test]
fn line_infos() {
    let s = Simulator::new(4);
    s.name(2, "button").unwrap();
    let dev = device(&s);
    let infos: Vec<_> = dev.line_infos().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(infos.len(), 4);
    for (i, li) in infos.iter().enumerate() {
        assert_eq!(li.offset as usize, i);
    }
    assert_eq!(infos[2].name.as_deref(), Some("button"));

    assert_eq!(dev.find_line("button").map(|li| li.offset), Some(2));
    assert!(dev.find_line("nope").is_none());
}

#[test]
fn close_leaves_sessions() {
    let s = sim();
    let dev = device(&s);
    let h = Handle::acquire(
        &dev,
        [(3, LineOptions::tagged("a"))],
        SessionOptions::default().as_output(),
    )
    .unwrap();
    dev.close().unwrap();
    let mut buf = h.buffer();
    buf.set("a", true).unwrap();
    h.write(&buf).unwrap();
    assert!(s.get_level(3).unwrap().is_high());
}
