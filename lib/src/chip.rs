// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::backend::{Backend, Cdev};
use crate::line::{self, Offset};
use crate::{Error, Result, UapiCall};
use gpiotag_uapi::v1;
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::os::linux::fs::MetadataExt;
use std::os::unix::prelude::OsStrExt;
use std::path::{Path, PathBuf};

const CHARDEV_MODE: u32 = 0x2000;

/// Check if a path corresponds to a GPIO character device.
///
/// Returns the resolved path to the character device.
pub fn is_chip<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let pb = fs::canonicalize(&path).map_err(os_error)?;
    // if canonical path is of form /dev/gpiochipXX assume we are good
    if let Some(pbstr) = pb.to_str() {
        if let Some(num) = pbstr.strip_prefix("/dev/gpiochip") {
            if num.chars().all(|c| c.is_ascii_digit()) {
                return Ok(pb);
            }
        }
    }

    // else take a more detailed look...
    let m = fs::metadata(&pb).map_err(os_error)?;
    if m.st_mode() & CHARDEV_MODE == 0 {
        return Err(Error::NotGpioChip(pb));
    }
    let file_name = match pb.file_name() {
        Some(n) => n,
        None => return Err(Error::NotGpioChip(pb)),
    };
    let mut sysfs_dev = PathBuf::from("/sys/bus/gpio/devices");
    sysfs_dev.push(file_name);
    sysfs_dev.push("dev");
    if let Ok(rdev) = fs::read_to_string(sysfs_dev) {
        let st_rdev = m.st_rdev();
        let dev_str = format!("{}:{}", (st_rdev as u16 >> 8) as u8, st_rdev as u8);
        if rdev.trim_end() == dev_str {
            return Ok(pb);
        }
    }
    Err(Error::NotGpioChip(pb))
}

fn os_error(e: std::io::Error) -> Error {
    Error::Os(gpiotag_uapi::Errno::from_raw(e.raw_os_error().unwrap_or(0)))
}

/// Compare two chip paths.
///
// Sorts paths naturally, assuming any chip numbering is at the end of the path - as it is for gpiochips.
pub fn path_compare(a: &Path, b: &Path) -> std::cmp::Ordering {
    let a = a.as_os_str().as_bytes();
    let b = b.as_os_str().as_bytes();

    if a.len() == b.len() {
        // if equal length then just compare lexicographically
        return a.cmp(b);
    }
    for (ai, bi) in a.iter().zip(b.iter()) {
        if *ai != *bi {
            if !ai.is_ascii_digit() || !bi.is_ascii_digit() {
                // if either is not a digit then this character is definitive
                return (*ai).cmp(bi);
            }
            // else drop thru to length comparison
            break;
        }
    }
    // equal up to to the length of the shortest - or to digits and shorter numbers are smaller
    a.len().cmp(&b.len())
}

/// Returns the paths of all the GPIO character devices on the system.
///
/// The returned paths are sorted in name order and are confirmed to be GPIO character devices,
/// so there is no need to check them with [`is_chip`].
pub fn chips() -> Result<Vec<PathBuf>> {
    let mut chips = fs::read_dir("/dev")
        .map_err(os_error)?
        .filter_map(|x| x.ok())
        .flat_map(|de| is_chip(de.path()))
        .collect::<Vec<PathBuf>>();
    chips.sort_unstable_by(|a, b| path_compare(a, b));
    chips.dedup();
    Ok(chips)
}

/// Identifies a chip to open, either by path or by index.
///
/// An index `N` refers to the chip at `/dev/gpiochipN`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChipId {
    /// The path to the chip.
    Path(PathBuf),

    /// The index of the chip.
    Index(u32),
}

impl ChipId {
    /// The path the id refers to.
    pub fn path(&self) -> PathBuf {
        match self {
            ChipId::Path(p) => p.clone(),
            ChipId::Index(n) => PathBuf::from(format!("/dev/gpiochip{}", n)),
        }
    }
}

impl From<u32> for ChipId {
    fn from(n: u32) -> Self {
        ChipId::Index(n)
    }
}

impl From<&str> for ChipId {
    fn from(p: &str) -> Self {
        ChipId::Path(PathBuf::from(p))
    }
}

impl From<String> for ChipId {
    fn from(p: String) -> Self {
        ChipId::Path(PathBuf::from(p))
    }
}

impl From<&Path> for ChipId {
    fn from(p: &Path) -> Self {
        ChipId::Path(p.to_path_buf())
    }
}

impl From<PathBuf> for ChipId {
    fn from(p: PathBuf) -> Self {
        ChipId::Path(p)
    }
}

/// The publicly available information for a chip.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Info {
    /// The system name for the chip, such as "*gpiochip0*".
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,

    /// A functional name for the chip.
    ///
    /// This typically identifies the type of GPIO chip.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub label: Option<String>,

    /// The number of lines provided by the chip.
    pub num_lines: u32,
}

impl From<&v1::ChipInfo> for Info {
    fn from(ci: &v1::ChipInfo) -> Self {
        let name = |n: &gpiotag_uapi::Name| {
            (!n.is_empty()).then(|| n.as_os_str().to_string_lossy().into_owned())
        };
        Info {
            name: name(&ci.name),
            label: name(&ci.label),
            num_lines: ci.num_lines,
        }
    }
}

/// An open GPIO chip.
///
/// The chip is the source of [`Handle`] and [`Watcher`] sessions, which hold
/// their own descriptors and so are unaffected by the chip being closed.
///
/// [`Handle`]: crate::handle::Handle
/// [`Watcher`]: crate::watcher::Watcher
#[derive(Debug)]
pub struct Device<B: Backend = Cdev> {
    path: PathBuf,
    backend: B,
    fd: B::Fd,
}

impl Device<Cdev> {
    /// Open the GPIO character device identified by path or index.
    ///
    /// # Examples
    ///```no_run
    /// # fn example() -> gpiotag::Result<()> {
    /// let dev = gpiotag::Device::open(0)?;
    /// let info = dev.describe_chip()?;
    /// println!("{:?} has {} lines", info.label, info.num_lines);
    /// # Ok(())
    /// # }
    ///```
    pub fn open<I: Into<ChipId>>(id: I) -> Result<Self> {
        Self::open_with(Cdev, id)
    }
}

impl<B: Backend> Device<B> {
    /// Open the chip identified by path or index via the given backend.
    pub fn open_with<I: Into<ChipId>>(backend: B, id: I) -> Result<Self> {
        let path = id.into().path();
        let fd = backend
            .open(&path)
            .map_err(|e| Error::Uapi(UapiCall::Open, e))?;
        log::debug!("opened {}", path.display());
        Ok(Device { path, backend, fd })
    }

    /// The path of the chip.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the information for the chip.
    pub fn describe_chip(&self) -> Result<Info> {
        self.backend
            .chip_info(&self.fd)
            .map(|ci| Info::from(&ci))
            .map_err(|e| Error::Uapi(UapiCall::GetChipInfo, e))
    }

    /// Get the information for a line on the chip.
    pub fn describe_line(&self, offset: Offset) -> Result<line::Info> {
        self.backend
            .line_info(&self.fd, offset)
            .map(|li| line::Info::from(&li))
            .map_err(|e| Error::Uapi(UapiCall::GetLineInfo, e))
    }

    /// An iterator that returns the info for each line on the chip.
    pub fn line_infos(&self) -> Result<LineInfoIterator<'_, B>> {
        let info = self.describe_chip()?;
        Ok(LineInfoIterator {
            dev: self,
            offsets: 0..info.num_lines,
        })
    }

    /// Find the info for the named line.
    ///
    /// Returns the first matching line.
    pub fn find_line(&self, name: &str) -> Option<line::Info> {
        self.line_infos().ok().and_then(|iter| {
            iter.filter_map(|x| x.ok())
                .find(|li| li.name.as_deref() == Some(name))
        })
    }

    /// Close the chip.
    ///
    /// Sessions acquired from the chip remain open.
    pub fn close(self) -> Result<()> {
        log::debug!("closing {}", self.path.display());
        self.backend
            .close(self.fd)
            .map_err(|e| Error::Uapi(UapiCall::Close, e))
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn fd(&self) -> &B::Fd {
        &self.fd
    }
}

/// An iterator that returns the info for each line on a [`Device`].
pub struct LineInfoIterator<'a, B: Backend> {
    dev: &'a Device<B>,
    offsets: Range<Offset>,
}

impl<'a, B: Backend> Iterator for LineInfoIterator<'a, B> {
    type Item = Result<line::Info>;

    fn next(&mut self) -> Option<Result<line::Info>> {
        self.offsets
            .next()
            .map(|offset| self.dev.describe_line(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod chip_id {
        use super::*;

        #[test]
        fn path() {
            assert_eq!(ChipId::from(3).path(), PathBuf::from("/dev/gpiochip3"));
            assert_eq!(
                ChipId::from("/dev/gpiochip1").path(),
                PathBuf::from("/dev/gpiochip1")
            );
            assert_eq!(
                ChipId::from(Path::new("/tmp/chip")),
                ChipId::Path(PathBuf::from("/tmp/chip"))
            );
            assert_eq!(
                ChipId::from(String::from("/tmp/chip")),
                ChipId::from(PathBuf::from("/tmp/chip"))
            );
        }
    }

    mod info {
        use super::*;

        #[test]
        fn from_uapi() {
            let ui = v1::ChipInfo {
                name: "banana".into(),
                label: "peel".into(),
                num_lines: 42,
            };
            let i = Info::from(&ui);
            assert_eq!(i.num_lines, 42);
            assert_eq!(i.name.as_deref(), Some("banana"));
            assert_eq!(i.label.as_deref(), Some("peel"));

            let i = Info::from(&v1::ChipInfo::default());
            assert_eq!(i.name, None);
            assert_eq!(i.label, None);
        }
    }

    #[test]
    fn is_chip_rejects_others() {
        assert_eq!(
            is_chip("/dev/null"),
            Err(Error::NotGpioChip(PathBuf::from("/dev/null")))
        );
        assert!(is_chip("/dev/gpiochip_does_not_exist").is_err());
    }

    #[test]
    fn path_compare() {
        use super::path_compare;
        use std::cmp::Ordering;

        assert_eq!(
            path_compare(Path::new("/dev/gpiochip0"), Path::new("/dev/gpiochip0")),
            Ordering::Equal
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip0"), Path::new("/dev/gpiochip1")),
            Ordering::Less
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip3"), Path::new("/dev/gpiochip10")),
            Ordering::Less
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip3"), Path::new("/dev/gpiochip30")),
            Ordering::Less
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip10"), Path::new("/dev/gpiochip3")),
            Ordering::Greater
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip"), Path::new("/dev/gpiochip1")),
            Ordering::Less
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiechip0"), Path::new("/dev/gpiochip1")),
            Ordering::Less
        );
    }
}
