// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Support for carrying unit state across a controlled re-execution of the
//! manager: a textual `key value` snapshot stream plus a bag of duplicated
//! file descriptors that survive the exec by being marked non-CLOEXEC.

use crate::error::*;
use basic::fd;
use serde::Deserializer;
use std::io::Write;
use std::os::unix::prelude::RawFd;

/// deserialize a configuration entry from its string form
pub trait DeserializeWith: Sized {
    /// the deserialization target
    type Item;
    ///
    fn deserialize_with<'de, D>(de: D) -> std::result::Result<Self::Item, D::Error>
    where
        D: Deserializer<'de>;
}

/// write one `key value` snapshot line
pub fn serialize_item(f: &mut dyn Write, key: &str, value: &str) -> Result<()> {
    assert!(!key.contains(char::is_whitespace));

    writeln!(f, "{} {}", key, value).context(IoSnafu)
}

/// split a snapshot line into its key and value parts
pub fn deserialize_item(line: &str) -> Option<(&str, &str)> {
    let stripped = line.trim_end_matches('\n');
    if stripped.is_empty() {
        return None;
    }

    stripped.split_once(' ')
}

/// Descriptors kept open across re-execution. Serialization duplicates a
/// unit's descriptors into the bag; deserialization hands them back by
/// structural match against the unit's configured addresses.
#[derive(Debug, Default)]
pub struct FdBag {
    fds: Vec<RawFd>,
}

impl FdBag {
    ///
    pub fn new() -> FdBag {
        FdBag { fds: Vec::new() }
    }

    /// store a duplicate of the descriptor and return the copy
    pub fn put_dup(&mut self, fd: RawFd) -> Result<RawFd> {
        let copy = fd::fd_dup_cloexec(fd, 3).map_err(|e| Error::Util { source: e })?;
        self.fds.push(copy);
        Ok(copy)
    }

    /// adopt an inherited descriptor as-is
    pub fn insert(&mut self, fd: RawFd) {
        if !self.fds.contains(&fd) {
            self.fds.push(fd);
        }
    }

    ///
    pub fn contains(&self, fd: RawFd) -> bool {
        self.fds.contains(&fd)
    }

    /// hand the descriptor out of the bag, ownership moves to the caller
    pub fn remove(&mut self, fd: RawFd) -> RawFd {
        self.fds.retain(|v| *v != fd);
        fd
    }

    ///
    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.fds.iter().copied()
    }

    ///
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// close everything nobody claimed
    pub fn close_all(&mut self) {
        for fd in self.fds.drain(..) {
            fd::close(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_roundtrip() {
        let mut buf = Vec::new();
        serialize_item(&mut buf, "state", "listening").unwrap();
        serialize_item(&mut buf, "socket", "7 1 127.0.0.1:80").unwrap();

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            deserialize_item(lines.next().unwrap()),
            Some(("state", "listening"))
        );
        assert_eq!(
            deserialize_item(lines.next().unwrap()),
            Some(("socket", "7 1 127.0.0.1:80"))
        );
    }

    #[test]
    fn test_fd_bag() {
        let mut bag = FdBag::new();
        let fd = nix::fcntl::open(
            "/dev/null",
            nix::fcntl::OFlag::O_RDONLY,
            nix::sys::stat::Mode::empty(),
        )
        .unwrap();

        let copy = bag.put_dup(fd).unwrap();
        assert_ne!(copy, fd);
        assert!(bag.contains(copy));
        assert_eq!(bag.len(), 1);

        let back = bag.remove(copy);
        assert_eq!(back, copy);
        assert!(bag.is_empty());

        basic::fd::close(copy);
        basic::fd::close(fd);
    }
}
