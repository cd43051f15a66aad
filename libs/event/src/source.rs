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

//! # Everything scheduled by [`Events`] implements the Source trait
use crate::EventType;
use crate::Events;
use std::fmt::Debug;
use std::os::unix::io::RawFd;

/// Everything scheduled by [`Events`] implements the Source trait
pub trait Source {
    /// Io sources specify the fd to listen to
    fn fd(&self) -> RawFd {
        todo!()
    }

    /// absolute deadline in microseconds, timer sources only
    fn time(&self) -> u64 {
        u64::MAX
    }

    /// relative deadline in microseconds, takes precedence over time()
    fn time_relative(&self) -> u64 {
        u64::MAX
    }

    /// the kind of this source
    fn event_type(&self) -> EventType {
        EventType::Io
    }

    /// the epoll event mask to listen for
    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN | libc::EPOLLONESHOT) as u32
    }

    /// The token distinguishes sources; the recommended implementation is
    /// ```ignore
    /// fn token(&self) -> u64 {
    ///     let data: u64 = unsafe { std::mem::transmute(self) };
    ///     data
    /// }
    /// ```
    fn token(&self) -> u64;

    /// -127i8 ~ 128i8, the smaller the value, the higher the priority
    fn priority(&self) -> i8;

    /// The code of callback
    fn dispatch(&self, event: &Events) -> i32;

    /// The short description of this source
    fn description(&self) -> String {
        String::from("default")
    }
}

// for HashSet
impl std::hash::Hash for dyn Source {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        self.token().hash(state);
    }
}

impl PartialEq for dyn Source {
    fn eq(&self, other: &dyn Source) -> bool {
        self.token() == other.token()
    }
}

impl Eq for dyn Source {}

// for BinaryHeap
impl Ord for dyn Source {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority().cmp(&other.priority()).reverse()
    }
}

impl PartialOrd for dyn Source {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for dyn Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Source { ... }")
    }
}
