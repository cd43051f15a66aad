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

//! Encapsulation of the epoll interface

use crate::Result;
use libc::{epoll_event, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD};
use std::cmp::max;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// syscall
#[macro_export]
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res < 0 {
            $crate::Result::Err($crate::Error::Syscall { syscall: stringify!($fn), errno: unsafe { *libc::__errno_location() }, ret: res })
        } else {
            $crate::Result::Ok(res)
        }
    }};
}

/// Encapsulation of the epoll interface
#[derive(Debug)]
pub struct Poll {
    epoll_fd: RawFd,
    n_sources: AtomicUsize,
}

impl Poll {
    /// create a new poller
    pub fn new() -> Result<Poll> {
        syscall!(epoll_create1(EPOLL_CLOEXEC)).map(|ep| Poll {
            epoll_fd: ep,
            n_sources: AtomicUsize::new(0),
        })
    }

    /// collect the ready events, timeout in milliseconds, -1 blocks
    pub fn poll(&self, timeout: i32) -> Result<Vec<epoll_event>> {
        let size = max(self.n_sources.load(Ordering::Relaxed), 1);
        let mut events = Vec::<epoll_event>::with_capacity(size);

        let n_ready = syscall!(epoll_wait(
            self.epoll_fd,
            events.as_mut_ptr(),
            events.capacity() as i32,
            timeout,
        ))?;

        unsafe {
            events.set_len(n_ready as usize);
        }

        Ok(events)
    }

    /// register the fd to the poller
    pub fn register(&self, fd: RawFd, event: &mut epoll_event) -> Result<()> {
        let res = syscall!(epoll_ctl(self.epoll_fd, EPOLL_CTL_ADD, fd, event)).map(|_| ());
        if res.is_ok() {
            self.n_sources.fetch_add(1, Ordering::Relaxed);
        }
        res
    }

    /// update the event mask of a registered fd
    pub fn reregister(&self, fd: RawFd, event: &mut epoll_event) -> Result<()> {
        syscall!(epoll_ctl(self.epoll_fd, EPOLL_CTL_MOD, fd, event)).map(|_| ())
    }

    /// unregister the fd from the poller
    pub fn unregister(&self, fd: RawFd) -> Result<()> {
        self.n_sources.fetch_sub(1, Ordering::Relaxed);
        syscall!(epoll_ctl(self.epoll_fd, EPOLL_CTL_DEL, fd, ptr::null_mut())).map(|_| ())
    }
}

impl Drop for Poll {
    fn drop(&mut self) {
        let _ = syscall!(close(self.epoll_fd));
    }
}

impl AsRawFd for Poll {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll_fd
    }
}

#[cfg(test)]
mod test {
    use super::Poll;
    use libc::EPOLLIN;
    use std::{net::TcpListener, os::unix::io::AsRawFd};

    #[test]
    fn epoll_add() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut events = libc::epoll_event {
            events: EPOLLIN as u32,
            u64: 0,
        };
        poll.register(listener.as_raw_fd(), &mut events).unwrap();
        let _ = poll.poll(0).unwrap();
        poll.reregister(listener.as_raw_fd(), &mut events).unwrap();
        poll.unregister(listener.as_raw_fd()).unwrap();
    }
}
