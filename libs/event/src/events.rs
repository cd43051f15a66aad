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

//! An event scheduling framework based on epoll
use crate::timer::Timer;
use crate::{EventState, EventType, Poll, Result, Source};
use nix::unistd;
use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap};
use std::mem::MaybeUninit;
use std::os::unix::prelude::RawFd;
use std::rc::Rc;

/// An event scheduling framework based on epoll
#[derive(Debug)]
pub struct Events {
    data: RefCell<EventsData>,
}

impl Drop for Events {
    fn drop(&mut self) {
        // repeating protection
        self.clear();
    }
}

impl Events {
    /// create event
    pub fn new() -> Result<Events> {
        Ok(Events {
            data: RefCell::new(EventsData::new()?),
        })
    }

    /// for all: add source which implement Source trait
    pub fn add_source(&self, source: Rc<dyn Source>) -> Result<i32> {
        self.data.borrow_mut().add_source(source)
    }

    /// for all: check if the source exists
    pub fn has_source(&self, source: Rc<dyn Source>) -> bool {
        self.data.borrow().has_source(source)
    }

    /// for all: delete source
    pub fn del_source(&self, source: Rc<dyn Source>) -> Result<i32> {
        self.data.borrow_mut().del_source(source)
    }

    /// for all: set the source enabled state
    pub fn set_enabled(&self, source: Rc<dyn Source>, state: EventState) -> Result<i32> {
        self.data.borrow_mut().set_enabled(source, state)
    }

    /// for all: exit event loop
    pub fn set_exit(&self) {
        self.data.borrow_mut().set_exit()
    }

    /// for all: Scheduling once, processing an event
    pub fn run(&self, timeout: i32) -> Result<i32> {
        if self.data.borrow().exit() {
            return Ok(0);
        }

        if !self.data.borrow_mut().prepare() {
            self.data.borrow_mut().wait(timeout);
        }

        self.dispatch()?;
        Ok(0)
    }

    /// for all: Process the event in a loop until exiting actively
    pub fn rloop(&self) -> Result<i32> {
        loop {
            if self.data.borrow().exit() {
                return Ok(0);
            }
            self.run(-1i32)?;
        }
    }

    /// private: Fetch the highest priority event processing on the pending queue
    fn dispatch(&self) -> Result<i32> {
        if self.data.borrow().exit() {
            return Ok(0);
        }

        let first = self.data.borrow_mut().pending_pop();
        let top = match first {
            None => return Ok(0),
            Some(v) => v,
        };

        let state = match self.data.borrow().source_state(top.token()) {
            None => return Ok(0),
            Some(v) => v.state,
        };

        match state {
            EventState::Off => {}
            EventState::On => {
                top.dispatch(self);
            }
            EventState::OneShot => {
                self.data
                    .borrow_mut()
                    .set_enabled(top.clone(), EventState::Off)?;

                top.dispatch(self);
            }
        }
        Ok(0)
    }

    /// The "events" represents the "epoll_event" returned by epoll_wait.
    pub fn epoll_event(&self, token: u64) -> u32 {
        self.data.borrow().epoll_event(token)
    }

    /// for test: clear all events to release resource
    /// repeating protection
    pub fn clear(&self) {
        self.data.borrow_mut().clear();
    }
}

#[derive(Debug, Clone)]
pub(crate) struct State {
    state: EventState,
    epoll_event: u32,
    in_pending: bool,
}

impl Default for State {
    fn default() -> State {
        State {
            state: EventState::Off,
            epoll_event: 0,
            in_pending: false,
        }
    }
}

const TIMER_TYPES: [EventType; 2] = [EventType::TimerMonotonic, EventType::TimerRealtime];

#[derive(Debug)]
pub(crate) struct EventsData {
    poller: Poll,
    exit: bool,
    sources: HashMap<u64, Rc<dyn Source>>,
    pending: BinaryHeap<Rc<dyn Source>>,
    state: HashMap<u64, State>,
    timerfd: HashMap<EventType, RawFd>,
    timer: Timer,
}

impl EventsData {
    fn new() -> Result<EventsData> {
        Ok(Self {
            poller: Poll::new()?,
            exit: false,
            sources: HashMap::new(),
            pending: BinaryHeap::new(),
            state: HashMap::new(),
            timerfd: HashMap::new(),
            timer: Timer::new(),
        })
    }

    fn add_source(&mut self, source: Rc<dyn Source>) -> Result<i32> {
        let token = source.token();

        if let EventType::Io = source.event_type() {
            self.sources.insert(token, source);
        }

        // default state
        self.state.insert(token, State::default());

        Ok(0)
    }

    fn has_source(&self, source: Rc<dyn Source>) -> bool {
        self.state.contains_key(&source.token())
    }

    fn del_source(&mut self, source: Rc<dyn Source>) -> Result<i32> {
        self.source_offline(&source)?;

        let token = source.token();
        match source.event_type() {
            EventType::Io => {
                self.sources.remove(&token);
            }
            et @ (EventType::TimerMonotonic | EventType::TimerRealtime) => {
                if self.timer.is_empty(&et) {
                    if let Some(fd) = self.timerfd.remove(&et) {
                        let _ = self.poller.unregister(fd);
                        let _ = unistd::close(fd);
                    }
                }
            }
        }

        self.state.remove(&token);

        Ok(0)
    }

    fn set_enabled(&mut self, source: Rc<dyn Source>, state: EventState) -> Result<i32> {
        let token = source.token();
        if let Some(current) = self.state.get(&token) {
            if current.state == state {
                return Ok(0);
            }
        }
        match state {
            EventState::On | EventState::OneShot => {
                self.source_online(&source)?;
            }
            EventState::Off => {
                self.source_offline(&source)?;
            }
        }

        if let Some(current) = self.state.get_mut(&token) {
            current.state = state;
        }

        Ok(0)
    }

    /// when set to on, register events to the listening queue
    fn source_online(&mut self, source: &Rc<dyn Source>) -> Result<i32> {
        let token = source.token();
        let mut event = libc::epoll_event {
            events: source.epoll_event(),
            u64: token,
        };

        match source.event_type() {
            EventType::Io => {
                self.poller.register(source.fd(), &mut event)?;
            }
            et @ (EventType::TimerMonotonic | EventType::TimerRealtime) => {
                if self.timerfd.get(&et).is_none() {
                    let fd = unsafe {
                        libc::timerfd_create(
                            self.timer.clockid(&et),
                            libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
                        )
                    };
                    self.timerfd.insert(et, fd);
                    self.poller.register(fd, &mut event)?;
                }
                self.timer.push(source.clone());
            }
        }

        Ok(0)
    }

    /// move the event out of the listening queue
    fn source_offline(&mut self, source: &Rc<dyn Source>) -> Result<i32> {
        // no need to unregister when the source is already offline
        match self.state.get(&source.token()) {
            Some(current) => {
                if current.state == EventState::Off {
                    return Ok(0);
                }
            }
            None => return Ok(0),
        }

        match source.event_type() {
            EventType::Io => {
                self.poller.unregister(source.fd())?;
            }
            et @ (EventType::TimerMonotonic | EventType::TimerRealtime) => {
                self.timer.remove(&et, source.clone());
            }
        }

        Ok(0)
    }

    pub(crate) fn epoll_event(&self, token: u64) -> u32 {
        match self.state.get(&token) {
            Some(t) => t.epoll_event,
            None => 0u32,
        }
    }

    /// Wait for events through the poller and add the corresponding
    /// sources to the pending queue
    fn wait(&mut self, timeout: i32) -> bool {
        let events = match self.poller.poll(timeout) {
            Ok(s) => s,
            Err(_) => return false,
        };

        for event in events.iter() {
            let token = event.u64;
            if let Some(source) = self.sources.get(&token).cloned() {
                self.pending_push(source, event.events);
            }
        }

        for et in TIMER_TYPES {
            let next = match self.timer.next(&et) {
                None => continue,
                Some(v) => v,
            };
            if self.timer.timerid(&et) < next {
                continue;
            }
            if !self.flush_timer(&et) {
                return false;
            }

            while let Some(source) = self.timer.pop(&et) {
                self.pending_push(source, 0);
            }
        }

        !self.pending_is_empty() || !events.is_empty()
    }

    fn prepare(&mut self) -> bool {
        let mut ret = false;

        for et in TIMER_TYPES {
            let next = match self.timer.next(&et) {
                None => continue,
                Some(v) => v,
            };

            if self.timer.timerid(&et) >= next {
                while let Some(source) = self.timer.pop(&et) {
                    self.pending_push(source, 0);
                }
                ret = true;
            } else if let Some(fd) = self.timerfd.get(&et) {
                let new_value = self.timer.timer_stored(next);
                let mut old_value = MaybeUninit::<libc::itimerspec>::zeroed();
                unsafe {
                    libc::timerfd_settime(
                        *fd,
                        libc::TFD_TIMER_ABSTIME,
                        &new_value,
                        old_value.as_mut_ptr(),
                    );
                }
            }
        }

        if !self.pending_is_empty() {
            return self.wait(0);
        }

        ret
    }

    fn pending_pop(&mut self) -> Option<Rc<dyn Source>> {
        if let Some(top) = self.pending.pop() {
            if let Some(state) = self.state.get_mut(&top.token()) {
                state.in_pending = false;
            }
            return Some(top);
        };

        None
    }

    fn pending_push(&mut self, source: Rc<dyn Source>, event: u32) {
        if let Some(current) = self.state.get_mut(&source.token()) {
            if current.in_pending {
                current.epoll_event |= event;
            } else {
                current.in_pending = true;
                current.epoll_event = event;
                self.pending.push(source);
            }
        }
    }

    fn source_state(&self, token: u64) -> Option<State> {
        self.state.get(&token).cloned()
    }

    fn set_exit(&mut self) {
        self.exit = true;
    }

    fn exit(&self) -> bool {
        self.exit
    }

    fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn flush_timer(&self, et: &EventType) -> bool {
        let timer_fd = match self.timerfd.get(et) {
            None => return true,
            Some(v) => *v,
        };
        if let Err(err) = unistd::read(timer_fd, &mut [0u8; 8]) {
            return err == nix::errno::Errno::EAGAIN || err == nix::errno::Errno::EINTR;
        }
        true
    }

    fn clear(&mut self) {
        self.sources.clear();
        self.pending.clear();
        self.state.clear();
        for (_, fd) in self.timerfd.drain() {
            let _ = unistd::close(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::os::unix::io::RawFd;

    struct IoSource {
        fd: RawFd,
        dispatched: RefCell<u32>,
    }

    impl Source for IoSource {
        fn fd(&self) -> RawFd {
            self.fd
        }

        fn event_type(&self) -> EventType {
            EventType::Io
        }

        fn epoll_event(&self) -> u32 {
            libc::EPOLLIN as u32
        }

        fn priority(&self) -> i8 {
            0
        }

        fn dispatch(&self, _: &Events) -> i32 {
            *self.dispatched.borrow_mut() += 1;
            0
        }

        fn token(&self) -> u64 {
            let data: u64 = unsafe { std::mem::transmute(self) };
            data
        }
    }

    struct TimerSource {
        usec: u64,
        dispatched: RefCell<u32>,
    }

    impl Source for TimerSource {
        fn event_type(&self) -> EventType {
            EventType::TimerMonotonic
        }

        fn time_relative(&self) -> u64 {
            self.usec
        }

        fn priority(&self) -> i8 {
            0
        }

        fn dispatch(&self, _: &Events) -> i32 {
            *self.dispatched.borrow_mut() += 1;
            0
        }

        fn token(&self) -> u64 {
            let data: u64 = unsafe { std::mem::transmute(self) };
            data
        }
    }

    #[test]
    fn test_io_dispatch() {
        let events = Events::new().unwrap();
        let (r, w) = nix::unistd::pipe().unwrap();

        let source = Rc::new(IoSource {
            fd: r,
            dispatched: RefCell::new(0),
        });
        events.add_source(source.clone()).unwrap();
        events
            .set_enabled(source.clone(), EventState::OneShot)
            .unwrap();

        nix::unistd::write(w, b"x").unwrap();
        events.run(100).unwrap();

        assert_eq!(*source.dispatched.borrow(), 1);

        events.del_source(source).unwrap();
        let _ = nix::unistd::close(r);
        let _ = nix::unistd::close(w);
    }

    #[test]
    fn test_timer_dispatch() {
        let events = Events::new().unwrap();

        let source = Rc::new(TimerSource {
            usec: 1_000,
            dispatched: RefCell::new(0),
        });
        events.add_source(source.clone()).unwrap();
        events
            .set_enabled(source.clone(), EventState::OneShot)
            .unwrap();

        for _ in 0..10 {
            events.run(10).unwrap();
            if *source.dispatched.borrow() > 0 {
                break;
            }
        }

        assert_eq!(*source.dispatched.borrow(), 1);
    }
}
