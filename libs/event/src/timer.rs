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

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    rc::Rc,
};

use crate::{EventType, Source};
use basic::time::{NSEC_PER_USEC, USEC_INFINITY, USEC_PER_SEC};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Timestamp {
    realtime: u64,
    monotonic: u64,
}

impl Timestamp {
    fn new() -> Timestamp {
        Self {
            realtime: 0,
            monotonic: 0,
        }
    }

    fn now(&mut self) -> Self {
        self.realtime = Self::read_clock(libc::CLOCK_REALTIME);
        self.monotonic = Self::read_clock(libc::CLOCK_MONOTONIC);
        *self
    }

    fn read_clock(clock: libc::clockid_t) -> u64 {
        let mut tp = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(clock, &mut tp) } < 0 {
            return USEC_INFINITY;
        }
        if tp.tv_sec < 0 || tp.tv_nsec < 0 {
            return USEC_INFINITY;
        }
        (tp.tv_sec as u64) * USEC_PER_SEC + (tp.tv_nsec as u64) / NSEC_PER_USEC
    }
}

/// deadline bookkeeping for all timer sources, one heap per clock
#[derive(Debug)]
pub(crate) struct Timer {
    timer_set: HashMap<EventType, TimerInner>,
    timestamp: Timestamp,
}

impl Timer {
    pub(crate) fn new() -> Timer {
        Self {
            timer_set: HashMap::new(),
            timestamp: Timestamp::new(),
        }
    }

    pub(crate) fn clockid(&self, et: &EventType) -> libc::clockid_t {
        match et {
            EventType::TimerRealtime => libc::CLOCK_REALTIME,
            EventType::TimerMonotonic => libc::CLOCK_MONOTONIC,
            _ => unreachable!(),
        }
    }

    /// current reading of the clock backing `et`
    pub(crate) fn timerid(&mut self, et: &EventType) -> u64 {
        self.timestamp.now();
        match et {
            EventType::TimerRealtime => self.timestamp.realtime,
            EventType::TimerMonotonic => self.timestamp.monotonic,
            _ => unreachable!(),
        }
    }

    pub(crate) fn next(&mut self, et: &EventType) -> Option<u64> {
        match self.timer_set.get_mut(et) {
            Some(inner) => Some(inner.data.peek()?.next()),
            None => None,
        }
    }

    pub(crate) fn timer_stored(&self, next: u64) -> libc::itimerspec {
        libc::itimerspec {
            it_interval: libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: libc::timespec {
                tv_sec: (next / USEC_PER_SEC) as i64,
                tv_nsec: ((next % USEC_PER_SEC) * NSEC_PER_USEC) as i64,
            },
        }
    }

    #[allow(clippy::wrong_self_convention)]
    pub(crate) fn is_empty(&mut self, et: &EventType) -> bool {
        if let Some(inner) = self.timer_set.get_mut(et) {
            return inner.data.is_empty();
        }
        true
    }

    pub(crate) fn push(&mut self, source: Rc<dyn Source>) {
        let mut next = source.time_relative();
        let now = self.timerid(&source.event_type());
        if next > USEC_INFINITY - now {
            next = source.time();
        } else {
            next += now;
        }

        let cd = ClockData::new(source.clone(), next);
        let et = source.event_type();
        match self.timer_set.get_mut(&et) {
            Some(inner) => inner.push(cd),
            None => {
                let mut inner = TimerInner::new();
                inner.push(cd);
                self.timer_set.insert(et, inner);
            }
        };
    }

    /// pop one elapsed source, None if the earliest deadline is still ahead
    pub(crate) fn pop(&mut self, et: &EventType) -> Option<Rc<dyn Source>> {
        let now = self.timerid(et);
        match self.timer_set.get_mut(et) {
            Some(inner) => Some(inner.pop(now)?.source()),
            None => None,
        }
    }

    pub(crate) fn remove(&mut self, et: &EventType, source: Rc<dyn Source>) {
        if let Some(inner) = self.timer_set.get_mut(et) {
            inner.remove(source);
        }
    }
}

#[derive(Debug)]
pub(crate) struct TimerInner {
    data: BinaryHeap<ClockData>,
}

impl TimerInner {
    fn new() -> TimerInner {
        Self {
            data: BinaryHeap::new(),
        }
    }

    fn push(&mut self, cd: ClockData) {
        self.data.push(cd);
    }

    fn pop(&mut self, now: u64) -> Option<ClockData> {
        match self.data.peek() {
            Some(cd) if cd.next() <= now => self.data.pop(),
            _ => None,
        }
    }

    fn remove(&mut self, source: Rc<dyn Source>) {
        let token = source.token();
        let kept = self
            .data
            .drain()
            .filter(|cd| cd.source.token() != token)
            .collect::<Vec<_>>();
        self.data.extend(kept);
    }
}

#[derive(Debug)]
struct ClockData {
    source: Rc<dyn Source>,
    next: u64,
}

impl ClockData {
    fn new(source: Rc<dyn Source>, next: u64) -> ClockData {
        Self { source, next }
    }

    fn source(&self) -> Rc<dyn Source> {
        self.source.clone()
    }

    fn next(&self) -> u64 {
        self.next
    }
}

// earliest deadline at the top of the heap
impl Ord for ClockData {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next.cmp(&other.next).reverse()
    }
}

impl PartialOrd for ClockData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ClockData {
    fn eq(&self, other: &Self) -> bool {
        self.next == other.next
    }
}

impl Eq for ClockData {}
