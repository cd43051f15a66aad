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

//! An event scheduling framework based on epoll, driving io readiness and
//! monotonic/realtime timers through a common [`Source`] trait.

pub mod error;
mod events;
mod poll;
mod source;
mod timer;

pub use error::{Error, Result};
pub use events::Events;
pub use poll::Poll;
pub use source::Source;

/// the kind of an event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// an fd watched for readiness
    Io,
    /// a CLOCK_MONOTONIC deadline
    TimerMonotonic,
    /// a CLOCK_REALTIME deadline
    TimerRealtime,
}

/// scheduling state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// dispatched every time it fires
    On,
    /// not scheduled
    Off,
    /// disabled again after the first dispatch
    OneShot,
}
