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

//! clock helpers, everything in microseconds

///
pub const USEC_PER_SEC: u64 = 1_000_000;
///
pub const NSEC_PER_USEC: u64 = 1_000;
///
pub const NSEC_PER_SEC: u64 = 1_000_000_000;
/// the value representing "no deadline"
pub const USEC_INFINITY: u64 = u64::MAX;

/// current CLOCK_MONOTONIC reading in microseconds
pub fn monotonic_usec() -> u64 {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut tp) } < 0 {
        return USEC_INFINITY;
    }

    if tp.tv_sec < 0 || tp.tv_nsec < 0 {
        return USEC_INFINITY;
    }

    (tp.tv_sec as u64) * USEC_PER_SEC + (tp.tv_nsec as u64) / NSEC_PER_USEC
}

#[cfg(test)]
mod tests {
    use super::monotonic_usec;

    #[test]
    fn test_monotonic_usec() {
        let a = monotonic_usec();
        let b = monotonic_usec();
        assert!(a > 0);
        assert!(b >= a);
    }
}
