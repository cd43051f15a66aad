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

//! file descriptor helpers
use crate::error::*;
use nix::fcntl::{FcntlArg, FdFlag, OFlag};
use nix::sys::stat::SFlag;

/// check if the given stat.st_mode is a regular file
pub fn stat_is_reg(st_mode: u32) -> bool {
    st_mode & SFlag::S_IFMT.bits() == SFlag::S_IFREG.bits()
}

/// check if the given stat.st_mode is a char device
pub fn stat_is_char(st_mode: u32) -> bool {
    st_mode & SFlag::S_IFMT.bits() == SFlag::S_IFCHR.bits()
}

/// check if the given stat.st_mode is a fifo
pub fn stat_is_fifo(st_mode: u32) -> bool {
    st_mode & SFlag::S_IFMT.bits() == SFlag::S_IFIFO.bits()
}

///
pub fn fd_nonblock(fd: i32, nonblock: bool) -> Result<()> {
    assert!(fd >= 0);

    let flags = nix::fcntl::fcntl(fd, FcntlArg::F_GETFL).context(NixSnafu)?;
    let fd_flag = unsafe { OFlag::from_bits_unchecked(flags) };

    let nflag = match nonblock {
        true => fd_flag | OFlag::O_NONBLOCK,
        false => fd_flag & !OFlag::O_NONBLOCK,
    };

    if nflag == fd_flag {
        return Ok(());
    }

    nix::fcntl::fcntl(fd, FcntlArg::F_SETFL(nflag)).context(NixSnafu)?;

    Ok(())
}

///
pub fn fd_cloexec(fd: i32, cloexec: bool) -> Result<()> {
    assert!(fd >= 0);

    let flags = nix::fcntl::fcntl(fd, FcntlArg::F_GETFD).context(NixSnafu)?;
    let fd_flag = unsafe { FdFlag::from_bits_unchecked(flags) };

    let nflag = match cloexec {
        true => fd_flag | FdFlag::FD_CLOEXEC,
        false => fd_flag & !FdFlag::FD_CLOEXEC,
    };

    nix::fcntl::fcntl(fd, FcntlArg::F_SETFD(nflag)).context(NixSnafu)?;

    Ok(())
}

/// duplicate a descriptor above `min_fd`, close-on-exec set
pub fn fd_dup_cloexec(fd: i32, min_fd: i32) -> Result<i32> {
    assert!(fd >= 0);

    nix::fcntl::fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(min_fd)).context(NixSnafu)
}

///
pub fn close(fd: i32) {
    if let Err(e) = nix::unistd::close(fd) {
        log::warn!("close fd {} failed, errno: {}", fd, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::OFlag;
    use nix::sys::stat::{fstat, Mode};

    #[test]
    fn test_stat_predicates() {
        let fd = nix::fcntl::open("/dev/null", OFlag::O_RDONLY, Mode::empty()).unwrap();
        let st = fstat(fd).unwrap();
        assert!(stat_is_char(st.st_mode));
        assert!(!stat_is_reg(st.st_mode));
        assert!(!stat_is_fifo(st.st_mode));
        close(fd);
    }

    #[test]
    fn test_fd_dup_cloexec() {
        let fd = nix::fcntl::open("/dev/null", OFlag::O_RDONLY, Mode::empty()).unwrap();
        let copy = fd_dup_cloexec(fd, 3).unwrap();
        assert!(copy >= 3);
        assert_ne!(copy, fd);
        close(copy);
        close(fd);
    }
}
