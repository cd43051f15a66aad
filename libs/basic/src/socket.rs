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

//! socket option helpers
//!
//! Each setter touches exactly one option so that callers can apply them
//! independently and decide per option whether a failure is fatal.
use crate::error::*;
use nix::errno::Errno;
use nix::sys::socket::{self, sockopt};
use std::ffi::{CString, OsString};
use std::mem::size_of;
use std::os::unix::prelude::RawFd;
use std::path::Path;

/// check the kernel has IPv6 support compiled in
pub fn ipv6_is_supported() -> bool {
    Path::new("/proc/net/if_inet6").exists()
}

fn setsockopt_raw<T>(fd: RawFd, level: i32, optname: i32, val: &T) -> Result<()> {
    let r = unsafe {
        libc::setsockopt(
            fd,
            level,
            optname,
            val as *const T as *const libc::c_void,
            size_of::<T>() as libc::socklen_t,
        )
    };
    if r < 0 {
        return Err(Error::Nix {
            source: Errno::last(),
        });
    }
    Ok(())
}

///
pub fn set_keepalive_state(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::KeepAlive, &v).context(NixSnafu)
}

///
pub fn set_broadcast_state(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::Broadcast, &v).context(NixSnafu)
}

///
pub fn set_pass_cred(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::PassCred, &v).context(NixSnafu)
}

/// SO_PASSSEC is not wrapped by nix
pub fn set_pass_sec(fd: RawFd, v: bool) -> Result<()> {
    let b: libc::c_int = v.into();
    setsockopt_raw(fd, libc::SOL_SOCKET, libc::SO_PASSSEC, &b)
}

///
pub fn set_priority(fd: RawFd, v: i32) -> Result<()> {
    socket::setsockopt(fd, sockopt::Priority, &v).context(NixSnafu)
}

/// try the privileged variant first, fall back to the rlimit-checked one
pub fn set_receive_buffer(fd: RawFd, v: usize) -> Result<()> {
    if socket::setsockopt(fd, sockopt::RcvBufForce, &v).is_ok() {
        return Ok(());
    }
    socket::setsockopt(fd, sockopt::RcvBuf, &v).context(NixSnafu)
}

///
pub fn set_send_buffer(fd: RawFd, v: usize) -> Result<()> {
    if socket::setsockopt(fd, sockopt::SndBufForce, &v).is_ok() {
        return Ok(());
    }
    socket::setsockopt(fd, sockopt::SndBuf, &v).context(NixSnafu)
}

///
pub fn set_mark(fd: RawFd, v: u32) -> Result<()> {
    socket::setsockopt(fd, sockopt::Mark, &v).context(NixSnafu)
}

///
pub fn set_ip_tos(fd: RawFd, v: i32) -> Result<()> {
    setsockopt_raw(fd, libc::IPPROTO_IP, libc::IP_TOS, &v)
}

/// apply the TTL to both v4 and v6; succeeds if either family took it
pub fn set_ip_ttl(fd: RawFd, v: i32) -> Result<()> {
    let r4 = setsockopt_raw(fd, libc::IPPROTO_IP, libc::IP_TTL, &v);

    let r6 = if ipv6_is_supported() {
        setsockopt_raw(fd, libc::IPPROTO_IPV6, libc::IPV6_UNICAST_HOPS, &v)
    } else {
        Err(Error::Nix {
            source: Errno::EAFNOSUPPORT,
        })
    };

    if r4.is_err() && r6.is_err() {
        return r4;
    }
    Ok(())
}

/// TCP_CONGESTION takes the algorithm name with its terminating NUL
pub fn set_tcp_congestion(fd: RawFd, v: &str) -> Result<()> {
    let name = CString::new(v).map_err(|_| Error::Invalid {
        what: "congestion algorithm name".to_string(),
    })?;
    let bytes = name.as_bytes_with_nul();
    let r = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_TCP,
            libc::TCP_CONGESTION,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len() as libc::socklen_t,
        )
    };
    if r < 0 {
        return Err(Error::Nix {
            source: Errno::last(),
        });
    }
    Ok(())
}

///
pub fn set_reuse_port(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::ReusePort, &v).context(NixSnafu)
}

///
pub fn set_reuse_addr(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::ReuseAddr, &v).context(NixSnafu)
}

///
pub fn set_free_bind(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::IpFreebind, &v).context(NixSnafu)
}

///
pub fn set_transparent(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::IpTransparent, &v).context(NixSnafu)
}

///
pub fn set_ipv6_only(fd: RawFd, v: bool) -> Result<()> {
    socket::setsockopt(fd, sockopt::Ipv6V6Only, &v).context(NixSnafu)
}

///
pub fn set_bind_to_device(fd: RawFd, dev: &str) -> Result<()> {
    socket::setsockopt(fd, sockopt::BindToDevice, &OsString::from(dev)).context(NixSnafu)
}

/// F_SETPIPE_SZ, absent on pre-2.6.35 kernels
pub fn set_pipe_size(fd: RawFd, v: usize) -> Result<()> {
    let r = unsafe { libc::fcntl(fd, libc::F_SETPIPE_SZ, v as libc::c_int) };
    if r < 0 {
        return Err(Error::Nix {
            source: Errno::last(),
        });
    }
    Ok(())
}

/// write a SMACK security attribute of an open descriptor
pub fn set_smack_label_fd(fd: RawFd, attr: &str, label: &str) -> Result<()> {
    let attr = CString::new(attr).map_err(|_| Error::Invalid {
        what: "xattr name".to_string(),
    })?;
    let r = unsafe {
        libc::fsetxattr(
            fd,
            attr.as_ptr(),
            label.as_ptr() as *const libc::c_void,
            label.len(),
            0,
        )
    };
    if r < 0 {
        return Err(Error::Nix {
            source: Errno::last(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

    #[test]
    fn test_unix_sock_opts() {
        let (fd1, fd2) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_CLOEXEC,
        )
        .unwrap();

        set_pass_cred(fd1, true).unwrap();
        assert!(socket::getsockopt(fd1, sockopt::PassCred).unwrap());

        set_receive_buffer(fd1, 8192).unwrap();
        set_send_buffer(fd1, 8192).unwrap();

        crate::fd::close(fd1);
        crate::fd::close(fd2);
    }

    #[test]
    fn test_tcp_sock_opts() {
        let fd = socket::socket(
            AddressFamily::Inet,
            SockType::Stream,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .unwrap();

        set_keepalive_state(fd, true).unwrap();
        assert!(socket::getsockopt(fd, sockopt::KeepAlive).unwrap());

        set_reuse_addr(fd, true).unwrap();
        set_reuse_port(fd, true).unwrap();
        set_ip_tos(fd, 0x10).unwrap();
        set_ip_ttl(fd, 64).unwrap();

        crate::fd::close(fd);
    }
}
