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

//! management of one configured endpoint: create, open, label and close
//! the descriptor behind it
//!

use crate::base::PortType;
use crate::config::{errno_of, ListenContext, SocketConfig, SocketPortConf};
use basic::fd::{stat_is_char, stat_is_fifo, stat_is_reg};
use constants::INVALID_FD;
use libcore::error::*;
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::socket::{self, SockFlag};
use nix::sys::stat::{self, fstat, Mode};
use nix::unistd::{getgid, getuid, Gid, Uid};
use std::cell::RefCell;
use std::ffi::CString;
use std::fmt;
use std::os::unix::prelude::RawFd;
use std::path::PathBuf;
use std::rc::Rc;

pub(crate) struct SocketPort {
    // associated objects
    config: Rc<SocketConfig>,
    p_conf: Rc<SocketPortConf>,

    // owned objects
    fd: RefCell<RawFd>,
}

impl SocketPort {
    pub(super) fn new(configr: &Rc<SocketConfig>, p_confr: &Rc<SocketPortConf>) -> Self {
        SocketPort {
            config: Rc::clone(configr),
            p_conf: Rc::clone(p_confr),

            fd: RefCell::new(INVALID_FD),
        }
    }

    pub(super) fn set_fd(&self, fd: RawFd) {
        *self.fd.borrow_mut() = fd;
    }

    /// take one pending connection off the listening socket
    pub(super) fn accept(&self) -> Result<RawFd> {
        loop {
            match socket::accept4(
                self.fd(),
                SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
            ) {
                Ok(v) => return Ok(v),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(Error::Nix { source: e }),
            }
        }
    }

    // process reentrant, an already open port is left alone
    pub(super) fn open_port(&self) -> Result<()> {
        if self.fd() >= 0 {
            return Ok(());
        }

        let binding = self.config.config_data();
        let conf = binding.borrow();
        let socket_mode = conf.Socket.SocketMode;

        let fd = match self.p_conf.p_type() {
            PortType::Socket => {
                let sa = match self.p_conf.sa() {
                    None => return Err(Error::InvalidData),
                    Some(v) => v,
                };
                let ctx = ListenContext::from_config(&conf.Socket);
                let flags = SockFlag::SOCK_CLOEXEC | SockFlag::SOCK_NONBLOCK;
                match sa.socket_listen(flags, &ctx) {
                    Err(e) => {
                        log::error!("Failed to listen {}: {}", self.p_conf.listen(), e);
                        return Err(Error::Nix { source: e });
                    }
                    Ok(v) => v,
                }
            }
            PortType::Fifo => {
                match self.open_fifo(socket_mode, conf.Socket.DirectoryMode) {
                    Err(e) => {
                        log::error!("Failed to open FIFO {}: {}", self.p_conf.listen(), e);
                        return Err(Error::Nix { source: e });
                    }
                    Ok(v) => v,
                }
            }
            PortType::Special => match self.open_special() {
                Err(e) => {
                    log::error!(
                        "Failed to open special file {}: {}",
                        self.p_conf.listen(),
                        e
                    );
                    return Err(Error::Nix { source: e });
                }
                Ok(v) => v,
            },
            PortType::MessageQueue => {
                match self.open_mqueue(
                    socket_mode,
                    conf.Socket.MessageQueueMaxMessages,
                    conf.Socket.MessageQueueMessageSize,
                ) {
                    Err(e) => {
                        log::error!(
                            "Failed to open message queue {}: {}",
                            self.p_conf.listen(),
                            e
                        );
                        return Err(Error::Nix { source: e });
                    }
                    Ok(v) => v,
                }
            }
        };
        log::debug!("Successfully opened port {}", self.p_conf.listen());

        self.set_fd(fd);

        Ok(())
    }

    /// Create the fifo node if needed and open it. The node must turn out
    /// to be our own fifo with exactly the requested access mode.
    fn open_fifo(&self, socket_mode: u32, directory_mode: u32) -> std::result::Result<RawFd, Errno> {
        let path = PathBuf::from(self.p_conf.listen());

        basic::fs::mkdir_parents(&path, directory_mode).map_err(errno_of)?;

        /* enforce the access mode, include the original umask in ours */
        let old_mask = stat::umask(Mode::from_bits_truncate(!socket_mode & 0o777));
        stat::umask(Mode::from_bits_truncate(
            (!socket_mode | old_mask.bits()) & 0o777,
        ));
        let r = nix::unistd::mkfifo(&path, Mode::from_bits_truncate(socket_mode));
        stat::umask(old_mask);

        match r {
            Ok(_) | Err(Errno::EEXIST) => {}
            Err(e) => return Err(e),
        }

        let oflag = OFlag::O_RDWR
            | OFlag::O_CLOEXEC
            | OFlag::O_NOCTTY
            | OFlag::O_NONBLOCK
            | OFlag::O_NOFOLLOW;
        let fd = open(&path, oflag, Mode::from_bits_truncate(socket_mode))?;

        let st = match fstat(fd) {
            Err(e) => {
                basic::fd::close(fd);
                return Err(e);
            }
            Ok(v) => v,
        };

        if !stat_is_fifo(st.st_mode)
            || (st.st_mode & 0o777) != (socket_mode & !old_mask.bits() & 0o777)
            || st.st_uid != getuid().as_raw()
            || st.st_gid != getgid().as_raw()
        {
            basic::fd::close(fd);
            return Err(Errno::EEXIST);
        }

        Ok(fd)
    }

    fn open_special(&self) -> std::result::Result<RawFd, Errno> {
        let oflag = OFlag::O_RDONLY
            | OFlag::O_CLOEXEC
            | OFlag::O_NOCTTY
            | OFlag::O_NONBLOCK
            | OFlag::O_NOFOLLOW;
        let fd = open(self.p_conf.listen(), oflag, Mode::empty())?;

        let st = match fstat(fd) {
            Err(e) => {
                basic::fd::close(fd);
                return Err(e);
            }
            Ok(v) => v,
        };

        /* anything from /proc, /sys or /dev: a regular file or char device */
        if !stat_is_reg(st.st_mode) && !stat_is_char(st.st_mode) {
            basic::fd::close(fd);
            return Err(Errno::EEXIST);
        }

        Ok(fd)
    }

    fn open_mqueue(
        &self,
        socket_mode: u32,
        maxmsg: i64,
        msgsize: i64,
    ) -> std::result::Result<RawFd, Errno> {
        let name = CString::new(self.p_conf.listen()).map_err(|_| Errno::EINVAL)?;

        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        let attr_ptr = if maxmsg > 0 && msgsize > 0 {
            attr.mq_flags = libc::O_NONBLOCK as libc::c_long;
            attr.mq_maxmsg = maxmsg;
            attr.mq_msgsize = msgsize;
            &attr as *const libc::mq_attr
        } else {
            std::ptr::null()
        };

        let old_mask = stat::umask(Mode::from_bits_truncate(!socket_mode & 0o777));
        stat::umask(Mode::from_bits_truncate(
            (!socket_mode | old_mask.bits()) & 0o777,
        ));
        let fd = unsafe {
            libc::mq_open(
                name.as_ptr(),
                libc::O_RDONLY | libc::O_CLOEXEC | libc::O_NONBLOCK | libc::O_CREAT,
                socket_mode as libc::mode_t,
                attr_ptr,
            )
        };
        stat::umask(old_mask);

        if fd < 0 {
            return Err(Errno::last());
        }

        let st = match fstat(fd) {
            Err(e) => {
                basic::fd::close(fd);
                return Err(e);
            }
            Ok(v) => v,
        };

        if (st.st_mode & 0o777) != (socket_mode & !old_mask.bits() & 0o777)
            || st.st_uid != getuid().as_raw()
            || st.st_gid != getgid().as_raw()
        {
            basic::fd::close(fd);
            return Err(Errno::EEXIST);
        }

        Ok(fd)
    }

    /// Close the descriptor. The filesystem node stays; stale nodes are
    /// removed right before re-creation, never here.
    pub(super) fn close(&self) {
        let fd = self.fd();
        if fd < 0 {
            return;
        }

        basic::fd::close(fd);
        log::debug!("Successfully closed port {}", self.p_conf.listen());
        self.set_fd(INVALID_FD);
    }

    pub(super) fn chown(&self, uid: Option<Uid>, gid: Option<Gid>) -> Result<()> {
        let path = match self.p_conf.p_type() {
            PortType::Fifo => Some(PathBuf::from(self.p_conf.listen())),
            PortType::Socket => self.p_conf.sa().and_then(|sa| sa.path()),
            _ => None,
        };

        if let Some(path) = path {
            nix::unistd::chown(&path, uid, gid).context(NixSnafu)?;
        }

        Ok(())
    }

    /// Apply the per-socket options. A failing option leaves a warning
    /// behind and never aborts the rest.
    pub(super) fn apply_sock_opt(&self, fd: RawFd) {
        let binding = self.config.config_data();
        let conf = binding.borrow();
        let socket = &conf.Socket;

        if socket.KeepAlive {
            if let Err(e) = basic::socket::set_keepalive_state(fd, true) {
                log::warn!("SO_KEEPALIVE failed: {}", e);
            }
        }

        if socket.Broadcast {
            if let Err(e) = basic::socket::set_broadcast_state(fd, true) {
                log::warn!("SO_BROADCAST failed: {}", e);
            }
        }

        if socket.PassCredentials {
            if let Err(e) = basic::socket::set_pass_cred(fd, true) {
                log::warn!("SO_PASSCRED failed: {}", e);
            }
        }

        if socket.PassSecurity {
            if let Err(e) = basic::socket::set_pass_sec(fd, true) {
                log::warn!("SO_PASSSEC failed: {}", e);
            }
        }

        if let Some(v) = socket.Priority {
            if let Err(e) = basic::socket::set_priority(fd, v) {
                log::warn!("SO_PRIORITY failed: {}", e);
            }
        }

        if let Some(v) = socket.ReceiveBuffer {
            if let Err(e) = basic::socket::set_receive_buffer(fd, v as usize) {
                log::warn!("SO_RCVBUF failed: {}", e);
            }
        }

        if let Some(v) = socket.SendBuffer {
            if let Err(e) = basic::socket::set_send_buffer(fd, v as usize) {
                log::warn!("SO_SNDBUF failed: {}", e);
            }
        }

        if let Some(v) = socket.Mark {
            if let Err(e) = basic::socket::set_mark(fd, v as u32) {
                log::warn!("SO_MARK failed: {}", e);
            }
        }

        if let Some(v) = socket.IPTOS {
            if let Err(e) = basic::socket::set_ip_tos(fd, v) {
                log::warn!("IP_TOS failed: {}", e);
            }
        }

        if let Some(v) = socket.IPTTL {
            if let Err(e) = basic::socket::set_ip_ttl(fd, v) {
                log::warn!("IP_TTL/IPV6_UNICAST_HOPS failed: {}", e);
            }
        }

        if let Some(v) = &socket.TCPCongestion {
            if let Err(e) = basic::socket::set_tcp_congestion(fd, v) {
                log::warn!("TCP_CONGESTION failed: {}", e);
            }
        }

        if socket.ReusePort {
            if let Err(e) = basic::socket::set_reuse_port(fd, true) {
                log::warn!("SO_REUSEPORT failed: {}", e);
            }
        }

        if let Some(label) = &socket.SmackLabelIPIn {
            if let Err(e) = basic::socket::set_smack_label_fd(fd, "security.SMACK64IPIN", label) {
                log::error!("fsetxattr(\"security.SMACK64IPIN\"): {}", e);
            }
        }

        if let Some(label) = &socket.SmackLabelIPOut {
            if let Err(e) = basic::socket::set_smack_label_fd(fd, "security.SMACK64IPOUT", label) {
                log::error!("fsetxattr(\"security.SMACK64IPOUT\"): {}", e);
            }
        }
    }

    /// fifo flavor of the option application, warn-only as well
    pub(super) fn apply_fifo_opt(&self, fd: RawFd) {
        let binding = self.config.config_data();
        let conf = binding.borrow();
        let socket = &conf.Socket;

        if let Some(v) = socket.PipeSize {
            if let Err(e) = basic::socket::set_pipe_size(fd, v as usize) {
                log::warn!("F_SETPIPE_SZ failed: {}", e);
            }
        }

        if let Some(label) = &socket.SmackLabel {
            if let Err(e) = basic::socket::set_smack_label_fd(fd, "security.SMACK64", label) {
                log::error!("fsetxattr(\"security.SMACK64\"): {}", e);
            }
        }
    }

    pub(super) fn fd(&self) -> RawFd {
        *self.fd.borrow()
    }

    pub(super) fn p_type(&self) -> PortType {
        self.p_conf.p_type()
    }

    pub(super) fn listen(&self) -> &str {
        self.p_conf.listen()
    }

    pub(super) fn can_accept(&self) -> bool {
        self.p_conf.can_accept()
    }

    pub(super) fn p_conf(&self) -> &SocketPortConf {
        &self.p_conf
    }
}

impl fmt::Display for SocketPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "port type: {:?}, listen: {}",
            self.p_conf.p_type(),
            self.p_conf.listen()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SocketUnitComm;
    use crate::config::{parse_netlink_address, parse_socket_address};
    use nix::sys::socket::{AddressFamily, SockType};

    fn test_port(p_type: PortType, listen: &str, sa: Option<crate::config::SocketAddress>) -> SocketPort {
        let comm = Rc::new(SocketUnitComm::new());
        let config = Rc::new(SocketConfig::new(&comm));
        let p_conf = Rc::new(SocketPortConf::new(p_type, sa, listen));
        SocketPort::new(&config, &p_conf)
    }

    #[test]
    fn test_socket_addr_v4() {
        let sa = parse_socket_address("127.0.0.1:0", SockType::Stream).unwrap();
        assert_eq!(sa.family(), AddressFamily::Inet);

        let port = test_port(PortType::Socket, "127.0.0.1:0", Some(sa));
        assert_eq!(port.fd(), INVALID_FD);

        port.open_port().unwrap();
        assert_ne!(port.fd(), INVALID_FD);

        port.apply_sock_opt(port.fd());
        port.close();
        assert_eq!(port.fd(), INVALID_FD);
    }

    #[test]
    fn test_socket_unix_addr() {
        let path = "/tmp/socket-port-unix-test.sock";
        let _ = std::fs::remove_file(path);

        let sa = parse_socket_address(path, SockType::Stream).unwrap();
        let port = test_port(PortType::Socket, path, Some(sa));

        port.open_port().unwrap();
        assert_ne!(port.fd(), INVALID_FD);

        // a second open is a no-op
        let fd = port.fd();
        port.open_port().unwrap();
        assert_eq!(port.fd(), fd);

        // close leaves the node behind, reopen reuses it
        port.close();
        assert!(std::path::Path::new(path).exists());
        port.open_port().unwrap();
        port.close();

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_socket_netlink() {
        let sa = parse_netlink_address("route 0", SockType::Raw).unwrap();
        let port = test_port(PortType::Socket, "route 0", Some(sa));

        port.open_port().unwrap();
        assert_ne!(port.fd(), INVALID_FD);
        port.close();
    }

    #[test]
    fn test_fifo_port() {
        let path = "/tmp/socket-port-fifo-test";
        let _ = std::fs::remove_file(path);

        let port = test_port(PortType::Fifo, path, None);
        port.open_port().unwrap();
        assert_ne!(port.fd(), INVALID_FD);
        port.apply_fifo_opt(port.fd());
        port.close();

        // the node survives the close and is picked up again
        port.open_port().unwrap();
        port.close();

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_special_port() {
        let port = test_port(PortType::Special, "/dev/null", None);
        port.open_port().unwrap();
        assert_ne!(port.fd(), INVALID_FD);
        port.close();
    }

    #[test]
    fn test_matches_fd() {
        let path = "/tmp/socket-port-match-test.sock";
        let _ = std::fs::remove_file(path);

        let sa = parse_socket_address(path, SockType::Stream).unwrap();
        let port = test_port(PortType::Socket, path, Some(sa));
        port.open_port().unwrap();

        let other = parse_socket_address("/tmp/socket-port-other.sock", SockType::Stream).unwrap();
        let dgram = parse_socket_address(path, SockType::Datagram).unwrap();

        assert!(port.p_conf().sa().unwrap().matches_fd(port.fd()));
        assert!(!other.matches_fd(port.fd()));
        assert!(!dgram.matches_fd(port.fd()));

        port.close();
        let _ = std::fs::remove_file(path);
    }
}
