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

//! Load the [Socket] section of a unit fragment and turn it into the
//! processed configuration the rest of the component works on: the typed
//! section data, the resolved service reference and the parsed ports.
#![allow(non_snake_case)]
use super::base::{NetlinkProtocol, PortType, SocketCommand};
use super::comm::SocketUnitComm;
use basic::time::{USEC_INFINITY, USEC_PER_SEC};
use libcore::error::*;
use libcore::exec::{parse_exec_command, ExecCommand};
use libcore::serialize::DeserializeWith;
use libcore::unit::{KillContext, KillMode};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::socket::{
    self, sockopt, AddressFamily, NetlinkAddr, SockFlag, SockProtocol, SockType, SockaddrIn,
    SockaddrIn6, SockaddrLike, SockaddrStorage, UnixAddr,
};
use nix::sys::stat;
use serde::{Deserialize, Deserializer};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::prelude::RawFd;
use std::path::PathBuf;
use std::rc::Rc;
use std::str::FromStr;

pub(crate) const DEFAULT_TIMEOUT_SEC: u64 = 90;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(v: OneOrMany<T>) -> Self {
        match v {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }
}

fn de_listen<'de, D>(de: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(OneOrMany::<String>::deserialize(de)?.into())
}

fn de_exec_commands<'de, D>(de: D) -> std::result::Result<Vec<ExecCommand>, D::Error>
where
    D: Deserializer<'de>,
{
    let lines: Vec<String> = OneOrMany::<String>::deserialize(de)?.into();
    let mut res = Vec::new();
    for line in lines {
        let cmds = parse_exec_command(&line).map_err(serde::de::Error::custom)?;
        res.extend(cmds);
    }
    Ok(res)
}

/// modes are written the chmod way, as octal strings
fn de_mode<'de, D>(de: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(de)?;
    parse_mode(&s).map_err(serde::de::Error::custom)
}

pub(super) fn parse_mode(s: &str) -> Result<u32> {
    u32::from_str_radix(s, 8).map_err(|_| Error::ConfigureError {
        msg: format!("Invalid mode: {}", s),
    })
}

/// IPV6_V6ONLY behavior of a dual-stack listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketAddressBindIpv6Only {
    /// leave the kernel default alone
    Default,
    /// accept v4-mapped connections too
    Both,
    /// v6 traffic only
    Ipv6Only,
}

impl Default for SocketAddressBindIpv6Only {
    fn default() -> Self {
        Self::Default
    }
}

fn de_bind_ipv6_only<'de, D>(de: D) -> std::result::Result<SocketAddressBindIpv6Only, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(de)?;
    match s.as_str() {
        "default" => Ok(SocketAddressBindIpv6Only::Default),
        "both" => Ok(SocketAddressBindIpv6Only::Both),
        "ipv6-only" => Ok(SocketAddressBindIpv6Only::Ipv6Only),
        _ => Err(serde::de::Error::custom(format!(
            "invalid BindIPv6Only: {}",
            s
        ))),
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub(crate) struct SectionSocket {
    #[serde(deserialize_with = "de_exec_commands")]
    pub ExecStartPre: Vec<ExecCommand>,
    #[serde(deserialize_with = "de_exec_commands")]
    pub ExecStartPost: Vec<ExecCommand>,
    #[serde(deserialize_with = "de_exec_commands")]
    pub ExecStopPre: Vec<ExecCommand>,
    #[serde(deserialize_with = "de_exec_commands")]
    pub ExecStopPost: Vec<ExecCommand>,

    #[serde(deserialize_with = "de_listen")]
    pub ListenStream: Vec<String>,
    #[serde(deserialize_with = "de_listen")]
    pub ListenDatagram: Vec<String>,
    #[serde(deserialize_with = "de_listen")]
    pub ListenSequentialPacket: Vec<String>,
    #[serde(deserialize_with = "de_listen")]
    pub ListenNetlink: Vec<String>,
    #[serde(deserialize_with = "de_listen")]
    pub ListenFIFO: Vec<String>,
    #[serde(deserialize_with = "de_listen")]
    pub ListenSpecial: Vec<String>,
    #[serde(deserialize_with = "de_listen")]
    pub ListenMessageQueue: Vec<String>,

    pub Accept: bool,
    pub Service: Option<String>,
    pub Backlog: u32,
    pub MaxConnections: u32,
    #[serde(deserialize_with = "de_bind_ipv6_only")]
    pub BindIPv6Only: SocketAddressBindIpv6Only,
    pub BindToDevice: Option<String>,
    #[serde(deserialize_with = "de_mode")]
    pub SocketMode: u32,
    #[serde(deserialize_with = "de_mode")]
    pub DirectoryMode: u32,

    pub KeepAlive: bool,
    pub Broadcast: bool,
    pub PassCredentials: bool,
    pub PassSecurity: bool,
    pub FreeBind: bool,
    pub Transparent: bool,
    pub ReusePort: bool,
    pub Priority: Option<i32>,
    pub ReceiveBuffer: Option<u64>,
    pub SendBuffer: Option<u64>,
    pub IPTOS: Option<i32>,
    pub IPTTL: Option<i32>,
    pub Mark: Option<i32>,
    pub PipeSize: Option<u64>,
    pub TCPCongestion: Option<String>,
    pub SmackLabel: Option<String>,
    pub SmackLabelIPIn: Option<String>,
    pub SmackLabelIPOut: Option<String>,

    pub MessageQueueMaxMessages: i64,
    pub MessageQueueMessageSize: i64,

    pub SocketUser: String,
    pub SocketGroup: String,

    pub TimeoutSec: u64,
    pub PAMName: Option<String>,

    #[serde(deserialize_with = "KillMode::deserialize_with")]
    pub KillMode: KillMode,
    pub KillSignal: String,
    pub SendSIGKILL: bool,
}

impl Default for SectionSocket {
    fn default() -> Self {
        SectionSocket {
            ExecStartPre: Vec::new(),
            ExecStartPost: Vec::new(),
            ExecStopPre: Vec::new(),
            ExecStopPost: Vec::new(),
            ListenStream: Vec::new(),
            ListenDatagram: Vec::new(),
            ListenSequentialPacket: Vec::new(),
            ListenNetlink: Vec::new(),
            ListenFIFO: Vec::new(),
            ListenSpecial: Vec::new(),
            ListenMessageQueue: Vec::new(),
            Accept: false,
            Service: None,
            Backlog: libc::SOMAXCONN as u32,
            MaxConnections: 64,
            BindIPv6Only: SocketAddressBindIpv6Only::Default,
            BindToDevice: None,
            SocketMode: 0o666,
            DirectoryMode: 0o755,
            KeepAlive: false,
            Broadcast: false,
            PassCredentials: false,
            PassSecurity: false,
            FreeBind: false,
            Transparent: false,
            ReusePort: false,
            Priority: None,
            ReceiveBuffer: None,
            SendBuffer: None,
            IPTOS: None,
            IPTTL: None,
            Mark: None,
            PipeSize: None,
            TCPCongestion: None,
            SmackLabel: None,
            SmackLabelIPIn: None,
            SmackLabelIPOut: None,
            MessageQueueMaxMessages: 0,
            MessageQueueMessageSize: 0,
            SocketUser: String::new(),
            SocketGroup: String::new(),
            TimeoutSec: DEFAULT_TIMEOUT_SEC,
            PAMName: None,
            KillMode: KillMode::ControlGroup,
            KillSignal: String::from("SIGTERM"),
            SendSIGKILL: true,
        }
    }
}

#[derive(Deserialize, Default, Debug)]
pub(crate) struct SocketConfigData {
    #[serde(default)]
    pub Socket: SectionSocket,
}

impl SocketConfigData {
    // keep consistency with the configuration, so just copy from it
    pub(self) fn get_exec_cmds(&self, cmd_type: SocketCommand) -> VecDeque<ExecCommand> {
        let cmds = match cmd_type {
            SocketCommand::StartPre => &self.Socket.ExecStartPre,
            SocketCommand::StartPost => &self.Socket.ExecStartPost,
            SocketCommand::StopPre => &self.Socket.ExecStopPre,
            SocketCommand::StopPost => &self.Socket.ExecStopPost,
            SocketCommand::StartChown => return VecDeque::new(),
        };
        cmds.iter().cloned().collect()
    }
}

/// the socket -> service activation edge
#[derive(Default)]
pub(crate) struct UnitRef {
    source: Option<String>,
    target: Option<String>,
}

impl UnitRef {
    ///
    pub fn new() -> Self {
        UnitRef {
            source: None,
            target: None,
        }
    }

    ///
    pub fn set_ref(&mut self, source: String, target: String) {
        self.source = Some(source);
        self.target = Some(target);
    }

    ///
    pub fn target(&self) -> Option<&String> {
        self.target.as_ref()
    }
}

pub(crate) struct SocketConfig {
    // associated objects
    comm: Rc<SocketUnitComm>,

    // owned objects
    /* original */
    data: Rc<RefCell<SocketConfigData>>,
    /* processed */
    service: RefCell<UnitRef>,
    ports: RefCell<Vec<Rc<SocketPortConf>>>,

    // resolved from the section data
    kill_context: Rc<KillContext>,
}

impl SocketConfig {
    pub(super) fn new(commr: &Rc<SocketUnitComm>) -> Self {
        SocketConfig {
            comm: Rc::clone(commr),
            data: Rc::new(RefCell::new(SocketConfigData::default())),
            service: RefCell::new(UnitRef::new()),
            ports: RefCell::new(Vec::new()),
            kill_context: Rc::new(KillContext::default()),
        }
    }

    pub(super) fn reset(&self) {
        self.data.replace(SocketConfigData::default());
        self.service.replace(UnitRef::new());
        self.ports.replace(Vec::new());
    }

    pub(super) fn load(&self, paths: Vec<PathBuf>) -> Result<()> {
        let path = match paths.iter().find(|p| p.exists()) {
            None => {
                return Err(Error::ConfigureError {
                    msg: "no existing configuration fragment".to_string(),
                })
            }
            Some(v) => v,
        };

        let content = std::fs::read_to_string(path).context(IoSnafu)?;
        let data: SocketConfigData = match toml::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Invalid Configuration: {}", e);
                return Err(Error::ConfigureError {
                    msg: format!("Invalid Configuration: {}", e),
                });
            }
        };

        // record the original configuration
        *self.data.borrow_mut() = data;

        self.parse_kill_context()?;

        // parse and record the processed configuration
        let ret1 = self.parse_service();
        let ret2 = self.parse_port();
        if ret1.is_err() || ret2.is_err() {
            self.reset(); // fallback
            return ret1.and(ret2);
        }

        Ok(())
    }

    pub(super) fn config_data(&self) -> Rc<RefCell<SocketConfigData>> {
        self.data.clone()
    }

    pub(super) fn get_exec_cmds(&self, cmd_type: SocketCommand) -> VecDeque<ExecCommand> {
        self.data.borrow().get_exec_cmds(cmd_type)
    }

    pub(super) fn set_unit_ref(&self, service: String) {
        if let Some(u) = self.comm.owner() {
            self.service.borrow_mut().set_ref(u.id(), service);
        }
    }

    pub(super) fn unit_ref_target(&self) -> Option<String> {
        self.service.borrow().target().map(|v| v.to_string())
    }

    pub(super) fn ports(&self) -> Vec<Rc<SocketPortConf>> {
        self.ports.borrow().iter().cloned().collect::<_>()
    }

    pub(super) fn kill_context(&self) -> Rc<KillContext> {
        self.kill_context.clone()
    }

    /// the configured timeout, 0 disables it
    pub(super) fn timeout_usec(&self) -> u64 {
        match self.data.borrow().Socket.TimeoutSec {
            0 => USEC_INFINITY,
            sec => sec.saturating_mul(USEC_PER_SEC),
        }
    }

    fn parse_service(&self) -> Result<()> {
        if let Some(service) = self.config_data().borrow().Socket.Service.clone() {
            if !service.ends_with(".service") {
                return Err(Error::ConfigureError {
                    msg: format!("socket service must end with .service: {}", service),
                });
            }

            self.set_unit_ref(service);
        }

        Ok(())
    }

    fn parse_port(&self) -> Result<()> {
        log::debug!("begin to parse socket section");
        let data = self.data.clone();
        let binding = data.borrow();
        let config = &binding.Socket;
        self.parse_sockets(&config.ListenStream, ListenItem::Stream)?;
        self.parse_sockets(&config.ListenDatagram, ListenItem::Datagram)?;
        self.parse_sockets(&config.ListenNetlink, ListenItem::Netlink)?;
        self.parse_sockets(&config.ListenSequentialPacket, ListenItem::SequentialPacket)?;
        self.parse_paths(&config.ListenFIFO, PortType::Fifo)?;
        self.parse_paths(&config.ListenSpecial, PortType::Special)?;
        self.parse_paths(&config.ListenMessageQueue, PortType::MessageQueue)?;
        Ok(())
    }

    fn parse_sockets(&self, listens: &[String], listen_item: ListenItem) -> Result<()> {
        let socket_type = match listen_item {
            ListenItem::Datagram => SockType::Datagram,
            ListenItem::Stream => SockType::Stream,
            ListenItem::SequentialPacket => SockType::SeqPacket,
            ListenItem::Netlink => SockType::Raw,
        };

        let parse_func = match listen_item {
            ListenItem::Netlink => parse_netlink_address,
            _ => parse_socket_address,
        };

        for v in listens {
            if v.is_empty() {
                continue;
            }

            let socket_addr = match parse_func(v, socket_type) {
                Err(e) => {
                    log::error!("Invalid socket configuration {}: {}", v, e);
                    return Err(e);
                }
                Ok(addr) => addr,
            };

            let port = SocketPortConf::new(PortType::Socket, Some(socket_addr), v);
            self.push_port(Rc::new(port));
        }

        Ok(())
    }

    fn parse_paths(&self, listens: &[String], p_type: PortType) -> Result<()> {
        for v in listens {
            if v.is_empty() {
                continue;
            }
            if !v.starts_with('/') {
                return Err(Error::ConfigureError {
                    msg: format!("listen path is not absolute: {}", v),
                });
            }
            let port = SocketPortConf::new(p_type, None, v);
            self.push_port(Rc::new(port));
        }
        Ok(())
    }

    fn push_port(&self, port: Rc<SocketPortConf>) {
        self.ports.borrow_mut().push(port);
    }

    fn parse_kill_context(&self) -> Result<()> {
        self.kill_context
            .set_kill_mode(self.config_data().borrow().Socket.KillMode);

        let signal = Signal::from_str(&self.config_data().borrow().Socket.KillSignal)
            .context(NixSnafu)?;
        self.kill_context.set_kill_signal(signal);
        self.kill_context
            .set_send_sigkill(self.config_data().borrow().Socket.SendSIGKILL);
        Ok(())
    }
}

#[derive(PartialEq)]
enum ListenItem {
    Stream,
    Datagram,
    Netlink,
    SequentialPacket,
}

pub(crate) struct SocketPortConf {
    p_type: PortType,
    sa: Option<SocketAddress>,
    /* raw addr */
    listen: String,
}

impl SocketPortConf {
    pub(super) fn new(p_type: PortType, sa: Option<SocketAddress>, listenr: &str) -> SocketPortConf {
        SocketPortConf {
            p_type,
            sa,
            listen: String::from(listenr),
        }
    }

    pub(super) fn p_type(&self) -> PortType {
        self.p_type
    }

    pub(super) fn sa(&self) -> Option<&SocketAddress> {
        self.sa.as_ref()
    }

    pub(super) fn listen(&self) -> &str {
        &self.listen
    }

    pub(super) fn can_accept(&self) -> bool {
        match &self.sa {
            Some(sa) => sa.can_accept(),
            None => false,
        }
    }
}

/// parameters socket_listen needs besides the address itself
pub(crate) struct ListenContext {
    pub backlog: u32,
    pub socket_mode: u32,
    pub directory_mode: u32,
    pub bind_ipv6_only: SocketAddressBindIpv6Only,
    pub free_bind: bool,
    pub transparent: bool,
    pub reuse_port: bool,
    pub bind_to_device: Option<String>,
}

impl ListenContext {
    pub(super) fn from_config(socket: &SectionSocket) -> ListenContext {
        ListenContext {
            backlog: socket.Backlog,
            socket_mode: socket.SocketMode,
            directory_mode: socket.DirectoryMode,
            bind_ipv6_only: socket.BindIPv6Only,
            free_bind: socket.FreeBind,
            transparent: socket.Transparent,
            reuse_port: socket.ReusePort,
            bind_to_device: socket.BindToDevice.clone(),
        }
    }
}

/// a parsed listen address
pub(crate) enum AddressData {
    ///
    Inet(SocketAddr),
    ///
    Unix(UnixAddr),
    /// family plus multicast group
    Netlink { protocol: NetlinkProtocol, group: u32 },
}

pub(crate) struct SocketAddress {
    addr: AddressData,
    sa_type: SockType,
}

pub(super) fn errno_of(e: basic::Error) -> Errno {
    match e {
        basic::Error::Nix { source } => source,
        _ => Errno::EINVAL,
    }
}

impl SocketAddress {
    pub(super) fn new(addr: AddressData, sa_type: SockType) -> SocketAddress {
        SocketAddress { addr, sa_type }
    }

    pub(super) fn can_accept(&self) -> bool {
        matches!(self.sa_type, SockType::SeqPacket | SockType::Stream)
    }

    pub(super) fn sa_type(&self) -> SockType {
        self.sa_type
    }

    pub(super) fn path(&self) -> Option<PathBuf> {
        match &self.addr {
            AddressData::Unix(ua) => ua.path().map(|p| p.to_path_buf()),
            _ => None,
        }
    }

    pub(super) fn family(&self) -> AddressFamily {
        match &self.addr {
            AddressData::Inet(SocketAddr::V4(_)) => AddressFamily::Inet,
            AddressData::Inet(SocketAddr::V6(_)) => AddressFamily::Inet6,
            AddressData::Unix(_) => AddressFamily::Unix,
            AddressData::Netlink { .. } => AddressFamily::Netlink,
        }
    }

    /// create, configure, bind and (for stream types) listen the socket
    pub(super) fn socket_listen(
        &self,
        flags: SockFlag,
        ctx: &ListenContext,
    ) -> std::result::Result<RawFd, Errno> {
        log::debug!(
            "create socket, family: {:?}, type: {:?}",
            self.family(),
            self.sa_type
        );

        let fd = match &self.addr {
            AddressData::Netlink { protocol, .. } => {
                let proto =
                    SockProtocol::try_from(*protocol).map_err(|_| Errno::EPROTONOSUPPORT)?;
                socket::socket(AddressFamily::Netlink, self.sa_type, flags, Some(proto))?
            }
            _ => socket::socket(self.family(), self.sa_type, flags, None)?,
        };

        match self.bind_and_listen(fd, ctx) {
            Ok(_) => Ok(fd),
            Err(e) => {
                basic::fd::close(fd);
                Err(e)
            }
        }
    }

    fn bind_and_listen(&self, fd: RawFd, ctx: &ListenContext) -> std::result::Result<(), Errno> {
        basic::socket::set_reuse_addr(fd, true).map_err(errno_of)?;

        if self.family() == AddressFamily::Inet6
            && ctx.bind_ipv6_only != SocketAddressBindIpv6Only::Default
        {
            let v6only = ctx.bind_ipv6_only == SocketAddressBindIpv6Only::Ipv6Only;
            basic::socket::set_ipv6_only(fd, v6only).map_err(errno_of)?;
        }

        if matches!(
            self.family(),
            AddressFamily::Inet | AddressFamily::Inet6
        ) {
            if ctx.free_bind {
                if let Err(e) = basic::socket::set_free_bind(fd, true) {
                    log::warn!("IP_FREEBIND failed: {}", e);
                }
            }
            if ctx.transparent {
                if let Err(e) = basic::socket::set_transparent(fd, true) {
                    log::warn!("IP_TRANSPARENT failed: {}", e);
                }
            }
        }

        if ctx.reuse_port {
            if let Err(e) = basic::socket::set_reuse_port(fd, true) {
                log::warn!("SO_REUSEPORT failed: {}", e);
            }
        }

        if let Some(dev) = &ctx.bind_to_device {
            basic::socket::set_bind_to_device(fd, dev).map_err(errno_of)?;
        }

        match &self.addr {
            AddressData::Inet(SocketAddr::V4(v4)) => {
                socket::bind(fd, &SockaddrIn::from(*v4))?;
            }
            AddressData::Inet(SocketAddr::V6(v6)) => {
                socket::bind(fd, &SockaddrIn6::from(*v6))?;
            }
            AddressData::Unix(ua) => self.bind_unix(fd, ua, ctx)?,
            AddressData::Netlink { group, .. } => {
                socket::bind(fd, &NetlinkAddr::new(0, *group))?;
            }
        }

        if self.can_accept() {
            socket::listen(fd, ctx.backlog as usize)?;
        }

        Ok(())
    }

    fn bind_unix(&self, fd: RawFd, ua: &UnixAddr, ctx: &ListenContext) -> std::result::Result<(), Errno> {
        let path = match ua.path() {
            // abstract namespace, nothing on the filesystem
            None => return socket::bind(fd, ua),
            Some(v) => v.to_path_buf(),
        };

        basic::fs::mkdir_parents(&path, ctx.directory_mode).map_err(errno_of)?;

        let old_mask = stat::umask(stat::Mode::from_bits_truncate(!ctx.socket_mode & 0o777));
        let mut ret = socket::bind(fd, ua);
        if ret == Err(Errno::EADDRINUSE) {
            // a stale node is removed before re-creation, never after close
            self.unlink();
            ret = socket::bind(fd, ua);
        }
        stat::umask(old_mask);

        ret
    }

    /// remove the filesystem node of a path unix socket
    pub(super) fn unlink(&self) {
        if let Some(path) = self.path() {
            log::debug!("unlinking stale socket node {:?}", path);
            if let Err(e) = nix::unistd::unlink(&path) {
                log::warn!("Unable to unlink {:?}, error: {}", path, e);
            }
        }
    }

    /// structural match of an inherited descriptor against this address
    pub(super) fn matches_fd(&self, fd: RawFd) -> bool {
        let sotype = match socket::getsockopt(fd, sockopt::SockType) {
            Ok(v) => v,
            Err(_) => return false,
        };
        if sotype != self.sa_type {
            return false;
        }

        let storage: SockaddrStorage = match socket::getsockname(fd) {
            Ok(v) => v,
            Err(_) => return false,
        };

        match &self.addr {
            AddressData::Inet(SocketAddr::V4(v4)) => storage
                .as_sockaddr_in()
                .map_or(false, |sin| SocketAddrV4::from(*sin) == *v4),
            AddressData::Inet(SocketAddr::V6(v6)) => {
                storage.as_sockaddr_in6().map_or(false, |sin6| {
                    let got = SocketAddrV6::from(*sin6);
                    got.ip() == v6.ip() && got.port() == v6.port()
                })
            }
            AddressData::Unix(ua) => storage.as_unix_addr().map_or(false, |got| got == ua),
            AddressData::Netlink { protocol, group } => {
                if storage.family() != Some(AddressFamily::Netlink) {
                    return false;
                }
                if socket_protocol_raw(fd) != Some(*protocol as i32) {
                    return false;
                }
                storage
                    .as_netlink_addr()
                    .map_or(false, |na| na.groups() == *group)
            }
        }
    }
}

fn socket_protocol_raw(fd: RawFd) -> Option<i32> {
    let mut proto: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let r = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PROTOCOL,
            &mut proto as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if r < 0 {
        return None;
    }
    Some(proto)
}

pub(super) fn parse_netlink_address(item: &str, socket_type: SockType) -> Result<SocketAddress> {
    let words: Vec<&str> = item.split_whitespace().collect();
    if words.len() != 2 {
        return Err(Error::ConfigureError {
            msg: format!("Netlink configuration format is not correct: {}", item),
        });
    }

    let family = NetlinkProtocol::from(words[0]);
    if family == NetlinkProtocol::NetlinkInvalid {
        return Err(Error::ConfigureError {
            msg: format!("Netlink family is invalid: {}", words[0]),
        });
    }

    let group = words[1].parse::<u32>().map_err(|_| Error::ConfigureError {
        msg: format!("Netlink group is invalid: {}", words[1]),
    })?;

    Ok(SocketAddress::new(
        AddressData::Netlink {
            protocol: family,
            group,
        },
        socket_type,
    ))
}

pub(super) fn parse_socket_address(item: &str, socket_type: SockType) -> Result<SocketAddress> {
    if item.starts_with('/') {
        let unix_addr = UnixAddr::new(&PathBuf::from(item)).context(NixSnafu)?;
        return Ok(SocketAddress::new(AddressData::Unix(unix_addr), socket_type));
    }

    if let Some(stripped) = item.strip_prefix('@') {
        let unix_addr = UnixAddr::new_abstract(stripped.as_bytes()).context(NixSnafu)?;
        return Ok(SocketAddress::new(AddressData::Unix(unix_addr), socket_type));
    }

    if let Ok(port) = item.parse::<u16>() {
        if port == 0 {
            return Err(Error::ConfigureError {
                msg: format!("invalid port number: {}", item),
            });
        }

        let addr = if basic::socket::ipv6_is_supported() {
            SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0),
                port,
                0,
                0,
            ))
        } else {
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), port))
        };
        return Ok(SocketAddress::new(AddressData::Inet(addr), socket_type));
    }

    if let Ok(socket_addr) = item.parse::<SocketAddr>() {
        return Ok(SocketAddress::new(
            AddressData::Inet(socket_addr),
            socket_type,
        ));
    }

    Err(Error::ConfigureError {
        msg: format!("invalid listening configuration: {}", item),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SocketCommand;
    use libtests::get_project_root;

    fn config_with_owner() -> (Rc<SocketUnitComm>, SocketConfig) {
        let comm = Rc::new(SocketUnitComm::new());
        let config = SocketConfig::new(&comm);
        (comm, config)
    }

    #[test]
    fn test_socket_parse() {
        let mut file_path = get_project_root().unwrap();
        file_path.push("tests/test_units/uttest.socket");

        let (_comm, config) = config_with_owner();
        let result = config.load(vec![file_path]);

        assert!(result.is_ok());
        assert_eq!(config.ports().len(), 1);
        assert_eq!(config.config_data().borrow().Socket.SocketMode, 0o600);
        assert_eq!(
            config.config_data().borrow().Socket.ReceiveBuffer,
            Some(4096)
        );
        assert!(!config.get_exec_cmds(SocketCommand::StartPre).is_empty());
        assert_eq!(config.timeout_usec(), 90 * USEC_PER_SEC);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("777").unwrap(), 0o777);
        assert_eq!(parse_mode("0644").unwrap(), 0o644);
        assert!(parse_mode("-777").is_err());
        assert!(parse_mode("787").is_err());
        assert!(parse_mode("777aa").is_err());
        assert!(parse_mode("aaaaa").is_err());
    }

    #[test]
    fn test_parse_socket_address() {
        let sa = parse_socket_address("/run/test.sock", SockType::Stream).unwrap();
        assert_eq!(sa.family(), AddressFamily::Unix);
        assert!(sa.can_accept());
        assert_eq!(sa.path().unwrap(), PathBuf::from("/run/test.sock"));

        let sa = parse_socket_address("@abstract-test", SockType::Stream).unwrap();
        assert_eq!(sa.family(), AddressFamily::Unix);
        assert_eq!(sa.path(), None);

        let sa = parse_socket_address("127.0.0.1:9000", SockType::Stream).unwrap();
        assert_eq!(sa.family(), AddressFamily::Inet);

        let sa = parse_socket_address("31972", SockType::Datagram).unwrap();
        assert!(!sa.can_accept());

        assert!(parse_socket_address("0", SockType::Stream).is_err());
        assert!(parse_socket_address("not-an-address", SockType::Stream).is_err());
    }

    #[test]
    fn test_parse_netlink_address() {
        let sa = parse_netlink_address("route 0", SockType::Raw).unwrap();
        assert_eq!(sa.family(), AddressFamily::Netlink);

        assert!(parse_netlink_address("route", SockType::Raw).is_err());
        assert!(parse_netlink_address("bogus 0", SockType::Raw).is_err());
        assert!(parse_netlink_address("route x", SockType::Raw).is_err());
    }
}
