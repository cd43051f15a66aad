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

//! Socket is a unit type used for socket activation: the manager binds the
//! configured endpoints first and pulls the companion service up when a
//! request arrives, either handing all listening descriptors to one shared
//! service or spawning one service instance per accepted connection.
//!
//! The unit fragment carries the Unit, Socket and Install sections.
//!
//! # Example:
//! ``` toml
//! [Unit]
//! Description = "test service Socket"
//! Documentation = "test.service"
//!
//! [Socket]
//! ExecStartPre = ["/usr/bin/sleep 5"]
//! ListenStream = "31972"
//! ReceiveBuffer = 4096
//! SendBuffer = 4096
//! PassCredentials = false
//! PassSecurity = true
//! SocketMode = "0600"
//!
//! [Install]
//! WantedBy = "dbus.service"
//! ```
//! `[Socket]` section related configuration
//!
//! `ExecStartPre`
//!
//! The command lines to run before the listening sockets are created.
//! Similar settings exist for the other phases: ExecStartPost, ExecStopPre
//! and ExecStopPost. `-` in front of a path tolerates a failing exit.
//!
//! `ListenStream`, `ListenDatagram`, `ListenSequentialPacket`
//!
//! Configure a SOCK_STREAM, SOCK_DGRAM or SOCK_SEQPACKET endpoint:
//!
//! An address starting with / is bound as a path unix socket; @ binds into
//! the abstract namespace instead.
//!
//! A bare number is a port bound on the IPv6 wildcard, falling back to the
//! IPv4 wildcard when the kernel has no IPv6 support.
//!
//! `a.b.c.d:x` binds the IPv4 address a.b.c.d on port x; `[a]:x` binds the
//! IPv6 address a on port x.
//!
//! `ListenNetlink`
//!
//! A netlink socket to listen on, written as "{family} {group}". Supported
//! family names are route, inet-diag, selinux, iscsi, audit, fib-lookup,
//! netfilter, ip6-fw, dnrtmsg, kobject-uevent, scsitransport and rdma.
//!
//! `ListenFIFO`, `ListenSpecial`, `ListenMessageQueue`
//!
//! A FIFO node, a special file (from /dev, /proc or /sys) or a POSIX
//! message queue to watch, each given as an absolute path.
//!
//! `Accept`
//!
//! When false (the default) the companion service inherits all listening
//! descriptors and handles acceptance itself. When true every inbound
//! connection spawns a fresh service instance owning just that connection;
//! `MaxConnections` bounds the number of concurrently live instances.
//!
//! `SocketUser`, `SocketGroup`
//!
//! The owner applied to the created filesystem nodes.
//!
//! `SocketMode`
//!
//! The access mode of created file nodes, written as an octal string.

#[cfg(all(feature = "plugin", feature = "noplugin"))]
compile_error!("feature plugin and noplugin cannot be enabled at the same time");

pub use {manager::__um_obj_create, unit::__subunit_create_with_params};

// dependency:
// base -> {comm | config}
// {pid | spawn | port} ->
// {mng | load} -> unit -> manager

mod base;
mod comm;
mod config;
mod load;
mod manager;
mod mng;
mod pid;
mod port;
mod spawn;
mod unit;
