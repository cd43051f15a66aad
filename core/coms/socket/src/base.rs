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

//! shared enums of the socket unit and the netlink protocol table

use nix::{libc, sys::socket::SockProtocol};
use std::str::FromStr;

#[cfg(feature = "plugin")]
pub(super) const PLUGIN_NAME: &str = "SocketUnit";

/// states the socket unit steps through
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub(crate) enum SocketState {
    Dead,
    StartPre,
    StartChown,
    StartPost,
    Listening,
    Running,
    StopPre,
    StopPreSigterm,
    StopPreSigkill,
    StopPost,
    FinalSigterm,
    FinalSigkill,
    Failed,
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SocketState::Dead => "dead",
            SocketState::StartPre => "start-pre",
            SocketState::StartChown => "start-chown",
            SocketState::StartPost => "start-post",
            SocketState::Listening => "listening",
            SocketState::Running => "running",
            SocketState::StopPre => "stop-pre",
            SocketState::StopPreSigterm => "stop-pre-sigterm",
            SocketState::StopPreSigkill => "stop-pre-sigkill",
            SocketState::StopPost => "stop-post",
            SocketState::FinalSigterm => "final-sigterm",
            SocketState::FinalSigkill => "final-sigkill",
            SocketState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SocketState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "dead" => SocketState::Dead,
            "start-pre" => SocketState::StartPre,
            "start-chown" => SocketState::StartChown,
            "start-post" => SocketState::StartPost,
            "listening" => SocketState::Listening,
            "running" => SocketState::Running,
            "stop-pre" => SocketState::StopPre,
            "stop-pre-sigterm" => SocketState::StopPreSigterm,
            "stop-pre-sigkill" => SocketState::StopPreSigkill,
            "stop-post" => SocketState::StopPost,
            "final-sigterm" => SocketState::FinalSigterm,
            "final-sigkill" => SocketState::FinalSigkill,
            "failed" => SocketState::Failed,
            _ => return Err(()),
        })
    }
}

/// how the last lifecycle of the unit ended
#[allow(missing_docs)]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum SocketResult {
    Success,
    FailureResources,
    FailureTimeout,
    FailureExitCode,
    FailureSignal,
    FailureCoreDump,
    FailureServiceFailedPermanent,
}

impl std::fmt::Display for SocketResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SocketResult::Success => "success",
            SocketResult::FailureResources => "resources",
            SocketResult::FailureTimeout => "timeout",
            SocketResult::FailureExitCode => "exit-code",
            SocketResult::FailureSignal => "signal",
            SocketResult::FailureCoreDump => "core-dump",
            SocketResult::FailureServiceFailedPermanent => "service-failed-permanent",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SocketResult {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "success" => SocketResult::Success,
            "resources" => SocketResult::FailureResources,
            "timeout" => SocketResult::FailureTimeout,
            "exit-code" => SocketResult::FailureExitCode,
            "signal" => SocketResult::FailureSignal,
            "core-dump" => SocketResult::FailureCoreDump,
            "service-failed-permanent" => SocketResult::FailureServiceFailedPermanent,
            _ => return Err(()),
        })
    }
}

/// the exec phase a control command belongs to
#[allow(missing_docs)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Copy, Clone)]
pub(crate) enum SocketCommand {
    StartPre,
    StartChown,
    StartPost,
    StopPre,
    StopPost,
}

impl std::fmt::Display for SocketCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SocketCommand::StartPre => "StartPre",
            SocketCommand::StartChown => "StartChown",
            SocketCommand::StartPost => "StartPost",
            SocketCommand::StopPre => "StopPre",
            SocketCommand::StopPost => "StopPost",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SocketCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "StartPre" => SocketCommand::StartPre,
            "StartChown" => SocketCommand::StartChown,
            "StartPost" => SocketCommand::StartPost,
            "StopPre" => SocketCommand::StopPre,
            "StopPost" => SocketCommand::StopPost,
            _ => return Err(()),
        })
    }
}

/// the flavor of one configured endpoint
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PortType {
    Socket,
    Fifo,
    Special,
    MessageQueue,
}

impl Default for PortType {
    fn default() -> Self {
        Self::Socket
    }
}

#[repr(i32)]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub(super) enum NetlinkProtocol {
    NetlinkRoute = libc::NETLINK_ROUTE,
    NetlinkFirewall = libc::NETLINK_FIREWALL,
    NetlinkInetDiag = libc::NETLINK_INET_DIAG,
    NetlinkNflog = libc::NETLINK_NFLOG,
    NetlinkXfrm = libc::NETLINK_XFRM,
    NetlinkSelinux = libc::NETLINK_SELINUX,
    NetlinkIscsi = libc::NETLINK_ISCSI,
    NetlinkAudit = libc::NETLINK_AUDIT,
    NetlinkFibLookup = libc::NETLINK_FIB_LOOKUP,
    NetlinkConnector = libc::NETLINK_CONNECTOR,
    NetlinkNetfilter = libc::NETLINK_NETFILTER,
    NetlinkIpv6Fw = libc::NETLINK_IP6_FW,
    NetlinkDnrtMsg = libc::NETLINK_DNRTMSG,
    NetlinkKobjectUevent = libc::NETLINK_KOBJECT_UEVENT,
    NetlinkGeneric = libc::NETLINK_GENERIC,
    NetlinkScsiTransport = libc::NETLINK_SCSITRANSPORT,
    NetlinkEcryptfs = libc::NETLINK_ECRYPTFS,
    NetlinkRdma = libc::NETLINK_RDMA,
    NetlinkInvalid,
}

impl From<&str> for NetlinkProtocol {
    fn from(protocol: &str) -> Self {
        match protocol {
            "route" => NetlinkProtocol::NetlinkRoute,
            "firewall" => NetlinkProtocol::NetlinkFirewall,
            "inet-diag" => NetlinkProtocol::NetlinkInetDiag,
            "nflog" => NetlinkProtocol::NetlinkNflog,
            "xfrm" => NetlinkProtocol::NetlinkXfrm,
            "selinux" => NetlinkProtocol::NetlinkSelinux,
            "iscsi" => NetlinkProtocol::NetlinkIscsi,
            "audit" => NetlinkProtocol::NetlinkAudit,
            "fib-lookup" => NetlinkProtocol::NetlinkFibLookup,
            "connector" => NetlinkProtocol::NetlinkConnector,
            "netfilter" => NetlinkProtocol::NetlinkNetfilter,
            "ip6-fw" => NetlinkProtocol::NetlinkIpv6Fw,
            "dnrtmsg" => NetlinkProtocol::NetlinkDnrtMsg,
            "kobject-uevent" => NetlinkProtocol::NetlinkKobjectUevent,
            "generic" => NetlinkProtocol::NetlinkGeneric,
            "scsitransport" => NetlinkProtocol::NetlinkScsiTransport,
            "ecryptfs" => NetlinkProtocol::NetlinkEcryptfs,
            "rdma" => NetlinkProtocol::NetlinkRdma,
            _ => NetlinkProtocol::NetlinkInvalid,
        }
    }
}

impl TryFrom<NetlinkProtocol> for SockProtocol {
    type Error = ();

    fn try_from(protocol: NetlinkProtocol) -> Result<Self, Self::Error> {
        match protocol {
            NetlinkProtocol::NetlinkRoute => Ok(SockProtocol::NetlinkRoute),
            NetlinkProtocol::NetlinkInetDiag => Ok(SockProtocol::NetlinkSockDiag),
            NetlinkProtocol::NetlinkSelinux => Ok(SockProtocol::NetlinkSELinux),
            NetlinkProtocol::NetlinkIscsi => Ok(SockProtocol::NetlinkISCSI),
            NetlinkProtocol::NetlinkAudit => Ok(SockProtocol::NetlinkAudit),
            NetlinkProtocol::NetlinkFibLookup => Ok(SockProtocol::NetlinkFIBLookup),
            NetlinkProtocol::NetlinkNetfilter => Ok(SockProtocol::NetlinkNetFilter),
            NetlinkProtocol::NetlinkIpv6Fw => Ok(SockProtocol::NetlinkIPv6Firewall),
            NetlinkProtocol::NetlinkDnrtMsg => Ok(SockProtocol::NetlinkDECNetRoutingMessage),
            NetlinkProtocol::NetlinkKobjectUevent => Ok(SockProtocol::NetlinkKObjectUEvent),
            NetlinkProtocol::NetlinkScsiTransport => Ok(SockProtocol::NetlinkSCSITransport),
            NetlinkProtocol::NetlinkRdma => Ok(SockProtocol::NetlinkRDMA),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for NetlinkProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NetlinkProtocol::NetlinkRoute => "route",
            NetlinkProtocol::NetlinkFirewall => "firewall",
            NetlinkProtocol::NetlinkInetDiag => "inet-diag",
            NetlinkProtocol::NetlinkNflog => "nflog",
            NetlinkProtocol::NetlinkXfrm => "xfrm",
            NetlinkProtocol::NetlinkSelinux => "selinux",
            NetlinkProtocol::NetlinkIscsi => "iscsi",
            NetlinkProtocol::NetlinkAudit => "audit",
            NetlinkProtocol::NetlinkFibLookup => "fib-lookup",
            NetlinkProtocol::NetlinkConnector => "connector",
            NetlinkProtocol::NetlinkNetfilter => "netfilter",
            NetlinkProtocol::NetlinkIpv6Fw => "ip6-fw",
            NetlinkProtocol::NetlinkDnrtMsg => "dnrtmsg",
            NetlinkProtocol::NetlinkKobjectUevent => "kobject-uevent",
            NetlinkProtocol::NetlinkGeneric => "generic",
            NetlinkProtocol::NetlinkScsiTransport => "scsitransport",
            NetlinkProtocol::NetlinkEcryptfs => "ecryptfs",
            NetlinkProtocol::NetlinkRdma => "rdma",
            NetlinkProtocol::NetlinkInvalid => "invalid",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netlink_from_string() {
        assert_eq!(
            NetlinkProtocol::from("route"),
            NetlinkProtocol::NetlinkRoute
        );
        assert_eq!(
            NetlinkProtocol::from("kobject-uevent"),
            NetlinkProtocol::NetlinkKobjectUevent
        );
        assert_eq!(NetlinkProtocol::from("audit"), NetlinkProtocol::NetlinkAudit);
        assert_eq!(
            NetlinkProtocol::from("test"),
            NetlinkProtocol::NetlinkInvalid
        );
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [
            SocketState::Dead,
            SocketState::StartPre,
            SocketState::StartChown,
            SocketState::StartPost,
            SocketState::Listening,
            SocketState::Running,
            SocketState::StopPre,
            SocketState::StopPreSigterm,
            SocketState::StopPreSigkill,
            SocketState::StopPost,
            SocketState::FinalSigterm,
            SocketState::FinalSigkill,
            SocketState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<SocketState>().unwrap(), state);
        }
    }

    #[test]
    fn test_result_string_roundtrip() {
        for result in [
            SocketResult::Success,
            SocketResult::FailureResources,
            SocketResult::FailureTimeout,
            SocketResult::FailureExitCode,
            SocketResult::FailureSignal,
            SocketResult::FailureCoreDump,
            SocketResult::FailureServiceFailedPermanent,
        ] {
            assert_eq!(result.to_string().parse::<SocketResult>().unwrap(), result);
        }
    }
}
