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

//! The unified error of the manager core and its unit components. Errors
//! inherited from underlying crates (nix/io/...) are wrapped; error codes
//! unique to unit actions are defined as their own variants.

/// Reuse the Errno from the nix library.
pub use nix::errno::Errno;
use snafu::prelude::*;
#[allow(unused_imports)]
pub use snafu::ResultExt;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Error parsing from string: {}", source))]
    Parse {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("UtilError(libcore): {}", source))]
    Util { source: basic::Error },

    #[snafu(display("IoError(libcore): {}", source))]
    Io { source: std::io::Error },

    #[snafu(display("NixError(libcore): {}", source))]
    Nix { source: nix::Error },

    #[snafu(display("InvalidData(libcore)"))]
    InvalidData,

    #[snafu(display("NotFound(libcore): '{}'.", what))]
    NotFound { what: String },

    #[snafu(display("OtherError(libcore): '{}'.", msg))]
    Other { msg: String },

    #[snafu(display("InvalidName(libcore): {}", what))]
    InvalidName { what: String },

    /// events error
    #[snafu(display("event error: '{}'.", msg))]
    EventError { msg: String },

    #[snafu(display("SpawnError(ExecCmdError)"))]
    SpawnError,

    #[snafu(display("load unit error: '{}'.", msg))]
    LoadError { msg: String },

    #[snafu(display("unit configuration error: '{}'.", msg))]
    ConfigureError { msg: String },

    #[snafu(display("the unit to trigger has vanished"))]
    UnitVanished,

    /// UnitAction Error
    #[snafu(display("EAgain(UnitActionError)"))]
    UnitActionEAgain,
    #[snafu(display("EAlready(UnitActionError)"))]
    UnitActionEAlready,
    #[snafu(display("ENoExec(UnitActionError)"))]
    UnitActionENoExec,
    #[snafu(display("EOpNotSupp(UnitActionError)"))]
    UnitActionEOpNotSupp,
    #[snafu(display("ENoent(UnitActionError)"))]
    UnitActionENoent,
    #[snafu(display("EBusy(UnitActionError)"))]
    UnitActionEBusy,
    #[snafu(display("EInval(UnitActionError)"))]
    UnitActionEInval,
    #[snafu(display("ECanceled(UnitActionError)"))]
    UnitActionECanceled,
    #[snafu(display("EBadMsg(UnitActionError)"))]
    UnitActionEBadMsg,
}

/// Convert to the standard linux error code
impl From<Error> for nix::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Parse { .. } => nix::Error::EINVAL,
            Error::Util { .. } => nix::Error::EINVAL,
            Error::Io { .. } => nix::Error::EIO,
            Error::Nix { source } => source,
            Error::InvalidData => nix::Error::EINVAL,
            Error::NotFound { .. } => nix::Error::ENOENT,
            Error::Other { .. } => nix::Error::EIO,
            Error::InvalidName { .. } => nix::Error::EINVAL,
            Error::EventError { .. } => nix::Error::EIO,
            Error::SpawnError => nix::Error::EIO,
            Error::LoadError { .. } => nix::Error::EIO,
            Error::ConfigureError { .. } => nix::Error::EINVAL,
            Error::UnitVanished => nix::Error::ENOENT,
            Error::UnitActionEAgain => nix::Error::EAGAIN,
            Error::UnitActionEAlready => nix::Error::EALREADY,
            Error::UnitActionENoExec => nix::Error::ENOEXEC,
            Error::UnitActionEOpNotSupp => nix::Error::ENOTSUP,
            Error::UnitActionENoent => nix::Error::ENOENT,
            Error::UnitActionEBusy => nix::Error::EBUSY,
            Error::UnitActionEInval => nix::Error::EINVAL,
            Error::UnitActionECanceled => nix::Error::ECANCELED,
            Error::UnitActionEBadMsg => nix::Error::EBADMSG,
            _ => nix::Error::EIO,
        }
    }
}

#[allow(unused_macros)]
macro_rules! errfrom {
    ($($st:ty),* => $variant:ident) => (
        $(
            impl From<$st> for Error {
                fn from(e: $st) -> Error {
                    Error::$variant { source: e.into() }
                }
            }
        )*
    )
}

errfrom!(std::num::ParseIntError, std::string::ParseError => Parse);
errfrom!(nix::errno::Errno => Nix);

impl From<basic::Error> for Error {
    fn from(e: basic::Error) -> Error {
        match e {
            basic::Error::Io { source } => Error::Io { source },
            basic::Error::Nix { source } => Error::Nix { source },
            _ => Error::Util { source: e },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Error {
        Error::Io { source }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Error {
        Error::Other { msg }
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Error {
        Error::Other {
            msg: msg.to_string(),
        }
    }
}

impl From<event::Error> for Error {
    fn from(source: event::Error) -> Error {
        Error::EventError {
            msg: format!("{:?}", source),
        }
    }
}

/// new Result
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// check if the error is disconnect
pub fn error_is_disconnect(e: &Errno) -> bool {
    [
        Errno::ECONNABORTED,
        Errno::ECONNREFUSED,
        Errno::ECONNRESET,
        Errno::EHOSTDOWN,
        Errno::EHOSTUNREACH,
        Errno::ENETDOWN,
        Errno::ENETRESET,
        Errno::ENONET,
        Errno::ENOPROTOOPT,
        Errno::ENOTCONN,
        Errno::EPIPE,
        Errno::EPROTO,
        Errno::ESHUTDOWN,
        Errno::ETIMEDOUT,
    ]
    .contains(e)
}

/// check if the error is transient
pub fn error_is_transient(e: &Errno) -> bool {
    [Errno::EAGAIN, Errno::EINTR].contains(e)
}

/// check if an accept() failure refers to the single connection rather
/// than the listening socket
pub fn error_is_accept_again(e: &Errno) -> bool {
    error_is_disconnect(e) || error_is_transient(e) || e == &Errno::EOPNOTSUPP
}
