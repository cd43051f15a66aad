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

//! utility library used across the workspace

pub mod error;
pub mod fd;
pub mod fs;
pub mod macros;
pub mod socket;
pub mod time;
pub mod unistd;

pub use error::{Error, Result};

/// well-known target names
pub const SOCKETS_TARGET: &str = "sockets.target";
///
pub const SYSINIT_TARGET: &str = "sysinit.target";
///
pub const SHUTDOWN_TARGET: &str = "shutdown.target";
