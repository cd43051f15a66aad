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

//! Constants shared between the manager core and the unit components.

/// placeholder of an unopened file descriptor
pub const INVALID_FD: i32 = -1;

/// placeholder of an unwatched pid
pub const INVALID_PID: i32 = -1;

/// exit status used by forked helpers when user resolution failed
pub const EXIT_USER: i32 = 217;
/// exit status used by forked helpers when group resolution failed
pub const EXIT_GROUP: i32 = 216;
/// exit status used by forked helpers when chown failed
pub const EXIT_CHOWN: i32 = 235;
