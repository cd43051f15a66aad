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

//! unit traits and shared unit types

mod base;
mod deps;
mod kill;
mod state;
mod umif;

pub use base::{
    unit_name_build, unit_name_is_valid, unit_name_to_prefix, SubUnit, UnitBase, UnitNameFlags,
};
pub use deps::{UnitDependencyMask, UnitRelations, UnitType};
pub use kill::{unit_kill_common, KillContext, KillMode, KillOperation, KillWho};
pub use state::{UnitActiveState, UnitNotifyFlags};
pub use umif::{UmIf, UnitManagerObj, UnitMngUtil};
