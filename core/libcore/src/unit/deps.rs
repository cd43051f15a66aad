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

use std::str::FromStr;

/// the type of a unit, named after its manifest suffix
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub enum UnitType {
    ///
    UnitService,
    ///
    UnitSocket,
    ///
    UnitTarget,
    ///
    UnitTypeInvalid,
}

impl From<UnitType> for String {
    fn from(u_t: UnitType) -> Self {
        match u_t {
            UnitType::UnitService => "service".into(),
            UnitType::UnitSocket => "socket".into(),
            UnitType::UnitTarget => "target".into(),
            UnitType::UnitTypeInvalid => "".into(),
        }
    }
}

impl FromStr for UnitType {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "service" => UnitType::UnitService,
            "socket" => UnitType::UnitSocket,
            "target" => UnitType::UnitTarget,
            _ => UnitType::UnitTypeInvalid,
        })
    }
}

/// relations one unit can carry towards another
#[allow(missing_docs)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnitRelations {
    UnitRequires,
    UnitWants,
    UnitBefore,
    UnitAfter,
    UnitConflicts,
    UnitTriggers,
    UnitTriggeredBy,
}

/// where a dependency edge came from
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnitDependencyMask {
    /// written in the manifest
    File,
    /// derived from other configuration
    Implicit,
    /// added because default_dependencies is on
    Default,
}
