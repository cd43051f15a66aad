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

use bitflags::bitflags;

/// the public activation state every sub-unit state maps onto
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum UnitActiveState {
    /// unit is activated
    Active,
    /// unit is in reloading
    Reloading,
    /// unit is not active
    InActive,
    /// unit action has failed
    Failed,
    /// unit is being started
    Activating,
    /// unit is being stopped
    DeActivating,
    /// unit is in maintenance
    Maintenance,
}

impl UnitActiveState {
    ///
    pub fn is_active_or_reloading(&self) -> bool {
        matches!(self, UnitActiveState::Active | UnitActiveState::Reloading)
    }

    ///
    pub fn is_inactive_or_failed(&self) -> bool {
        matches!(self, UnitActiveState::InActive | UnitActiveState::Failed)
    }

    ///
    pub fn is_active_or_activating(&self) -> bool {
        matches!(
            self,
            UnitActiveState::Active | UnitActiveState::Activating | UnitActiveState::Reloading
        )
    }

    ///
    pub fn is_inactive_or_deactivating(&self) -> bool {
        matches!(
            self,
            UnitActiveState::InActive | UnitActiveState::Failed | UnitActiveState::DeActivating
        )
    }
}

impl std::fmt::Display for UnitActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitActiveState::Active => write!(f, "active"),
            UnitActiveState::Reloading => write!(f, "reloading"),
            UnitActiveState::InActive => write!(f, "inactive"),
            UnitActiveState::Failed => write!(f, "failed"),
            UnitActiveState::Activating => write!(f, "activating"),
            UnitActiveState::DeActivating => write!(f, "deactivating"),
            UnitActiveState::Maintenance => write!(f, "maintenance"),
        }
    }
}

bitflags! {
    /// flags passed along a unit state notification
    pub struct UnitNotifyFlags: u8 {
        /// nothing special
        const EMPTY = 0;
        /// the unit failed to reload
        const RELOAD_FAILURE = 1 << 0;
        /// the unit is about to restart on its own
        const WILL_AUTO_RESTART = 1 << 1;
    }
}
