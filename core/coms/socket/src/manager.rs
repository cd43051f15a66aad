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

use libcore::unit::{UmIf, UnitManagerObj, UnitMngUtil, UnitType};
use std::cell::RefCell;
use std::rc::Rc;

struct SocketManager {
    um: RefCell<Option<Rc<dyn UmIf>>>,
}

impl SocketManager {
    fn new() -> SocketManager {
        SocketManager {
            um: RefCell::new(None),
        }
    }
}

impl UnitManagerObj for SocketManager {
    fn private_section(&self, _unit_type: UnitType) -> String {
        "Socket".into()
    }

    fn can_transient(&self, _unit_type: UnitType) -> bool {
        true
    }
}

impl UnitMngUtil for SocketManager {
    fn attach_um(&self, um: Rc<dyn UmIf>) {
        if self.um.borrow().is_none() {
            self.um.replace(Some(um));
        }
    }
}

impl Default for SocketManager {
    fn default() -> Self {
        SocketManager::new()
    }
}

use libcore::declare_umobj_plugin;
declare_umobj_plugin!(SocketManager, SocketManager::default);
