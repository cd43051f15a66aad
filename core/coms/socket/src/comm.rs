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

//! The comm module holds the references a socket unit shares with the rest
//! of the manager: the owning unit object and the unit manager, both held
//! weakly so the manager stays the single owner.

use libcore::unit::{UmIf, UnitBase};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub(crate) struct SocketUnitComm {
    owner: RefCell<Option<Weak<dyn UnitBase>>>,
    um: RefCell<Option<Rc<dyn UmIf>>>,
}

impl SocketUnitComm {
    pub(super) fn new() -> Self {
        SocketUnitComm {
            owner: RefCell::new(None),
            um: RefCell::new(None),
        }
    }

    pub(super) fn attach_unit(&self, unit: Rc<dyn UnitBase>) {
        self.owner.replace(Some(Rc::downgrade(&unit)));
    }

    pub(super) fn attach_um(&self, um: Rc<dyn UmIf>) {
        if self.um.borrow().is_none() {
            log::debug!("SocketUnitComm attach_um action.");
            self.um.replace(Some(um));
        }
    }

    pub(super) fn owner(&self) -> Option<Rc<dyn UnitBase>> {
        if let Some(ref unit) = *self.owner.borrow() {
            unit.upgrade()
        } else {
            None
        }
    }

    /// panics when used before attach_um, the manager attaches at creation
    pub(super) fn um(&self) -> Rc<dyn UmIf> {
        self.um.borrow().as_ref().cloned().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UmIfD;
    impl UmIf for UmIfD {}

    #[test]
    fn test_attach_um() {
        let comm = SocketUnitComm::new();
        assert!(comm.owner().is_none());

        comm.attach_um(Rc::new(UmIfD));
        let _ = comm.um();
    }
}
