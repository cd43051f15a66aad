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

//! tracking of the single in-flight control process
//!

use super::comm::SocketUnitComm;
use nix::unistd::Pid;
use std::cell::RefCell;
use std::rc::Rc;

pub(super) struct SocketPid {
    comm: Rc<SocketUnitComm>,
    control: RefCell<Option<Pid>>,
}

impl SocketPid {
    pub(super) fn new(comm: &Rc<SocketUnitComm>) -> SocketPid {
        SocketPid {
            comm: comm.clone(),
            control: RefCell::new(None),
        }
    }

    pub(super) fn unwatch_control(&self) {
        if let Some(pid) = self.control() {
            if let Some(u) = self.comm.owner() {
                self.comm.um().child_unwatch_pid(&u.id(), pid)
            }
            self.reset_control();
        }
    }

    pub(super) fn control(&self) -> Option<Pid> {
        *self.control.borrow()
    }

    pub(super) fn set_control(&self, pid: Pid) {
        *self.control.borrow_mut() = Some(pid);
    }

    pub(super) fn update_control(&self, pid: Option<Pid>) {
        match pid {
            Some(id) => self.set_control(id),
            None => self.reset_control(),
        }
    }

    pub(super) fn reset_control(&self) {
        *self.control.borrow_mut() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::SocketPid;
    use crate::comm::SocketUnitComm;
    use nix::unistd::Pid;
    use std::rc::Rc;

    #[test]
    fn test_socket_pid() {
        let comm = Rc::new(SocketUnitComm::new());
        let pid = SocketPid::new(&comm);

        assert_eq!(pid.control(), None);
        pid.set_control(Pid::from_raw(5));
        assert_eq!(pid.control().unwrap(), Pid::from_raw(5));
        pid.reset_control();
        assert_eq!(pid.control(), None);
    }
}
