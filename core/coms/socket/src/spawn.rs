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

use crate::comm::SocketUnitComm;
use libcore::error::*;
use libcore::exec::{ExecCommand, ExecContext, ExecParameters};
use nix::unistd::Pid;
use std::rc::Rc;

pub(super) struct SocketSpawn {
    comm: Rc<SocketUnitComm>,
    exec_ctx: Rc<ExecContext>,
}

impl SocketSpawn {
    pub(super) fn new(comm: &Rc<SocketUnitComm>, exec_ctx: &Rc<ExecContext>) -> SocketSpawn {
        SocketSpawn {
            comm: comm.clone(),
            exec_ctx: exec_ctx.clone(),
        }
    }

    /// run one control command, the child is watched on behalf of the unit
    pub(super) fn start_socket(&self, cmdline: &ExecCommand) -> Result<Pid> {
        let mut params = ExecParameters::new();

        let unit = match self.comm.owner() {
            None => return Err(Error::SpawnError),
            Some(v) => v,
        };

        unit.prepare_exec()?;

        let um = self.comm.um();
        match um.exec_spawn(&unit.id(), cmdline, &mut params, self.exec_ctx.clone()) {
            Ok(pid) => {
                um.child_watch_pid(&unit.id(), pid);
                Ok(pid)
            }
            Err(e) => {
                log::error!("failed to start socket: {}, error: {}", unit.id(), e);
                Err(Error::SpawnError)
            }
        }
    }
}
