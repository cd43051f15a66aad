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

//! resolve the companion service and add the implicit and default
//! dependencies after the [Socket] section was parsed
//!
use crate::base::PortType;
use crate::comm::SocketUnitComm;
use crate::config::SocketConfig;
use basic::{SHUTDOWN_TARGET, SOCKETS_TARGET, SYSINIT_TARGET};
use libcore::error::*;
use libcore::unit::{UnitDependencyMask, UnitRelations, UnitType};
use std::path::Path;
use std::rc::Rc;

pub(super) struct SocketLoad {
    config: Rc<SocketConfig>,
    comm: Rc<SocketUnitComm>,
}

impl SocketLoad {
    pub(super) fn new(configr: &Rc<SocketConfig>, commr: &Rc<SocketUnitComm>) -> Self {
        SocketLoad {
            config: configr.clone(),
            comm: commr.clone(),
        }
    }

    pub(super) fn socket_add_extras(&self) -> Result<()> {
        log::debug!("socket add extras");
        if self.have_non_accept_socket() {
            if self.config.unit_ref_target().is_none() {
                self.load_related_unit(UnitType::UnitService)?;
            }
            if let Some(owner) = self.comm.owner() {
                if let Some(target) = self.config.unit_ref_target() {
                    self.comm.um().unit_add_two_dependency(
                        &owner.id(),
                        UnitRelations::UnitBefore,
                        UnitRelations::UnitTriggers,
                        &target,
                        true,
                        UnitDependencyMask::Implicit,
                    )?;
                }
            }
        }

        self.add_default_dependencies()?;

        Ok(())
    }

    /// whether any configured port needs the shared-descriptor treatment
    pub(super) fn have_non_accept_socket(&self) -> bool {
        if !self.config.config_data().borrow().Socket.Accept {
            return true;
        }

        for port in self.config.ports().iter() {
            if port.p_type() != PortType::Socket {
                return true;
            }

            if !port.can_accept() {
                return true;
            }
        }

        false
    }

    fn load_related_unit(&self, related_type: UnitType) -> Result<()> {
        let suffix = String::from(related_type);
        if suffix.is_empty() {
            return Err(Error::LoadError {
                msg: "failed to load related unit, invalid suffix".to_string(),
            });
        }

        let unit_name = match self.comm.owner() {
            None => {
                return Err(Error::LoadError {
                    msg: format!("failed to load related unit {}, unit name is none", suffix),
                })
            }
            Some(u) => u.id(),
        };

        let stem_name = match Path::new(&unit_name).file_stem() {
            None => {
                return Err(Error::LoadError {
                    msg: format!("invalid unit name {}", unit_name),
                })
            }
            Some(v) => v.to_string_lossy().to_string(),
        };
        self.config.set_unit_ref(format!("{}.{}", stem_name, suffix));
        Ok(())
    }

    fn add_default_dependencies(&self) -> Result<()> {
        let u = match self.comm.owner() {
            None => {
                return Ok(());
            }
            Some(v) => v,
        };

        if !u.default_dependencies() {
            return Ok(());
        }

        log::debug!("Adding default dependencies for socket: {}", u.id());
        let um = self.comm.um();
        um.unit_add_dependency(
            &u.id(),
            UnitRelations::UnitBefore,
            SOCKETS_TARGET,
            true,
            UnitDependencyMask::Default,
        )?;
        if um.running_as_system() {
            um.unit_add_two_dependency(
                &u.id(),
                UnitRelations::UnitAfter,
                UnitRelations::UnitRequires,
                SYSINIT_TARGET,
                true,
                UnitDependencyMask::Default,
            )?;
        }
        um.unit_add_two_dependency(
            &u.id(),
            UnitRelations::UnitBefore,
            UnitRelations::UnitConflicts,
            SHUTDOWN_TARGET,
            true,
            UnitDependencyMask::Default,
        )?;
        Ok(())
    }
}
