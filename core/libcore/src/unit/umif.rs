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

//! UnitManager interfaces
use super::{UnitActiveState, UnitDependencyMask, UnitRelations, UnitType};
use crate::error::*;
use crate::exec::{ExecCommand, ExecContext, ExecParameters};
use event::Events;
use nix::unistd::Pid;
use std::rc::Rc;

/// The trait defining the behavior the unit manager shares with all sub
/// units. A sub unit that needs information about other units obtains it
/// by being attached to an implementation of UmIf.
pub trait UmIf {
    /// add a single dependency edge for the unit
    fn unit_add_dependency(
        &self,
        _unit_name: &str,
        _relation: UnitRelations,
        _target_name: &str,
        _add_ref: bool,
        _mask: UnitDependencyMask,
    ) -> Result<()> {
        Ok(())
    }

    /// add two dependency edges at once, sub units use it for defaults
    fn unit_add_two_dependency(
        &self,
        _unit_name: &str,
        _ra: UnitRelations,
        _rb: UnitRelations,
        _target_name: &str,
        _add_ref: bool,
        _mask: UnitDependencyMask,
    ) -> Result<()> {
        Ok(())
    }

    /// load the unit of the given name, true on success
    fn load_unit_success(&self, _name: &str) -> bool {
        false
    }

    /// check whether the unit of the given name is still loaded
    fn test_trigger_loaded(&self, _name: &str) -> bool {
        true
    }

    /// check if there is already a job queued for the unit
    fn has_job(&self, _name: &str) -> bool {
        false
    }

    /// check if there is already a stop job queued for the unit
    fn has_stop_job(&self, _name: &str) -> bool {
        false
    }

    /// check whether any unit triggered by `name` is active or pending start
    fn relation_active_or_pending(&self, _name: &str) -> bool {
        false
    }

    /// start a unit by queueing a job
    fn unit_start_by_job(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// stop a unit
    fn unit_stop(&self, _name: &str, _force: bool) -> Result<()> {
        Ok(())
    }

    /// the event loop shared by the whole manager
    fn events(&self) -> Rc<Events> {
        Rc::new(Events::new().unwrap())
    }

    /// subscribe to the exit of the pid on behalf of unit `id`
    fn child_watch_pid(&self, _id: &str, _pid: Pid) {}

    /// drop the subscription for the pid
    fn child_unwatch_pid(&self, _id: &str, _pid: Pid) {}

    /// spawn a child process for the unit
    fn exec_spawn(
        &self,
        _unit_name: &str,
        _cmdline: &ExecCommand,
        _params: &mut ExecParameters,
        _ctx: Rc<ExecContext>,
    ) -> Result<Pid> {
        Ok(Pid::this())
    }

    /// the active state of the unit of the given name
    fn current_active_state(&self, _unit_name: &str) -> UnitActiveState {
        UnitActiveState::Failed
    }

    /// the sub state of the unit, i.e. running(service), listening(socket)
    fn get_subunit_state(&self, _unit_name: &str) -> String {
        String::new()
    }

    /// whether the unit ran into its start limit when it failed
    fn start_limit_hit(&self, _unit_name: &str) -> bool {
        false
    }

    /// whether this manager is the system instance
    fn running_as_system(&self) -> bool {
        true
    }

    /// propagate a unit state change to the units it triggers
    fn trigger_notify(&self, _name: &str) {}

    ///
    fn private_section(&self, _unit_type: UnitType) -> String {
        String::new()
    }

    /* ========== ONLY VALID IN SERVICE ========== */
    /// hand an accepted connection descriptor to the service
    fn service_set_socket_fd(&self, _service_name: &str, _fd: i32) {}

    /// take the descriptor back from a service that never started
    fn service_release_socket_fd(&self, _service_name: &str, _fd: i32) {}
}

/// the trait used to attach the UnitManager to a sub unit
pub trait UnitMngUtil {
    /// the method of attaching the UnitManager to the sub unit
    fn attach_um(&self, um: Rc<dyn UmIf>);
}

/// the shared behavior of the per-unit-type manager object
pub trait UnitManagerObj: UnitMngUtil {
    ///
    fn enumerate(&self) {}
    ///
    fn shutdown(&self) {}
    ///
    fn private_section(&self, _unit_type: UnitType) -> String {
        String::new()
    }
    ///
    fn can_transient(&self, _unit_type: UnitType) -> bool {
        false
    }
}

/// the macro to create the per-unit-type manager instance
#[macro_export]
macro_rules! declare_umobj_plugin {
    ($unit_type:ty, $constructor:path) => {
        /// method for creating the per-unit-type manager instance
        #[cfg_attr(feature = "plugin", no_mangle)]
        pub fn __um_obj_create() -> *mut dyn $crate::unit::UnitManagerObj {
            let constructor: fn() -> $unit_type = $constructor;
            let obj = constructor();
            let boxed: Box<dyn $crate::unit::UnitManagerObj> = Box::new(obj);
            Box::into_raw(boxed)
        }
    };
}
