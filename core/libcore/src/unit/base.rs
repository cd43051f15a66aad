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

use super::deps::UnitType;
use super::kill::{KillContext, KillOperation, KillWho};
use super::state::{UnitActiveState, UnitNotifyFlags};
use super::umif::UnitMngUtil;
use crate::error::*;
use crate::serialize::FdBag;
use bitflags::bitflags;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::any::Any;
use std::io::Write;
use std::str::FromStr;
use std::{path::PathBuf, rc::Rc};

/// The behavior the base unit object exposes to its sub unit.
///
/// There is only one implementation, in the manager; sub units hold it
/// behind a weak reference.
pub trait UnitBase {
    ///
    fn id(&self) -> String;
    ///
    fn unit_type(&self) -> UnitType;
    ///
    fn test_start_limit(&self) -> bool;
    /// Deliver the signal selected by `ko` to the unit's processes.
    /// Returns true if processes were signalled and have to be waited for.
    fn kill_context(
        &self,
        k_context: Rc<KillContext>,
        m_pid: Option<Pid>,
        c_pid: Option<Pid>,
        ko: KillOperation,
    ) -> Result<bool>;

    ///
    fn notify(
        &self,
        original_state: UnitActiveState,
        new_state: UnitActiveState,
        flags: UnitNotifyFlags,
    );

    ///
    fn prepare_exec(&self) -> Result<()>;

    ///
    fn default_dependencies(&self) -> bool;
}

/// The behavior every sub unit implements, invoked by the manager through
/// a trait object.
pub trait SubUnit: UnitMngUtil {
    ///
    fn as_any(&self) -> &dyn Any;

    ///
    fn init(&self) {}

    ///
    fn done(&self) {}

    ///
    fn load(&self, conf: Vec<PathBuf>) -> Result<()>;

    /// Start a unit; every sub unit implements its own start logic
    fn start(&self) -> Result<()> {
        Ok(())
    }

    // process reentrant with force
    ///
    fn stop(&self, _force: bool) -> Result<()> {
        Ok(())
    }

    /// returns EOpNotSupp when the sub unit cannot reload
    fn reload(&self) -> Result<()> {
        Err(Error::UnitActionEOpNotSupp)
    }

    ///
    fn can_reload(&self) -> bool {
        false
    }

    /// deliver a manually requested signal
    fn kill(&self, _who: KillWho, _signo: Signal) -> Result<()> {
        Err(Error::UnitActionEOpNotSupp)
    }

    ///
    fn release_resources(&self) {}

    ///
    fn sigchld_events(&self, _wait_status: WaitStatus) {}

    ///
    fn reset_failed(&self) {}

    /// the open descriptors a triggered service is meant to inherit
    fn collect_fds(&self) -> Vec<i32> {
        Vec::new()
    }

    /// a unit in the Triggers set changed state
    fn trigger(&self, _other: &str) {}

    /// Get the unit state; every sub unit maps its own states onto
    /// [`UnitActiveState`]
    fn current_active_state(&self) -> UnitActiveState;

    /// the sub state, i.e. listening for a socket, running for a service
    fn get_subunit_state(&self) -> String;

    ///
    fn attach_unit(&self, unit: Rc<dyn UnitBase>);

    /// write the `key value` snapshot of the runtime state
    fn serialize(&self, _f: &mut dyn Write, _fds: &mut FdBag) -> Result<()> {
        Ok(())
    }

    /// consume one snapshot line
    fn deserialize_item(&self, _key: &str, _value: &str, _fds: &mut FdBag) {}

    /// claim inherited descriptors matching the configured addresses
    fn distribute_fds(&self, _fds: &mut FdBag) {}

    /// reattach to the lifecycle described by a deserialized snapshot
    fn coldplug(&self) -> Result<()> {
        Ok(())
    }

    /// remaining microseconds of the armed deadline, if any
    fn get_timeout(&self) -> Option<u64> {
        None
    }

    /// whether the unit must be kept around despite being inactive
    fn check_gc(&self) -> bool {
        false
    }

    // ================ ONLY VALID FOR SERVICE ================
    ///
    fn set_socket_fd(&self, _fd: i32) {}

    ///
    fn release_socket_fd(&self, _fd: i32) {}

    // ================ ONLY VALID FOR SOCKET ================
    /// a per-connection service released its accepted descriptor
    fn connection_unref(&self) {}
}

/// the macro to create a sub unit instance with a dyn ref of UmIf
#[macro_export]
macro_rules! declare_unitobj_plugin_with_param {
    ($unit_type:ty, $constructor:path) => {
        /// method for creating the unit instance
        #[cfg_attr(feature = "plugin", no_mangle)]
        pub fn __subunit_create_with_params(
            um: std::rc::Rc<dyn $crate::unit::UmIf>,
        ) -> *mut dyn $crate::unit::SubUnit {
            let constructor: fn(um: std::rc::Rc<dyn $crate::unit::UmIf>) -> $unit_type =
                $constructor;
            let obj = constructor(um);
            let boxed: Box<dyn $crate::unit::SubUnit> = Box::new(obj);
            Box::into_raw(boxed)
        }
    };
}

bitflags! {
    /// which unit name forms a check accepts
    pub struct UnitNameFlags: u8 {
        /// foo.service
        const PLAIN = 1 << 0;
        /// foo@.service
        const TEMPLATE = 1 << 1;
        /// foo@123.service
        const INSTANCE = 1 << 2;
        /// any of the above
        const ANY = Self::PLAIN.bits() | Self::TEMPLATE.bits() | Self::INSTANCE.bits();
    }
}

/// The maximum length of a valid unit name
const UNIT_NAME_MAX: usize = 255;

/// check if the given unit name is valid
pub fn unit_name_is_valid(name: &str, flag: UnitNameFlags) -> bool {
    if name.is_empty() || name.len() > UNIT_NAME_MAX {
        return false;
    }
    /* Take foo@123.service for example, "foo@123" is its first_name,
     * "foo" is prefix or template_name, "service" is its last_name, suffix,
     * or type. "123.service" is instance_name. */
    let (first_name, last_name) = match name.rsplit_once('.') {
        None => return false,
        Some(v) => (v.0, v.1),
    };
    let unit_type = match UnitType::from_str(last_name) {
        Err(_) => return false,
        Ok(v) => v,
    };
    if unit_type == UnitType::UnitTypeInvalid {
        return false;
    }
    match first_name.split_once('@') {
        None => flag.contains(UnitNameFlags::PLAIN),
        Some(v) => {
            /* "@" is the first character */
            if v.0.is_empty() {
                return false;
            }
            /* "@" is the last character */
            if v.1.is_empty() {
                return flag.contains(UnitNameFlags::TEMPLATE);
            }
            /* there is more than one "@" */
            if v.1.contains('@') {
                return false;
            }
            flag.contains(UnitNameFlags::INSTANCE)
        }
    }
}

/// "foo@bar.socket" -> "foo"
pub fn unit_name_to_prefix(name: &str) -> String {
    let first_name = match name.rsplit_once('.') {
        None => name,
        Some(v) => v.0,
    };
    match first_name.split_once('@') {
        None => first_name.to_string(),
        Some(v) => v.0.to_string(),
    }
}

/// assemble "{prefix}@{instance}.{suffix}"
pub fn unit_name_build(prefix: &str, instance: &str, suffix: &str) -> String {
    format!("{}@{}.{}", prefix, instance, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_name_is_valid() {
        assert!(unit_name_is_valid("foo.service", UnitNameFlags::PLAIN));
        assert!(unit_name_is_valid("bar@.service", UnitNameFlags::TEMPLATE));
        assert!(unit_name_is_valid("bar@123.service", UnitNameFlags::INSTANCE));

        assert!(!unit_name_is_valid("@.service", UnitNameFlags::ANY));
        assert!(!unit_name_is_valid("foo.unknown", UnitNameFlags::ANY));
        assert!(!unit_name_is_valid("", UnitNameFlags::ANY));
    }

    #[test]
    fn test_unit_name_build() {
        assert_eq!(unit_name_to_prefix("foo.socket"), "foo");
        assert_eq!(unit_name_to_prefix("foo@7.service"), "foo");
        assert_eq!(
            unit_name_build("foo", "7-10.0.0.1:80-192.168.1.5:54321", "service"),
            "foo@7-10.0.0.1:80-192.168.1.5:54321.service"
        );
    }
}
