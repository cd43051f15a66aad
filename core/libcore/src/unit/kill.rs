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

use crate::error::*;
use crate::serialize::DeserializeWith;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use serde::{Deserialize, Deserializer, Serialize};
use std::{cell::RefCell, rc::Rc};

/// kill operation applied to the processes of a unit
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum KillOperation {
    KillTerminate,
    KillTerminateAndLog,
    KillRestart,
    KillKill,
    KillWatchdog,
    KillInvalid,
}

impl KillOperation {
    ///
    pub fn to_signal(&self, kill_context: Rc<KillContext>) -> Signal {
        match *self {
            KillOperation::KillTerminate
            | KillOperation::KillTerminateAndLog
            | KillOperation::KillRestart => kill_context.kill_signal(),
            KillOperation::KillKill => Signal::SIGKILL,
            KillOperation::KillWatchdog => Signal::SIGABRT,
            _ => Signal::SIGTERM,
        }
    }
}

/// which processes of the unit a manual kill request targets
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum KillWho {
    Main,
    Control,
    All,
}

/// the method to kill the processes of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillMode {
    /// kill every process in the control group of the unit
    ControlGroup,
    /// only kill the main process
    Process,
    /// SIGTERM to the main process, SIGKILL to the control group
    Mixed,
}

impl Default for KillMode {
    fn default() -> Self {
        Self::ControlGroup
    }
}

impl DeserializeWith for KillMode {
    type Item = Self;
    fn deserialize_with<'de, D>(de: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(de)?;
        match s.as_str() {
            "control-group" => Ok(KillMode::ControlGroup),
            "process" => Ok(KillMode::Process),
            "mixed" => Ok(KillMode::Mixed),
            _ => Ok(KillMode::ControlGroup),
        }
    }
}

/// kill method context of the unit
pub struct KillContext {
    kill_mode: RefCell<KillMode>,
    kill_signal: RefCell<Signal>,
    send_sigkill: RefCell<bool>,
}

impl Default for KillContext {
    fn default() -> Self {
        Self {
            kill_mode: RefCell::new(KillMode::default()),
            kill_signal: RefCell::new(Signal::SIGTERM),
            send_sigkill: RefCell::new(true),
        }
    }
}

impl KillContext {
    /// set the kill mode
    pub fn set_kill_mode(&self, mode: KillMode) {
        *self.kill_mode.borrow_mut() = mode;
    }

    /// get the kill mode
    pub fn kill_mode(&self) -> KillMode {
        *self.kill_mode.borrow()
    }

    /// set the configured kill signal
    pub fn set_kill_signal(&self, signal: Signal) {
        *self.kill_signal.borrow_mut() = signal;
    }

    /// get the kill signal
    fn kill_signal(&self) -> Signal {
        *self.kill_signal.borrow()
    }

    /// whether an escalation to SIGKILL is permitted
    pub fn set_send_sigkill(&self, v: bool) {
        *self.send_sigkill.borrow_mut() = v;
    }

    ///
    pub fn send_sigkill(&self) -> bool {
        *self.send_sigkill.borrow()
    }
}

/// deliver a manually requested signal to the given unit processes
pub fn unit_kill_common(
    who: KillWho,
    signo: Signal,
    main_pid: Option<Pid>,
    control_pid: Option<Pid>,
) -> Result<()> {
    let mut killed = false;

    if matches!(who, KillWho::Main | KillWho::All) {
        if let Some(pid) = main_pid {
            nix::sys::signal::kill(pid, signo).context(NixSnafu)?;
            killed = true;
        }
    }

    if matches!(who, KillWho::Control | KillWho::All) {
        if let Some(pid) = control_pid {
            nix::sys::signal::kill(pid, signo).context(NixSnafu)?;
            killed = true;
        }
    }

    if !killed {
        return Err(Error::NotFound {
            what: "no process to kill".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_context_defaults() {
        let ctx = KillContext::default();
        assert_eq!(ctx.kill_mode(), KillMode::ControlGroup);
        assert!(ctx.send_sigkill());
        assert_eq!(
            KillOperation::KillTerminate.to_signal(Rc::new(ctx)),
            Signal::SIGTERM
        );
    }

    #[test]
    fn test_kill_operation_to_signal() {
        let ctx = Rc::new(KillContext::default());
        ctx.set_kill_signal(Signal::SIGINT);
        assert_eq!(
            KillOperation::KillTerminate.to_signal(ctx.clone()),
            Signal::SIGINT
        );
        assert_eq!(KillOperation::KillKill.to_signal(ctx), Signal::SIGKILL);
    }

    #[test]
    fn test_unit_kill_common_nothing() {
        assert!(unit_kill_common(KillWho::All, Signal::SIGTERM, None, None).is_err());
    }
}
