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

//! The core of the socket unit: the start/stop state machine, the port
//! collection, connection dispatch and the snapshot used across manager
//! re-execution.
//!
use super::base::{PortType, SocketCommand, SocketResult, SocketState};
use super::comm::SocketUnitComm;
use super::config::SocketConfig;
use super::pid::SocketPid;
use super::port::SocketPort;
use super::spawn::SocketSpawn;
use basic::time::{monotonic_usec, USEC_INFINITY};
use basic::IN_SET;
use constants::{EXIT_CHOWN, EXIT_GROUP, EXIT_USER, INVALID_FD};
use event::{EventState, EventType, Events, Source};
use libcore::error::*;
use libcore::exec::{ExecCommand, ExecContext, ExecFlag};
use libcore::serialize::{serialize_item, FdBag};
use libcore::unit::{
    unit_name_build, unit_name_to_prefix, KillOperation, UnitActiveState, UnitDependencyMask,
    UnitNotifyFlags, UnitRelations,
};
use nix::errno::Errno;
use nix::sys::socket::{self, sockopt, AddressFamily, SockaddrLike, SockaddrStorage};
use nix::sys::wait::WaitStatus;
use nix::unistd::{ForkResult, Gid, Pid, Uid};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::prelude::RawFd;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::str::FromStr;

impl SocketState {
    pub(super) fn to_unit_active_state(self) -> UnitActiveState {
        match self {
            SocketState::Dead => UnitActiveState::InActive,
            SocketState::StartPre | SocketState::StartChown | SocketState::StartPost => {
                UnitActiveState::Activating
            }
            SocketState::Listening | SocketState::Running => UnitActiveState::Active,
            SocketState::StopPre
            | SocketState::StopPreSigterm
            | SocketState::StopPreSigkill
            | SocketState::StopPost
            | SocketState::FinalSigterm
            | SocketState::FinalSigkill => UnitActiveState::DeActivating,
            SocketState::Failed => UnitActiveState::Failed,
        }
    }

    fn to_kill_operation(self) -> KillOperation {
        match self {
            SocketState::StopPreSigterm | SocketState::FinalSigterm => {
                KillOperation::KillTerminate
            }
            _ => KillOperation::KillKill,
        }
    }

    fn holds_control_process(self) -> bool {
        IN_SET!(
            self,
            SocketState::StartPre,
            SocketState::StartChown,
            SocketState::StartPost,
            SocketState::StopPre,
            SocketState::StopPreSigterm,
            SocketState::StopPreSigkill,
            SocketState::StopPost,
            SocketState::FinalSigterm,
            SocketState::FinalSigkill
        )
    }

    fn holds_fds(self) -> bool {
        IN_SET!(
            self,
            SocketState::StartChown,
            SocketState::StartPost,
            SocketState::Listening,
            SocketState::Running,
            SocketState::StopPre,
            SocketState::StopPreSigterm,
            SocketState::StopPreSigkill
        )
    }
}

pub(crate) struct SocketMng {
    // associated objects
    comm: Rc<SocketUnitComm>,
    config: Rc<SocketConfig>,
    exec_ctx: Rc<ExecContext>,

    // owned objects
    pid: SocketPid,
    spawn: SocketSpawn,
    timer: Rc<SocketTimer>,
    ports: RefCell<Vec<Rc<SocketMngPort>>>,
    state: RefCell<SocketState>,
    result: RefCell<SocketResult>,
    deserialized_state: RefCell<Option<SocketState>>,
    control_cmd_type: RefCell<Option<SocketCommand>>,
    control_command: RefCell<VecDeque<ExecCommand>>,
    current_control_command: RefCell<Option<ExecCommand>>,
    n_accepted: RefCell<u32>,
    n_connections: RefCell<u32>,
}

impl SocketMng {
    pub(crate) fn new(
        commr: &Rc<SocketUnitComm>,
        configr: &Rc<SocketConfig>,
        exec_ctx: &Rc<ExecContext>,
    ) -> SocketMng {
        SocketMng {
            comm: Rc::clone(commr),
            config: Rc::clone(configr),
            exec_ctx: Rc::clone(exec_ctx),

            pid: SocketPid::new(commr),
            spawn: SocketSpawn::new(commr, exec_ctx),
            timer: Rc::new(SocketTimer::new()),
            ports: RefCell::new(Vec::new()),
            state: RefCell::new(SocketState::Dead),
            result: RefCell::new(SocketResult::Success),
            deserialized_state: RefCell::new(None),
            control_cmd_type: RefCell::new(None),
            control_command: RefCell::new(VecDeque::new()),
            current_control_command: RefCell::new(None),
            n_accepted: RefCell::new(0),
            n_connections: RefCell::new(0),
        }
    }

    pub(crate) fn timer(&self) -> Rc<SocketTimer> {
        self.timer.clone()
    }

    pub(crate) fn push_port(&self, port: Rc<SocketMngPort>) {
        self.ports.borrow_mut().push(port);
    }

    pub(crate) fn clear_ports(&self) {
        self.ports.borrow_mut().clear();
    }

    pub(crate) fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    pub(crate) fn current_active_state(&self) -> UnitActiveState {
        self.state().to_unit_active_state()
    }

    pub(crate) fn control_pid(&self) -> Option<Pid> {
        self.pid.control()
    }

    pub(crate) fn result(&self) -> SocketResult {
        *self.result.borrow()
    }

    pub(crate) fn n_accepted(&self) -> u32 {
        *self.n_accepted.borrow()
    }

    pub(crate) fn n_connections(&self) -> u32 {
        *self.n_connections.borrow()
    }

    pub(crate) fn start_check(&self) -> Result<bool> {
        if IN_SET!(
            self.state(),
            SocketState::StopPre,
            SocketState::StopPreSigkill,
            SocketState::StopPreSigterm,
            SocketState::StopPost,
            SocketState::FinalSigterm,
            SocketState::FinalSigkill
        ) {
            return Err(Error::UnitActionEAgain);
        }

        if IN_SET!(
            self.state(),
            SocketState::StartPre,
            SocketState::StartChown,
            SocketState::StartPost
        ) {
            return Ok(true);
        }

        /* cannot activate anything when the companion service vanished
         * or is already running on its own */
        if let Some(service) = self.config.unit_ref_target() {
            let um = self.comm.um();
            if !um.test_trigger_loaded(&service) {
                log::error!("Socket service {} not loaded, refusing.", service);
                return Err(Error::UnitVanished);
            }
            if !um.current_active_state(&service).is_inactive_or_failed() {
                log::error!("Socket service {} already active, refusing.", service);
                return Err(Error::UnitActionEBusy);
            }
        }

        Ok(false)
    }

    pub(crate) fn start_action(&self) {
        /* make sure a former failure does not disturb this lifecycle */
        self.set_result(SocketResult::Success);
        self.enter_start_pre();
    }

    pub(crate) fn stop_check(&self) -> Result<bool> {
        if IN_SET!(
            self.state(),
            SocketState::StopPre,
            SocketState::StopPreSigterm,
            SocketState::StopPreSigkill,
            SocketState::StopPost,
            SocketState::FinalSigterm,
            SocketState::FinalSigkill
        ) {
            return Ok(true);
        }

        /* an in-flight start hook is signalled right away */
        if IN_SET!(
            self.state(),
            SocketState::StartPre,
            SocketState::StartChown,
            SocketState::StartPost
        ) {
            self.enter_signal(SocketState::StopPreSigterm, SocketResult::Success);
            return Err(Error::UnitActionEAgain);
        }

        Ok(false)
    }

    pub(crate) fn stop_action(&self) {
        self.enter_stop_pre(SocketResult::Success);
    }

    pub(crate) fn reset_failed(&self) {
        if self.state() == SocketState::Failed {
            self.set_state(SocketState::Dead);
        }
        self.set_result(SocketResult::Success);
    }

    pub(crate) fn collect_fds(&self) -> Vec<i32> {
        let mut fds = Vec::new();
        for port in self.ports().iter() {
            if port.fd() >= 0 {
                fds.push(port.fd());
            }
        }

        fds
    }

    /* ========== state entry functions ========== */

    pub(crate) fn enter_start_pre(&self) {
        log::debug!("enter start pre command");
        self.pid.unwatch_control();

        self.control_command_fill(SocketCommand::StartPre);
        let cmd = match self.control_command_pop() {
            None => {
                self.enter_start_chown();
                return;
            }
            Some(v) => v,
        };
        *self.current_control_command.borrow_mut() = Some(cmd.clone());
        *self.control_cmd_type.borrow_mut() = Some(SocketCommand::StartPre);

        let pid = match self.spawn.start_socket(&cmd) {
            Err(e) => {
                log::error!("Failed to run ExecStartPre: {:?}", e);
                self.enter_dead(SocketResult::FailureResources);
                return;
            }
            Ok(v) => v,
        };
        self.pid.set_control(pid);
        self.set_state(SocketState::StartPre);
        self.enable_timer(self.config.timeout_usec());
    }

    fn enter_start_chown(&self) {
        log::debug!("enter start chown");
        if let Err(e) = self.open_fds() {
            log::warn!("failed to listen on sockets: {:?}", e);
            self.enter_stop_pre(SocketResult::FailureResources);
            return;
        }

        let user = self.config.config_data().borrow().Socket.SocketUser.clone();
        let group = self
            .config
            .config_data()
            .borrow()
            .Socket
            .SocketGroup
            .clone();

        if user.is_empty() && group.is_empty() {
            self.enter_start_post();
            return;
        }

        self.pid.unwatch_control();
        *self.control_cmd_type.borrow_mut() = Some(SocketCommand::StartChown);
        *self.current_control_command.borrow_mut() = None;

        match self.socket_chown() {
            Ok(pid) => self.pid.set_control(pid),
            Err(e) => {
                log::error!("Failed to fork the chown helper: {:?}", e);
                self.enter_stop_pre(SocketResult::FailureResources);
                return;
            }
        }
        self.set_state(SocketState::StartChown);
        self.enable_timer(self.config.timeout_usec());
    }

    fn enter_start_post(&self) {
        log::debug!("enter start post command");
        self.pid.unwatch_control();

        self.control_command_fill(SocketCommand::StartPost);
        let cmd = match self.control_command_pop() {
            None => {
                self.enter_listening();
                return;
            }
            Some(v) => v,
        };
        *self.current_control_command.borrow_mut() = Some(cmd.clone());
        *self.control_cmd_type.borrow_mut() = Some(SocketCommand::StartPost);

        match self.spawn.start_socket(&cmd) {
            Ok(pid) => self.pid.set_control(pid),
            Err(e) => {
                log::error!("Failed to run ExecStartPost: {:?}", e);
                self.enter_stop_pre(SocketResult::FailureResources);
                return;
            }
        }
        self.set_state(SocketState::StartPost);
        self.enable_timer(self.config.timeout_usec());
    }

    pub(crate) fn enter_listening(&self) {
        log::debug!("enter listening state");
        if let Err(e) = self.watch_fds() {
            log::warn!("failed to watch sockets: {:?}", e);
            self.enter_stop_pre(SocketResult::FailureResources);
            return;
        }

        self.set_state(SocketState::Listening);
    }

    /// `fd` is the accepted connection in per-connection mode, or negative
    /// when the shared descriptors themselves became ready
    fn enter_running(&self, fd: RawFd) {
        let u = match self.comm.owner() {
            None => return,
            Some(v) => v,
        };
        let um = self.comm.um();

        /* no new connections once our own stop is queued */
        if um.has_stop_job(&u.id()) {
            log::debug!(
                "Suppressing connection request on {} since unit stop is scheduled.",
                u.id()
            );

            if fd >= 0 {
                basic::fd::close(fd);
            } else if self.flush_ports().is_err() {
                self.enter_stop_pre(SocketResult::FailureResources);
            }
            return;
        }

        if fd < 0 {
            if !um.relation_active_or_pending(&u.id()) {
                let service = match self.config.unit_ref_target() {
                    None => {
                        log::error!(
                            "{}: service to activate vanished, refusing activation.",
                            u.id()
                        );
                        self.enter_stop_pre(SocketResult::FailureResources);
                        return;
                    }
                    Some(v) => v,
                };

                if um.unit_start_by_job(&service).is_err() {
                    self.enter_stop_pre(SocketResult::FailureResources);
                    return;
                }
            }

            self.set_state(SocketState::Running);
            return;
        }

        /* Per-connection mode. The admission limit is checked before the
         * peer is even looked at. */
        if self.n_connections() >= self.config.config_data().borrow().Socket.MaxConnections {
            log::warn!(
                "{}: Too many incoming connections ({})",
                u.id(),
                self.n_connections()
            );
            basic::fd::close(fd);
            return;
        }

        let instance = match instance_from_socket_fd(fd, self.n_accepted()) {
            Err(Error::Nix {
                source: Errno::ENOTCONN,
            }) => {
                /* the peer is gone already (TCP RST); this connection is
                 * over but the socket unit lives on */
                basic::fd::close(fd);
                return;
            }
            Err(e) => {
                log::error!("Failed to build the instance name: {:?}", e);
                basic::fd::close(fd);
                self.enter_stop_pre(SocketResult::FailureResources);
                return;
            }
            Ok(v) => v,
        };

        let prefix = unit_name_to_prefix(&u.id());
        let name = unit_name_build(&prefix, &instance, "service");

        if !um.load_unit_success(&name) {
            log::error!("Failed to load the triggered service: {}", name);
            basic::fd::close(fd);
            return;
        }

        if um
            .unit_add_two_dependency(
                &u.id(),
                UnitRelations::UnitBefore,
                UnitRelations::UnitTriggers,
                &name,
                false,
                UnitDependencyMask::Implicit,
            )
            .is_err()
        {
            log::error!("Failed to add dependency for {} -> {}", u.id(), name);
            basic::fd::close(fd);
            return;
        }

        um.service_set_socket_fd(&name, fd);
        *self.n_accepted.borrow_mut() += 1;
        *self.n_connections.borrow_mut() += 1;

        if um.unit_start_by_job(&name).is_err() {
            log::warn!("Failed to queue service startup job for {}", name);
            um.service_release_socket_fd(&name, fd);
            *self.n_connections.borrow_mut() -= 1;
            self.enter_stop_pre(SocketResult::FailureResources);
        }
    }

    fn enter_stop_pre(&self, res: SocketResult) {
        log::debug!("enter stop pre command");
        if self.result() == SocketResult::Success {
            self.set_result(res);
        }

        self.pid.unwatch_control();

        self.control_command_fill(SocketCommand::StopPre);
        let cmd = match self.control_command_pop() {
            None => {
                self.enter_stop_post(SocketResult::Success);
                return;
            }
            Some(v) => v,
        };
        *self.current_control_command.borrow_mut() = Some(cmd.clone());
        *self.control_cmd_type.borrow_mut() = Some(SocketCommand::StopPre);

        match self.spawn.start_socket(&cmd) {
            Ok(pid) => self.pid.set_control(pid),
            Err(e) => {
                log::error!("Failed to run ExecStopPre: {:?}", e);
                self.enter_stop_post(SocketResult::FailureResources);
                return;
            }
        }
        self.set_state(SocketState::StopPre);
        self.enable_timer(self.config.timeout_usec());
    }

    fn enter_stop_post(&self, res: SocketResult) {
        log::debug!("enter stop post command");
        if self.result() == SocketResult::Success {
            self.set_result(res);
        }

        self.pid.unwatch_control();

        self.control_command_fill(SocketCommand::StopPost);
        let cmd = match self.control_command_pop() {
            None => {
                self.enter_signal(SocketState::FinalSigterm, SocketResult::Success);
                return;
            }
            Some(v) => v,
        };
        *self.current_control_command.borrow_mut() = Some(cmd.clone());
        *self.control_cmd_type.borrow_mut() = Some(SocketCommand::StopPost);

        match self.spawn.start_socket(&cmd) {
            Ok(pid) => self.pid.set_control(pid),
            Err(e) => {
                log::error!("Failed to run ExecStopPost: {:?}", e);
                self.enter_signal(SocketState::FinalSigterm, SocketResult::FailureResources);
                return;
            }
        }
        self.set_state(SocketState::StopPost);
        self.enable_timer(self.config.timeout_usec());
    }

    fn enter_signal(&self, state: SocketState, res: SocketResult) {
        log::debug!("enter signal state {}, res: {:?}", state, res);
        if self.result() == SocketResult::Success {
            self.set_result(res);
        }

        let op = state.to_kill_operation();
        let alive = match self.comm.owner() {
            None => false,
            Some(u) => {
                match u.kill_context(self.config.kill_context(), None, self.pid.control(), op) {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("failed to kill processes: {:?}", e);
                        if IN_SET!(
                            state,
                            SocketState::StopPreSigterm,
                            SocketState::StopPreSigkill
                        ) {
                            return self.enter_stop_post(SocketResult::FailureResources);
                        }
                        return self.enter_dead(SocketResult::FailureResources);
                    }
                }
            }
        };

        if alive {
            self.set_state(state);
            self.enable_timer(self.config.timeout_usec());
        } else if IN_SET!(
            state,
            SocketState::StopPreSigterm,
            SocketState::StopPreSigkill
        ) {
            self.enter_stop_post(SocketResult::Success);
        } else {
            self.enter_dead(SocketResult::Success);
        }
    }

    fn enter_dead(&self, res: SocketResult) {
        log::debug!("enter dead state, res {:?}", res);
        if self.result() == SocketResult::Success {
            self.set_result(res);
        }

        self.exec_ctx.tmp_dirs_done();

        let state = if self.result() == SocketResult::Success {
            SocketState::Dead
        } else {
            SocketState::Failed
        };

        self.set_state(state);
    }

    fn run_next(&self) {
        self.pid.unwatch_control();

        let cmd = match self.control_command_pop() {
            None => return,
            Some(v) => v,
        };
        *self.current_control_command.borrow_mut() = Some(cmd.clone());

        match self.spawn.start_socket(&cmd) {
            Ok(pid) => {
                self.pid.set_control(pid);
                self.enable_timer(self.config.timeout_usec());
            }
            Err(e) => {
                log::warn!("failed to run next task: {:?}", e);
                match self.state() {
                    SocketState::StartPost => self.enter_stop_pre(SocketResult::FailureResources),
                    SocketState::StopPost => self.enter_dead(SocketResult::FailureResources),
                    _ => self.enter_signal(
                        SocketState::FinalSigterm,
                        SocketResult::FailureResources,
                    ),
                }
            }
        }
    }

    /* ========== event handlers ========== */

    pub(crate) fn sigchld_event(&self, wait_status: WaitStatus) {
        let control = match self.pid.control() {
            None => return,
            Some(v) => v,
        };
        if wait_status.pid() != Some(control) {
            return;
        }
        self.pid.reset_control();

        let mut res = self.sigchld_result(wait_status);

        let ignore = self
            .current_control_command
            .borrow()
            .as_ref()
            .map_or(false, |c| {
                c.get_exec_flag()
                    .contains(ExecFlag::EXEC_COMMAND_IGNORE_FAILURE)
            });
        if ignore {
            res = SocketResult::Success;
        }

        log::debug!(
            "control process exited in state {}, result: {}",
            self.state(),
            res
        );

        /* steps of one phase run strictly in order, the next one is
         * spawned only after a clean final exit */
        if !self.control_command.borrow().is_empty() && res == SocketResult::Success {
            self.run_next();
            return;
        }

        *self.current_control_command.borrow_mut() = None;
        *self.control_cmd_type.borrow_mut() = None;

        match self.state() {
            SocketState::StartPre => {
                if res == SocketResult::Success {
                    self.enter_start_chown();
                } else {
                    self.enter_signal(SocketState::FinalSigterm, res);
                }
            }
            SocketState::StartChown => {
                if res == SocketResult::Success {
                    self.enter_start_post();
                } else {
                    self.enter_stop_pre(res);
                }
            }
            SocketState::StartPost => {
                if res == SocketResult::Success {
                    self.enter_listening();
                } else {
                    self.enter_stop_pre(res);
                }
            }
            SocketState::StopPre | SocketState::StopPreSigterm | SocketState::StopPreSigkill => {
                self.enter_stop_post(res);
            }
            SocketState::StopPost | SocketState::FinalSigterm | SocketState::FinalSigkill => {
                self.enter_dead(res);
            }
            _ => {
                log::error!(
                    "control process should not exit, current state is: {}",
                    self.state()
                );
                unreachable!();
            }
        }
    }

    fn sigchld_result(&self, wait_status: WaitStatus) -> SocketResult {
        match wait_status {
            WaitStatus::Exited(_, status) => {
                if status == 0 {
                    SocketResult::Success
                } else {
                    SocketResult::FailureExitCode
                }
            }
            WaitStatus::Signaled(_, _, core_dump) => {
                if core_dump {
                    SocketResult::FailureCoreDump
                } else {
                    SocketResult::FailureSignal
                }
            }
            _ => unreachable!(),
        }
    }

    /* ========== service notifications ========== */

    /// strictly for shared-descriptor services
    pub(crate) fn notify_service_dead(&self, failed_permanent: bool) {
        if self.state() != SocketState::Running {
            return;
        }

        log::debug!(
            "got notified about service death (failed permanently: {})",
            failed_permanent
        );
        if failed_permanent {
            self.enter_stop_pre(SocketResult::FailureServiceFailedPermanent);
        } else {
            self.enter_listening();
        }
    }

    pub(crate) fn notify_service_running(&self) {
        if self.state() == SocketState::Listening {
            self.set_state(SocketState::Running);
        }
    }

    /// strictly for per-connection services
    pub(crate) fn connection_unref(&self) {
        let current = self.n_connections();
        if current == 0 {
            log::warn!("connection counter is already zero");
            return;
        }
        *self.n_connections.borrow_mut() = current - 1;
        log::debug!("One connection closed, {} left.", current - 1);
    }

    /* ========== descriptors ========== */

    fn open_fds(&self) -> Result<()> {
        for port in self.ports().iter() {
            let ret = port.open_port();
            if ret.is_err() {
                /* roll back to the pre-open state */
                self.close_fds();
                return ret;
            }

            match port.p_type() {
                PortType::Socket => port.apply_sock_opt(port.fd()),
                PortType::Fifo => port.apply_fifo_opt(port.fd()),
                PortType::Special | PortType::MessageQueue => {}
            }
        }

        Ok(())
    }

    fn close_fds(&self) {
        let events = self.comm.um().events();
        for mport in self.mports().iter() {
            let source = Rc::clone(mport);
            let _ = events.set_enabled(source.clone(), EventState::Off);
            let _ = events.del_source(source);
        }

        for port in self.ports().iter() {
            port.close();
        }
    }

    fn watch_fds(&self) -> Result<()> {
        let events = self.comm.um().events();
        for mport in self.mports().iter() {
            if mport.fd() < 0 {
                continue;
            }
            let source = Rc::clone(mport);
            if !events.has_source(source.clone()) {
                events.add_source(source.clone())?;
            }
            events.set_enabled(source, EventState::On)?;
        }
        Ok(())
    }

    fn unwatch_fds(&self) {
        let events = self.comm.um().events();
        for mport in self.mports().iter() {
            let source = Rc::clone(mport);
            let _ = events.set_enabled(source, EventState::Off);
        }
    }

    /// drain whatever queued up by closing and reopening every listener
    fn flush_ports(&self) -> Result<()> {
        self.close_fds();
        self.open_fds()?;
        self.watch_fds()
    }

    /* ========== state bookkeeping ========== */

    fn set_state(&self, state: SocketState) {
        let original_state = self.state();
        *self.state.borrow_mut() = state;

        if !state.holds_control_process() {
            self.delete_timer();
            self.pid.unwatch_control();
            *self.control_cmd_type.borrow_mut() = None;
            *self.current_control_command.borrow_mut() = None;
            self.control_command.borrow_mut().clear();
        }

        if state != SocketState::Listening {
            self.unwatch_fds();
        }

        if !state.holds_fds() {
            self.close_fds();
        }

        if state != original_state {
            log::debug!("socket changed {} -> {}", original_state, state);
        }

        if let Some(u) = self.comm.owner() {
            u.notify(
                original_state.to_unit_active_state(),
                state.to_unit_active_state(),
                UnitNotifyFlags::EMPTY,
            );
        }
    }

    fn set_result(&self, res: SocketResult) {
        *self.result.borrow_mut() = res;
    }

    fn control_command_fill(&self, cmd_type: SocketCommand) {
        *self.control_command.borrow_mut() = self.config.get_exec_cmds(cmd_type);
    }

    fn control_command_pop(&self) -> Option<ExecCommand> {
        self.control_command.borrow_mut().pop_front()
    }

    pub(crate) fn mports(&self) -> Vec<Rc<SocketMngPort>> {
        self.ports.borrow().iter().map(Rc::clone).collect::<_>()
    }

    pub(crate) fn ports(&self) -> Vec<Rc<SocketPort>> {
        self.ports
            .borrow()
            .iter()
            .map(|p| Rc::clone(&p.port))
            .collect::<_>()
    }

    /* ========== timer ========== */

    fn enable_timer(&self, usec: u64) {
        if usec == USEC_INFINITY {
            self.delete_timer();
            return;
        }

        let events = self.comm.um().events();
        let source = self.timer.clone();

        if self.timer.armed() {
            let _ = events.set_enabled(source.clone(), EventState::Off);
        }

        self.timer.set_time(usec);
        if let Err(e) = events.add_source(source.clone()) {
            log::warn!("failed to add the timer source: {:?}", e);
            return;
        }
        if let Err(e) = events.set_enabled(source, EventState::OneShot) {
            log::warn!("failed to arm the timer: {:?}", e);
            return;
        }

        self.timer.arm(monotonic_usec().saturating_add(usec));
    }

    fn delete_timer(&self) {
        if !self.timer.armed() {
            return;
        }
        self.timer.disarm();

        let events = self.comm.um().events();
        let source = self.timer.clone();
        let _ = events.set_enabled(source.clone(), EventState::Off);
        let _ = events.del_source(source);
    }

    pub(crate) fn get_timeout(&self) -> Option<u64> {
        self.timer
            .deadline()
            .map(|d| d.saturating_sub(monotonic_usec()))
    }

    /* ========== chown helper ========== */

    /// User and group names are resolved out of process, hence the fork.
    fn socket_chown(&self) -> Result<Pid> {
        match unsafe { nix::unistd::fork() } {
            Err(e) => Err(Error::Nix { source: e }),
            Ok(ForkResult::Parent { child }) => {
                if let Some(u) = self.comm.owner() {
                    self.comm.um().child_watch_pid(&u.id(), child);
                }
                Ok(child)
            }
            Ok(ForkResult::Child) => {
                let ret = self.chown_child();
                unsafe { libc::_exit(ret) };
            }
        }
    }

    fn chown_child(&self) -> i32 {
        let user = self.config.config_data().borrow().Socket.SocketUser.clone();
        let group = self
            .config
            .config_data()
            .borrow()
            .Socket
            .SocketGroup
            .clone();

        let mut uid: Option<Uid> = None;
        let mut gid: Option<Gid> = None;

        if !user.is_empty() {
            match basic::unistd::get_user_creds(&user) {
                Ok(u) => {
                    uid = Some(u.uid);
                    gid = Some(u.gid);
                }
                Err(_) => return EXIT_USER,
            }
        }

        /* a bare SocketGroup leaves the uid alone */
        if !group.is_empty() {
            match basic::unistd::get_group_creds(&group) {
                Ok(g) => gid = Some(g.gid),
                Err(_) => return EXIT_GROUP,
            }
        }

        for port in self.ports().iter() {
            if port.chown(uid, gid).is_err() {
                return EXIT_CHOWN;
            }
        }

        0
    }

    /* ========== snapshot across re-execution ========== */

    pub(crate) fn serialize(&self, f: &mut dyn Write, fds: &mut FdBag) -> Result<()> {
        serialize_item(f, "state", &self.state().to_string())?;
        serialize_item(f, "result", &self.result().to_string())?;
        serialize_item(f, "n-accepted", &self.n_accepted().to_string())?;

        if let Some(pid) = self.pid.control() {
            serialize_item(f, "control-pid", &pid.as_raw().to_string())?;
        }

        if let Some(c) = *self.control_cmd_type.borrow() {
            serialize_item(f, "control-command", &c.to_string())?;
        }

        for port in self.ports().iter() {
            if port.fd() < 0 {
                continue;
            }

            let copy = fds.put_dup(port.fd())?;

            match port.p_type() {
                PortType::Socket => {
                    let sa = match port.p_conf().sa() {
                        None => continue,
                        Some(v) => v,
                    };
                    if sa.family() == AddressFamily::Netlink {
                        serialize_item(f, "netlink", &format!("{} {}", copy, port.listen()))?;
                    } else {
                        serialize_item(
                            f,
                            "socket",
                            &format!("{} {} {}", copy, sa.sa_type() as i32, port.listen()),
                        )?;
                    }
                }
                PortType::Fifo => {
                    serialize_item(f, "fifo", &format!("{} {}", copy, port.listen()))?
                }
                PortType::Special => {
                    serialize_item(f, "special", &format!("{} {}", copy, port.listen()))?
                }
                PortType::MessageQueue => {
                    serialize_item(f, "mqueue", &format!("{} {}", copy, port.listen()))?
                }
            }
        }

        if let Some(dir) = self.exec_ctx.tmp_dir() {
            serialize_item(f, "tmp-dir", &dir.to_string_lossy())?;
        }
        if let Some(dir) = self.exec_ctx.var_tmp_dir() {
            serialize_item(f, "var-tmp-dir", &dir.to_string_lossy())?;
        }

        Ok(())
    }

    pub(crate) fn deserialize_item(&self, key: &str, value: &str, fds: &mut FdBag) {
        match key {
            "state" => match value.parse::<SocketState>() {
                Ok(state) => *self.deserialized_state.borrow_mut() = Some(state),
                Err(_) => log::debug!("Failed to parse state value {}", value),
            },
            "result" => match value.parse::<SocketResult>() {
                Ok(SocketResult::Success) => {}
                Ok(res) => self.set_result(res),
                Err(_) => log::debug!("Failed to parse result value {}", value),
            },
            "n-accepted" => match value.parse::<u32>() {
                Ok(k) => *self.n_accepted.borrow_mut() += k,
                Err(_) => log::debug!("Failed to parse n-accepted value {}", value),
            },
            "control-pid" => match value.parse::<i32>() {
                Ok(pid) if pid > 0 => self.pid.update_control(Some(Pid::from_raw(pid))),
                _ => log::debug!("Failed to parse control-pid value {}", value),
            },
            "control-command" => match SocketCommand::from_str(value) {
                Ok(c) => {
                    *self.control_cmd_type.borrow_mut() = Some(c);
                    self.control_command_fill(c);
                }
                Err(_) => log::debug!("Failed to parse control-command value {}", value),
            },
            "fifo" => self.deserialize_path_port(PortType::Fifo, value, fds),
            "special" => self.deserialize_path_port(PortType::Special, value, fds),
            "mqueue" => self.deserialize_path_port(PortType::MessageQueue, value, fds),
            "socket" => self.deserialize_socket(value, fds),
            "netlink" => self.deserialize_netlink(value, fds),
            "tmp-dir" => self.exec_ctx.set_tmp_dir(Some(PathBuf::from(value))),
            "var-tmp-dir" => self.exec_ctx.set_var_tmp_dir(Some(PathBuf::from(value))),
            _ => log::debug!("Unknown serialization key '{}'", key),
        }
    }

    fn deserialize_path_port(&self, p_type: PortType, value: &str, fds: &mut FdBag) {
        let (fd, path) = match parse_fd_prefix(value, fds) {
            None => {
                log::debug!("Failed to parse {:?} value {}", p_type, value);
                return;
            }
            Some(v) => v,
        };

        for port in self.ports().iter() {
            if port.p_type() == p_type && port.listen() == path {
                port.close();
                port.set_fd(fds.remove(fd));
                return;
            }
        }
    }

    fn deserialize_socket(&self, value: &str, fds: &mut FdBag) {
        let mut it = value.splitn(3, ' ');
        let (fd, sotype, addr) = match (it.next(), it.next(), it.next()) {
            (Some(f), Some(t), Some(a)) => (f, t, a),
            _ => {
                log::debug!("Failed to parse socket value {}", value);
                return;
            }
        };
        let fd: RawFd = match fd.parse() {
            Ok(v) if v >= 0 => v,
            _ => return,
        };
        let sotype: i32 = match sotype.parse() {
            Ok(v) if v >= 0 => v,
            _ => return,
        };
        if !fds.contains(fd) {
            log::debug!("socket value fd {} is not in the bag", fd);
            return;
        }

        for port in self.ports().iter() {
            if port.p_type() != PortType::Socket {
                continue;
            }
            let sa = match port.p_conf().sa() {
                None => continue,
                Some(v) => v,
            };
            if sa.sa_type() as i32 == sotype && port.listen() == addr {
                port.close();
                port.set_fd(fds.remove(fd));
                return;
            }
        }
    }

    fn deserialize_netlink(&self, value: &str, fds: &mut FdBag) {
        let (fd, spec) = match parse_fd_prefix(value, fds) {
            None => {
                log::debug!("Failed to parse netlink value {}", value);
                return;
            }
            Some(v) => v,
        };

        for port in self.ports().iter() {
            if port.p_type() != PortType::Socket {
                continue;
            }
            let family = match port.p_conf().sa() {
                None => continue,
                Some(sa) => sa.family(),
            };
            if family == AddressFamily::Netlink && port.listen() == spec {
                port.close();
                port.set_fd(fds.remove(fd));
                return;
            }
        }
    }

    /// Descriptors inherited without snapshot lines are handed back by
    /// structural equality of the bound address, never by fd number.
    pub(crate) fn distribute_fds(&self, fds: &mut FdBag) {
        for port in self.ports().iter() {
            if port.p_type() != PortType::Socket {
                continue;
            }
            if port.fd() >= 0 {
                continue;
            }
            let sa = match port.p_conf().sa() {
                None => continue,
                Some(v) => v,
            };

            let matched: Option<RawFd> = fds.iter().find(|fd| sa.matches_fd(*fd));
            if let Some(fd) = matched {
                port.set_fd(fds.remove(fd));
                *self.deserialized_state.borrow_mut() = Some(SocketState::Listening);
            }
        }
    }

    /// reattach to the lifecycle the snapshot described
    pub(crate) fn coldplug(&self) -> Result<()> {
        let ds = match *self.deserialized_state.borrow() {
            None => return Ok(()),
            Some(v) => v,
        };
        if ds == self.state() {
            return Ok(());
        }

        if ds.holds_control_process() {
            let pid = match self.pid.control() {
                None => return Err(Error::UnitActionEBadMsg),
                Some(v) => v,
            };
            if let Some(u) = self.comm.owner() {
                self.comm.um().child_watch_pid(&u.id(), pid);
            }
        }

        if ds.holds_fds() {
            self.open_fds()?;
        }

        if ds == SocketState::Listening {
            self.watch_fds()?;
        }

        self.set_state(ds);

        if ds.holds_control_process() {
            self.enable_timer(self.config.timeout_usec());
        }

        Ok(())
    }
}

/* ========== instance naming ========== */

fn ipv4_mapped(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    let o = ip.octets();
    if o[..10] == [0u8; 10] && o[10] == 0xff && o[11] == 0xff {
        Some(Ipv4Addr::new(o[12], o[13], o[14], o[15]))
    } else {
        None
    }
}

/// The per-connection instance string of an inet connection. V4-mapped v6
/// pairs collapse to their plain v4 form.
pub(super) fn instance_from_addresses(nr: u32, local: SocketAddr, remote: SocketAddr) -> String {
    if let (SocketAddr::V6(l), SocketAddr::V6(r)) = (&local, &remote) {
        if let (Some(a), Some(b)) = (ipv4_mapped(l.ip()), ipv4_mapped(r.ip())) {
            return format!("{}-{}:{}-{}:{}", nr, a, l.port(), b, r.port());
        }
    }

    format!(
        "{}-{}:{}-{}:{}",
        nr,
        local.ip(),
        local.port(),
        remote.ip(),
        remote.port()
    )
}

fn storage_to_socketaddr(ss: &SockaddrStorage) -> Option<SocketAddr> {
    if let Some(sin) = ss.as_sockaddr_in() {
        return Some(SocketAddr::V4(SocketAddrV4::from(*sin)));
    }
    if let Some(sin6) = ss.as_sockaddr_in6() {
        return Some(SocketAddr::V6(SocketAddrV6::from(*sin6)));
    }
    None
}

/// derive the instance suffix from the accepted descriptor
pub(super) fn instance_from_socket_fd(fd: RawFd, nr: u32) -> Result<String> {
    let local: SockaddrStorage = socket::getsockname(fd).context(NixSnafu)?;

    match local.family() {
        Some(AddressFamily::Inet) | Some(AddressFamily::Inet6) => {
            let remote: SockaddrStorage = socket::getpeername(fd).context(NixSnafu)?;
            let l = storage_to_socketaddr(&local).ok_or(Error::InvalidData)?;
            let r = storage_to_socketaddr(&remote).ok_or(Error::InvalidData)?;
            Ok(instance_from_addresses(nr, l, r))
        }
        Some(AddressFamily::Unix) => {
            let ucred = socket::getsockopt(fd, sockopt::PeerCredentials).context(NixSnafu)?;
            Ok(format!("{}-{}-{}", nr, ucred.pid(), ucred.uid()))
        }
        _ => Err(Error::InvalidData),
    }
}

fn parse_fd_prefix<'a>(value: &'a str, fds: &FdBag) -> Option<(RawFd, &'a str)> {
    let (fd, rest) = value.split_once(' ')?;
    let fd: RawFd = fd.parse().ok()?;
    if fd < 0 || !fds.contains(fd) {
        return None;
    }
    Some((fd, rest))
}

/* ========== event sources ========== */

pub(crate) struct SocketMngPort {
    // associated objects
    mng: Weak<SocketMng>,

    // owned objects
    port: Rc<SocketPort>,
}

impl Source for SocketMngPort {
    fn fd(&self) -> RawFd {
        self.port.fd()
    }

    fn event_type(&self) -> EventType {
        EventType::Io
    }

    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN) as u32
    }

    fn priority(&self) -> i8 {
        0i8
    }

    fn dispatch(&self, _: &Events) -> i32 {
        self.dispatch_io().unwrap_or(-1)
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }
}

impl SocketMngPort {
    pub(crate) fn new(mng: &Rc<SocketMng>, port: Rc<SocketPort>) -> SocketMngPort {
        SocketMngPort {
            mng: Rc::downgrade(mng),
            port,
        }
    }

    fn dispatch_io(&self) -> Result<i32> {
        let mng = match self.mng.upgrade() {
            None => return Ok(0),
            Some(v) => v,
        };

        /* late or spurious wakeups are not for us */
        if mng.state() != SocketState::Listening {
            return Ok(0);
        }

        log::debug!("Incoming traffic on {}", self.port.listen());

        let mut afd: RawFd = INVALID_FD;
        if mng.config.config_data().borrow().Socket.Accept
            && self.port.p_type() == PortType::Socket
            && self.port.can_accept()
        {
            afd = match self.port.accept() {
                Ok(v) => v,
                Err(Error::Nix {
                    source: Errno::EAGAIN,
                }) => return Ok(0),
                Err(e) => {
                    log::error!("Failed to accept socket: {:?}", e);
                    mng.enter_stop_pre(SocketResult::FailureResources);
                    return Ok(0);
                }
            };

            self.port.apply_sock_opt(afd);
        }

        mng.enter_running(afd);

        Ok(0)
    }
}

pub(crate) struct SocketTimer {
    time: RefCell<u64>,
    deadline: RefCell<Option<u64>>,
    mng: RefCell<Weak<SocketMng>>,
}

impl SocketTimer {
    fn new() -> SocketTimer {
        SocketTimer {
            time: RefCell::new(USEC_INFINITY),
            deadline: RefCell::new(None),
            mng: RefCell::new(Weak::new()),
        }
    }

    pub(crate) fn attach_mng(&self, mng: Weak<SocketMng>) {
        *self.mng.borrow_mut() = mng;
    }

    fn set_time(&self, usec: u64) {
        *self.time.borrow_mut() = usec;
    }

    fn arm(&self, deadline: u64) {
        *self.deadline.borrow_mut() = Some(deadline);
    }

    fn disarm(&self) {
        *self.deadline.borrow_mut() = None;
    }

    fn armed(&self) -> bool {
        self.deadline.borrow().is_some()
    }

    fn deadline(&self) -> Option<u64> {
        *self.deadline.borrow()
    }

    fn do_dispatch(&self, mng: &SocketMng) -> i32 {
        log::debug!("dispatch socket timer in state {}", mng.state());

        match mng.state() {
            SocketState::StartPre => {
                log::warn!("starting timed out. Terminating.");
                mng.enter_signal(SocketState::FinalSigterm, SocketResult::FailureTimeout);
            }
            SocketState::StartChown | SocketState::StartPost => {
                log::warn!("starting timed out. Stopping.");
                mng.enter_stop_pre(SocketResult::FailureTimeout);
            }
            SocketState::StopPre => {
                log::warn!("stopping timed out. Terminating.");
                mng.enter_signal(SocketState::StopPreSigterm, SocketResult::FailureTimeout);
            }
            SocketState::StopPreSigterm => {
                if mng.config.kill_context().send_sigkill() {
                    log::warn!("stopping timed out. Killing.");
                    mng.enter_signal(SocketState::StopPreSigkill, SocketResult::FailureTimeout);
                } else {
                    log::warn!("stopping timed out. Skipping SIGKILL. Ignoring.");
                    mng.enter_stop_post(SocketResult::FailureTimeout);
                }
            }
            SocketState::StopPreSigkill => {
                log::warn!("still around after SIGKILL. Ignoring.");
                mng.enter_stop_post(SocketResult::FailureTimeout);
            }
            SocketState::StopPost => {
                log::warn!("stopping timed out (2). Terminating.");
                mng.enter_signal(SocketState::FinalSigterm, SocketResult::FailureTimeout);
            }
            SocketState::FinalSigterm => {
                if mng.config.kill_context().send_sigkill() {
                    log::warn!("stopping timed out (2). Killing.");
                    mng.enter_signal(SocketState::FinalSigkill, SocketResult::FailureTimeout);
                } else {
                    log::warn!("stopping timed out (2). Skipping SIGKILL. Ignoring.");
                    mng.enter_dead(SocketResult::FailureTimeout);
                }
            }
            SocketState::FinalSigkill => {
                log::warn!("still around after SIGKILL (2). Entering failed mode.");
                mng.enter_dead(SocketResult::FailureTimeout);
            }
            _ => {
                /* a stray timer of an already finished transition */
            }
        }
        0
    }
}

impl Source for SocketTimer {
    fn event_type(&self) -> EventType {
        EventType::TimerMonotonic
    }

    fn time_relative(&self) -> u64 {
        *self.time.borrow()
    }

    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN) as u32
    }

    fn priority(&self) -> i8 {
        0i8
    }

    fn dispatch(&self, _: &Events) -> i32 {
        self.disarm();
        match self.mng.borrow().upgrade() {
            None => 0,
            Some(mng) => self.do_dispatch(&mng),
        }
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_active_state() {
        assert_eq!(
            SocketState::Dead.to_unit_active_state(),
            UnitActiveState::InActive
        );
        assert_eq!(
            SocketState::StartPre.to_unit_active_state(),
            UnitActiveState::Activating
        );
        assert_eq!(
            SocketState::StartChown.to_unit_active_state(),
            UnitActiveState::Activating
        );
        assert_eq!(
            SocketState::StartPost.to_unit_active_state(),
            UnitActiveState::Activating
        );
        assert_eq!(
            SocketState::Listening.to_unit_active_state(),
            UnitActiveState::Active
        );
        assert_eq!(
            SocketState::Running.to_unit_active_state(),
            UnitActiveState::Active
        );
        assert_eq!(
            SocketState::StopPre.to_unit_active_state(),
            UnitActiveState::DeActivating
        );
        assert_eq!(
            SocketState::FinalSigkill.to_unit_active_state(),
            UnitActiveState::DeActivating
        );
        assert_eq!(
            SocketState::Failed.to_unit_active_state(),
            UnitActiveState::Failed
        );
    }

    #[test]
    fn test_kill_operation_mapping() {
        assert_eq!(
            SocketState::StopPreSigterm.to_kill_operation(),
            KillOperation::KillTerminate
        );
        assert_eq!(
            SocketState::FinalSigterm.to_kill_operation(),
            KillOperation::KillTerminate
        );
        assert_eq!(
            SocketState::StopPreSigkill.to_kill_operation(),
            KillOperation::KillKill
        );
        assert_eq!(
            SocketState::FinalSigkill.to_kill_operation(),
            KillOperation::KillKill
        );
    }

    #[test]
    fn test_instance_from_v4_addresses() {
        let local = "10.0.0.1:80".parse().unwrap();
        let remote = "192.168.1.5:54321".parse().unwrap();
        assert_eq!(
            instance_from_addresses(7, local, remote),
            "7-10.0.0.1:80-192.168.1.5:54321"
        );
    }

    #[test]
    fn test_instance_from_v4_mapped_addresses() {
        let local = "[::ffff:10.0.0.1]:80".parse().unwrap();
        let remote = "[::ffff:192.168.1.5]:54321".parse().unwrap();
        assert_eq!(
            instance_from_addresses(7, local, remote),
            "7-10.0.0.1:80-192.168.1.5:54321"
        );
    }

    #[test]
    fn test_instance_from_v6_addresses() {
        let local = "[2001:db8::1]:80".parse().unwrap();
        let remote = "[2001:db8::2]:54321".parse().unwrap();
        assert_eq!(
            instance_from_addresses(3, local, remote),
            "3-2001:db8::1:80-2001:db8::2:54321"
        );
    }

    #[test]
    fn test_instance_is_deterministic() {
        let local: SocketAddr = "10.0.0.1:80".parse().unwrap();
        let remote: SocketAddr = "192.168.1.5:54321".parse().unwrap();
        assert_eq!(
            instance_from_addresses(7, local, remote),
            instance_from_addresses(7, local, remote)
        );
    }
}
