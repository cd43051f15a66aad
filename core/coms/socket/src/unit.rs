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

//! SocketUnit is the entrance of the component. It implements the traits
//! SubUnit and UnitMngUtil: SubUnit defines the behavior the manager
//! drives, UnitMngUtil attaches the manager to the sub unit.

use crate::base::SocketState;
use crate::comm::SocketUnitComm;
use crate::config::SocketConfig;
use crate::load::SocketLoad;
use crate::mng::{SocketMng, SocketMngPort};
use crate::port::SocketPort;
use basic::IN_SET;
use libcore::error::*;
use libcore::exec::ExecContext;
use libcore::serialize::FdBag;
use libcore::unit::{
    unit_kill_common, KillMode, KillWho, SubUnit, UmIf, UnitActiveState, UnitBase, UnitMngUtil,
};
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::any::Any;
use std::io::Write;
use std::{path::PathBuf, rc::Rc};

// the structure of the socket unit type
struct SocketUnit {
    comm: Rc<SocketUnitComm>,
    config: Rc<SocketConfig>,
    mng: Rc<SocketMng>,
    load: SocketLoad,
    exec_ctx: Rc<ExecContext>,
}

impl SubUnit for SocketUnit {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn load(&self, paths: Vec<PathBuf>) -> Result<()> {
        log::debug!("socket begin to load conf file");
        self.config.load(paths)?;

        self.exec_ctx
            .set_pam_name(self.config.config_data().borrow().Socket.PAMName.clone());

        let ret = self.load.socket_add_extras();
        if ret.is_err() {
            self.config.reset();
            return ret;
        }

        self.build_ports();

        self.verify()
    }

    // the function entrance to start the unit
    fn start(&self) -> Result<()> {
        let starting = self.mng.start_check()?;
        if starting {
            log::debug!("socket already in starting, skipping.");
            return Ok(());
        }

        self.mng.start_action();

        Ok(())
    }

    // process reentrant with force
    fn stop(&self, force: bool) -> Result<()> {
        if !force {
            let stopping = self.mng.stop_check()?;
            if stopping {
                log::debug!("socket already in stopping, skipping.");
                return Ok(());
            }
        }

        self.mng.stop_action();

        Ok(())
    }

    fn kill(&self, who: KillWho, signo: Signal) -> Result<()> {
        unit_kill_common(who, signo, None, self.mng.control_pid())
    }

    fn trigger(&self, other: &str) {
        if !IN_SET!(
            self.mng.state(),
            SocketState::Running,
            SocketState::Listening
        ) {
            return;
        }

        /* per-connection instances come and go on their own */
        if self.config.config_data().borrow().Socket.Accept {
            return;
        }

        let um = self.comm.um();
        if um.has_job(other) {
            return;
        }

        let service_state = um.get_subunit_state(other);
        match service_state.as_str() {
            "failed" => self.mng.notify_service_dead(um.start_limit_hit(other)),
            "dead" | "stop" | "stop-sigterm" | "stop-sigkill" | "stop-post" | "final-sigterm"
            | "final-sigkill" | "auto-restart" => self.mng.notify_service_dead(false),
            "running" => self.mng.notify_service_running(),
            _ => {}
        }
    }

    fn sigchld_events(&self, wait_status: WaitStatus) {
        self.mng.sigchld_event(wait_status)
    }

    fn reset_failed(&self) {
        self.mng.reset_failed()
    }

    fn current_active_state(&self) -> UnitActiveState {
        self.mng.current_active_state()
    }

    fn get_subunit_state(&self) -> String {
        self.mng.state().to_string()
    }

    fn collect_fds(&self) -> Vec<i32> {
        self.mng.collect_fds()
    }

    fn attach_unit(&self, unit: Rc<dyn UnitBase>) {
        self.comm.attach_unit(unit);
    }

    fn serialize(&self, f: &mut dyn Write, fds: &mut FdBag) -> Result<()> {
        self.mng.serialize(f, fds)
    }

    fn deserialize_item(&self, key: &str, value: &str, fds: &mut FdBag) {
        self.mng.deserialize_item(key, value, fds)
    }

    fn distribute_fds(&self, fds: &mut FdBag) {
        self.mng.distribute_fds(fds)
    }

    fn coldplug(&self) -> Result<()> {
        self.mng.coldplug()
    }

    fn get_timeout(&self) -> Option<u64> {
        self.mng.get_timeout()
    }

    fn check_gc(&self) -> bool {
        self.mng.n_connections() > 0
    }

    fn connection_unref(&self) {
        self.mng.connection_unref()
    }
}

// attach the UnitManager for a weak reference
impl UnitMngUtil for SocketUnit {
    fn attach_um(&self, um: Rc<dyn UmIf>) {
        self.comm.attach_um(um);
    }
}

impl SocketUnit {
    fn new(_um: Rc<dyn UmIf>) -> SocketUnit {
        let context = Rc::new(ExecContext::new());
        let comm = Rc::new(SocketUnitComm::new());
        let config = Rc::new(SocketConfig::new(&comm));
        let mng = Rc::new(SocketMng::new(&comm, &config, &context));
        mng.timer().attach_mng(Rc::downgrade(&mng));
        SocketUnit {
            comm: Rc::clone(&comm),
            config: Rc::clone(&config),
            mng,
            load: SocketLoad::new(&config, &comm),
            exec_ctx: context,
        }
    }

    fn build_ports(&self) {
        self.mng.clear_ports();
        for p_conf in self.config.ports().iter() {
            let port = Rc::new(SocketPort::new(&self.config, p_conf));
            let mport = Rc::new(SocketMngPort::new(&self.mng, port));
            self.mng.push_port(mport);
        }
    }

    fn verify(&self) -> Result<()> {
        if self.config.ports().is_empty() {
            log::error!("Unit has no Listen setting (ListenStream=, ListenDatagram=, ListenFIFO=, ...). Refusing.");
            return Err(Error::ConfigureError {
                msg: "no Listen setting".to_string(),
            });
        }

        let accept = self.config.config_data().borrow().Socket.Accept;

        if accept && self.load.have_non_accept_socket() {
            log::error!("Unit is configured for accepting sockets, but the sockets are non-accepting. Refusing.");
            return Err(Error::ConfigureError {
                msg: "accepting socket with non-accepting ports".to_string(),
            });
        }

        if accept && self.config.config_data().borrow().Socket.MaxConnections == 0 {
            log::error!("MaxConnections setting too small. Refusing.");
            return Err(Error::ConfigureError {
                msg: "MaxConnections too small".to_string(),
            });
        }

        if accept && self.config.config_data().borrow().Socket.Service.is_some() {
            log::error!(
                "Explicit service configuration for accepting sockets not supported. Refusing."
            );
            return Err(Error::ConfigureError {
                msg: "explicit service on accepting socket".to_string(),
            });
        }

        if self.exec_ctx.pam_name().is_some()
            && self.config.kill_context().kill_mode() != KillMode::ControlGroup
        {
            log::error!("Unit has PAM enabled. Kill mode must be set to 'control-group'. Refusing.");
            return Err(Error::ConfigureError {
                msg: "PAMName= requires KillMode=control-group".to_string(),
            });
        }

        Ok(())
    }
}

// define the method to create the instance of the unit
use libcore::declare_unitobj_plugin_with_param;
declare_unitobj_plugin_with_param!(SocketUnit, SocketUnit::new);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SocketResult;
    use event::{Events, Source};
    use libcore::exec::{ExecCommand, ExecContext, ExecParameters};
    use libcore::serialize::deserialize_item;
    use libcore::unit::{KillContext, KillOperation, UnitNotifyFlags, UnitType};
    use nix::unistd::Pid;
    use std::cell::RefCell;
    use std::net::TcpStream;
    use std::os::unix::prelude::RawFd;

    struct TestUnit {
        id: String,
        alive_on_kill: bool,
    }

    impl TestUnit {
        fn new(alive_on_kill: bool) -> Rc<TestUnit> {
            Rc::new(TestUnit {
                id: String::from("test.socket"),
                alive_on_kill,
            })
        }
    }

    impl UnitBase for TestUnit {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn unit_type(&self) -> UnitType {
            UnitType::UnitSocket
        }

        fn test_start_limit(&self) -> bool {
            true
        }

        fn kill_context(
            &self,
            _k_context: Rc<KillContext>,
            _m_pid: Option<Pid>,
            _c_pid: Option<Pid>,
            _ko: KillOperation,
        ) -> Result<bool> {
            Ok(self.alive_on_kill)
        }

        fn notify(&self, _os: UnitActiveState, _ns: UnitActiveState, _flags: UnitNotifyFlags) {}

        fn prepare_exec(&self) -> Result<()> {
            Ok(())
        }

        fn default_dependencies(&self) -> bool {
            true
        }
    }

    struct TestUm {
        events: Rc<Events>,
        start_jobs: RefCell<Vec<String>>,
        socket_fds: RefCell<Vec<(String, RawFd)>>,
        spawned: RefCell<Vec<String>>,
        stop_pending: RefCell<bool>,
        subunit_state: RefCell<String>,
    }

    impl TestUm {
        fn new() -> Rc<TestUm> {
            Rc::new(TestUm {
                events: Rc::new(Events::new().unwrap()),
                start_jobs: RefCell::new(Vec::new()),
                socket_fds: RefCell::new(Vec::new()),
                spawned: RefCell::new(Vec::new()),
                stop_pending: RefCell::new(false),
                subunit_state: RefCell::new(String::from("dead")),
            })
        }
    }

    impl UmIf for TestUm {
        fn events(&self) -> Rc<Events> {
            self.events.clone()
        }

        fn load_unit_success(&self, _name: &str) -> bool {
            true
        }

        fn has_stop_job(&self, _name: &str) -> bool {
            *self.stop_pending.borrow()
        }

        fn unit_start_by_job(&self, name: &str) -> Result<()> {
            self.start_jobs.borrow_mut().push(name.to_string());
            Ok(())
        }

        fn service_set_socket_fd(&self, service_name: &str, fd: i32) {
            self.socket_fds
                .borrow_mut()
                .push((service_name.to_string(), fd));
        }

        fn exec_spawn(
            &self,
            _unit_name: &str,
            cmdline: &ExecCommand,
            _params: &mut ExecParameters,
            _ctx: Rc<ExecContext>,
        ) -> Result<Pid> {
            self.spawned.borrow_mut().push(cmdline.path().clone());
            Ok(nix::unistd::getpid())
        }

        fn get_subunit_state(&self, _unit_name: &str) -> String {
            self.subunit_state.borrow().clone()
        }
    }

    fn build_unit(um: Rc<TestUm>, base: Rc<TestUnit>, tag: &str, content: &str) -> SocketUnit {
        let path = format!("/tmp/{}.socket", tag);
        std::fs::write(&path, content).unwrap();

        let unit = SocketUnit::new(um.clone() as Rc<dyn UmIf>);
        unit.attach_um(um);
        // keep a strong reference alive for the lifetime of the test process,
        // since `attach_unit` only stores a weak reference to the owning unit.
        Box::leak(Box::new(base.clone()));
        unit.attach_unit(base);
        unit.load(vec![PathBuf::from(&path)]).unwrap();
        std::fs::remove_file(&path).unwrap();
        unit
    }

    #[test]
    fn test_verify_refuses_bad_configs() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let path = "/tmp/uttest-verify.socket";

        // no Listen at all
        std::fs::write(path, "[Socket]\nAccept = false\n").unwrap();
        let unit = SocketUnit::new(um.clone() as Rc<dyn UmIf>);
        unit.attach_um(um.clone());
        unit.attach_unit(base.clone());
        assert!(unit.load(vec![PathBuf::from(path)]).is_err());

        // Accept=yes on a fifo cannot work
        std::fs::write(
            path,
            "[Socket]\nListenFIFO = \"/tmp/uttest-verify-fifo\"\nAccept = true\n",
        )
        .unwrap();
        let unit = SocketUnit::new(um.clone() as Rc<dyn UmIf>);
        unit.attach_um(um.clone());
        unit.attach_unit(base.clone());
        assert!(unit.load(vec![PathBuf::from(path)]).is_err());

        // Accept=yes excludes an explicit service
        std::fs::write(
            path,
            "[Socket]\nListenStream = \"127.0.0.1:0\"\nAccept = true\nService = \"other.service\"\n",
        )
        .unwrap();
        let unit = SocketUnit::new(um.clone() as Rc<dyn UmIf>);
        unit.attach_um(um.clone());
        unit.attach_unit(base.clone());
        assert!(unit.load(vec![PathBuf::from(path)]).is_err());

        // PAM requires the control-group kill mode
        std::fs::write(
            path,
            "[Socket]\nListenStream = \"127.0.0.1:0\"\nPAMName = \"login\"\nKillMode = \"process\"\n",
        )
        .unwrap();
        let unit = SocketUnit::new(um.clone() as Rc<dyn UmIf>);
        unit.attach_um(um.clone());
        unit.attach_unit(base.clone());
        assert!(unit.load(vec![PathBuf::from(path)]).is_err());

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_start_stop_cycle() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let sock = "/tmp/socket-unit-cycle.sock";
        let _ = std::fs::remove_file(sock);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-cycle",
            "[Socket]\nListenStream = \"/tmp/socket-unit-cycle.sock\"\n",
        );

        unit.start().unwrap();
        assert_eq!(unit.mng.state(), SocketState::Listening);
        assert_eq!(unit.get_subunit_state(), "listening");
        assert_eq!(unit.current_active_state(), UnitActiveState::Active);
        assert_eq!(unit.collect_fds().len(), 1);
        assert!(std::path::Path::new(sock).exists());

        // a second start is accepted quietly
        unit.start().unwrap();
        assert_eq!(unit.mng.state(), SocketState::Listening);

        unit.stop(false).unwrap();
        assert_eq!(unit.mng.state(), SocketState::Dead);
        assert_eq!(unit.mng.result(), SocketResult::Success);
        assert!(unit.collect_fds().is_empty());

        let _ = std::fs::remove_file(sock);
    }

    #[test]
    fn test_start_pre_hook_chain() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let sock = "/tmp/socket-unit-hook.sock";
        let _ = std::fs::remove_file(sock);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-hook",
            "[Socket]\nListenStream = \"/tmp/socket-unit-hook.sock\"\nExecStartPre = \"/bin/true\"\n",
        );

        unit.start().unwrap();
        assert_eq!(unit.mng.state(), SocketState::StartPre);
        assert_eq!(um.spawned.borrow().as_slice(), ["/bin/true"]);
        assert!(unit.get_timeout().is_some());

        // an exit of an unrelated pid is ignored
        unit.sigchld_events(WaitStatus::Exited(Pid::from_raw(1), 0));
        assert_eq!(unit.mng.state(), SocketState::StartPre);

        unit.sigchld_events(WaitStatus::Exited(nix::unistd::getpid(), 0));
        assert_eq!(unit.mng.state(), SocketState::Listening);
        assert_eq!(unit.get_timeout(), None);

        unit.stop(false).unwrap();
        let _ = std::fs::remove_file(sock);
    }

    #[test]
    fn test_failing_hook_enters_failed() {
        let um = TestUm::new();
        let base = TestUnit::new(false);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-hook-fail",
            "[Socket]\nListenStream = \"/tmp/socket-unit-hook-fail.sock\"\nExecStartPre = \"/bin/false\"\n",
        );

        unit.start().unwrap();
        unit.sigchld_events(WaitStatus::Exited(nix::unistd::getpid(), 1));

        assert_eq!(unit.mng.state(), SocketState::Failed);
        assert_eq!(unit.mng.result(), SocketResult::FailureExitCode);

        unit.reset_failed();
        assert_eq!(unit.mng.state(), SocketState::Dead);
        assert_eq!(unit.mng.result(), SocketResult::Success);
    }

    #[test]
    fn test_ignored_hook_failure_continues() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let sock = "/tmp/socket-unit-hook-ignore.sock";
        let _ = std::fs::remove_file(sock);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-hook-ignore",
            "[Socket]\nListenStream = \"/tmp/socket-unit-hook-ignore.sock\"\nExecStartPre = \"-/bin/false\"\n",
        );

        unit.start().unwrap();
        unit.sigchld_events(WaitStatus::Exited(nix::unistd::getpid(), 1));

        assert_eq!(unit.mng.state(), SocketState::Listening);

        unit.stop(false).unwrap();
        let _ = std::fs::remove_file(sock);
    }

    #[test]
    fn test_start_pre_timeout_chain() {
        let um = TestUm::new();
        let base = TestUnit::new(true); // signalled processes stay around

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-timeout",
            "[Socket]\nListenStream = \"/tmp/socket-unit-timeout.sock\"\nExecStartPre = \"/bin/sleep 100\"\nTimeoutSec = 1\n",
        );

        unit.start().unwrap();
        assert_eq!(unit.mng.state(), SocketState::StartPre);

        let timer = unit.mng.timer();
        timer.dispatch(&um.events());
        assert_eq!(unit.mng.state(), SocketState::FinalSigterm);
        assert_eq!(unit.mng.result(), SocketResult::FailureTimeout);

        timer.dispatch(&um.events());
        assert_eq!(unit.mng.state(), SocketState::FinalSigkill);

        timer.dispatch(&um.events());
        assert_eq!(unit.mng.state(), SocketState::Failed);
        assert_eq!(unit.mng.result(), SocketResult::FailureTimeout);
    }

    #[test]
    fn test_accept_dispatch_and_max_connections() {
        let um = TestUm::new();
        let base = TestUnit::new(false);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-accept",
            "[Socket]\nListenStream = \"127.0.0.1:0\"\nAccept = true\nMaxConnections = 2\n",
        );

        unit.start().unwrap();
        assert_eq!(unit.mng.state(), SocketState::Listening);

        let fd = unit.collect_fds()[0];
        let local: nix::sys::socket::SockaddrStorage =
            nix::sys::socket::getsockname(fd).unwrap();
        let port = local.as_sockaddr_in().unwrap().port();

        let mut streams = Vec::new();
        for _ in 0..3 {
            streams.push(TcpStream::connect(("127.0.0.1", port)).unwrap());
        }

        let mports = unit.mng.mports();
        for _ in 0..3 {
            mports[0].dispatch(&um.events());
        }

        // two instances started, the third connection was refused
        assert_eq!(um.start_jobs.borrow().len(), 2);
        assert_eq!(um.socket_fds.borrow().len(), 2);
        assert_eq!(unit.mng.n_accepted(), 2);
        assert_eq!(unit.mng.n_connections(), 2);
        assert_eq!(unit.mng.state(), SocketState::Listening);

        for (i, name) in um.start_jobs.borrow().iter().enumerate() {
            assert!(name.starts_with(&format!("test@{}-127.0.0.1:{}-", i, port)));
            assert!(name.ends_with(".service"));
        }

        // accepted descriptors stay alive while their service runs
        assert!(unit.check_gc());
        unit.connection_unref();
        assert_eq!(unit.mng.n_connections(), 1);

        for (_, cfd) in um.socket_fds.borrow().iter() {
            basic::fd::close(*cfd);
        }
        unit.stop(false).unwrap();
    }

    #[test]
    fn test_accept_suppressed_while_stop_pending() {
        let um = TestUm::new();
        let base = TestUnit::new(false);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-accept-stop",
            "[Socket]\nListenStream = \"127.0.0.1:0\"\nAccept = true\n",
        );

        unit.start().unwrap();
        let fd = unit.collect_fds()[0];
        let local: nix::sys::socket::SockaddrStorage =
            nix::sys::socket::getsockname(fd).unwrap();
        let port = local.as_sockaddr_in().unwrap().port();

        *um.stop_pending.borrow_mut() = true;
        let _stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        unit.mng.mports()[0].dispatch(&um.events());

        assert!(um.start_jobs.borrow().is_empty());
        assert_eq!(unit.mng.n_accepted(), 0);
        assert_eq!(unit.mng.state(), SocketState::Listening);

        *um.stop_pending.borrow_mut() = false;
        unit.stop(false).unwrap();
    }

    #[test]
    fn test_shared_mode_triggers_service() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let sock = "/tmp/socket-unit-shared.sock";
        let _ = std::fs::remove_file(sock);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-shared",
            "[Socket]\nListenStream = \"/tmp/socket-unit-shared.sock\"\n",
        );

        // the related service was resolved at load time
        assert_eq!(
            unit.config.unit_ref_target(),
            Some(String::from("test.service"))
        );

        unit.start().unwrap();

        let _client = std::os::unix::net::UnixStream::connect(sock).unwrap();
        unit.mng.mports()[0].dispatch(&um.events());

        assert_eq!(unit.mng.state(), SocketState::Running);
        assert_eq!(um.start_jobs.borrow().as_slice(), ["test.service"]);

        // the service went back down, we listen again
        *um.subunit_state.borrow_mut() = String::from("dead");
        unit.trigger("test.service");
        assert_eq!(unit.mng.state(), SocketState::Listening);

        unit.stop(false).unwrap();
        let _ = std::fs::remove_file(sock);
    }

    #[test]
    fn test_service_failed_permanently() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let sock = "/tmp/socket-unit-permfail.sock";
        let _ = std::fs::remove_file(sock);

        let unit = build_unit(
            um.clone(),
            base,
            "uttest-permfail",
            "[Socket]\nListenStream = \"/tmp/socket-unit-permfail.sock\"\n",
        );

        unit.start().unwrap();
        let _client = std::os::unix::net::UnixStream::connect(sock).unwrap();
        unit.mng.mports()[0].dispatch(&um.events());
        assert_eq!(unit.mng.state(), SocketState::Running);

        unit.mng.notify_service_dead(true);
        assert_eq!(unit.mng.state(), SocketState::Failed);
        assert_eq!(
            unit.mng.result(),
            SocketResult::FailureServiceFailedPermanent
        );

        let _ = std::fs::remove_file(sock);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let sock = "/tmp/socket-unit-snapshot.sock";
        let _ = std::fs::remove_file(sock);
        let conf = "[Socket]\nListenStream = \"/tmp/socket-unit-snapshot.sock\"\n";

        let unit = build_unit(um.clone(), base.clone(), "uttest-snapshot", conf);
        unit.start().unwrap();

        let mut buf = Vec::new();
        let mut bag = FdBag::new();
        unit.serialize(&mut buf, &mut bag).unwrap();
        assert_eq!(bag.len(), 1);

        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("state listening"));
        assert!(text.contains("result success"));
        assert!(text.contains("n-accepted 0"));

        // a freshly loaded unit picks the descriptor back up
        let um2 = TestUm::new();
        let unit2 = build_unit(um2.clone(), base, "uttest-snapshot", conf);
        for line in text.lines() {
            if let Some((key, value)) = deserialize_item(line) {
                unit2.deserialize_item(key, value, &mut bag);
            }
        }
        assert!(bag.is_empty());

        unit2.coldplug().unwrap();
        assert_eq!(unit2.mng.state(), SocketState::Listening);
        assert_eq!(unit2.collect_fds().len(), 1);

        unit2.stop(false).unwrap();
        unit.stop(false).unwrap();
        let _ = std::fs::remove_file(sock);
    }

    #[test]
    fn test_distribute_fds_matches_structurally() {
        let um = TestUm::new();
        let base = TestUnit::new(false);
        let sock = "/tmp/socket-unit-distribute.sock";
        let _ = std::fs::remove_file(sock);
        let conf = "[Socket]\nListenStream = \"/tmp/socket-unit-distribute.sock\"\n";

        let unit = build_unit(um.clone(), base.clone(), "uttest-distribute", conf);
        unit.start().unwrap();
        let fd = unit.collect_fds()[0];

        // hand the descriptor over without any snapshot lines
        let mut bag = FdBag::new();
        let copy = bag.put_dup(fd).unwrap();

        let um2 = TestUm::new();
        let unit2 = build_unit(um2.clone(), base, "uttest-distribute", conf);
        unit2.distribute_fds(&mut bag);

        assert!(bag.is_empty());
        assert_eq!(unit2.collect_fds(), vec![copy]);

        unit2.coldplug().unwrap();
        assert_eq!(unit2.mng.state(), SocketState::Listening);

        unit2.stop(false).unwrap();
        unit.stop(false).unwrap();
        let _ = std::fs::remove_file(sock);
    }
}
