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

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::path::PathBuf;

/// The per-unit execution context shared by all its exec steps. The
/// spawning machinery lives in the manager; units only carry the knobs.
#[derive(Default)]
pub struct ExecContext {
    envs: RefCell<HashMap<String, String>>,
    pam_name: RefCell<Option<String>>,
    tmp_dir: RefCell<Option<PathBuf>>,
    var_tmp_dir: RefCell<Option<PathBuf>>,
}

impl ExecContext {
    ///
    pub fn new() -> ExecContext {
        ExecContext::default()
    }

    ///
    pub fn insert_env(&self, key: String, value: String) {
        self.envs.borrow_mut().insert(key, value);
    }

    ///
    pub fn envs(&self) -> Vec<(String, String)> {
        self.envs
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    ///
    pub fn set_pam_name(&self, pam_name: Option<String>) {
        *self.pam_name.borrow_mut() = pam_name;
    }

    ///
    pub fn pam_name(&self) -> Option<String> {
        self.pam_name.borrow().clone()
    }

    /// private transient /tmp of the spawned processes
    pub fn set_tmp_dir(&self, dir: Option<PathBuf>) {
        *self.tmp_dir.borrow_mut() = dir;
    }

    ///
    pub fn tmp_dir(&self) -> Option<PathBuf> {
        self.tmp_dir.borrow().clone()
    }

    ///
    pub fn set_var_tmp_dir(&self, dir: Option<PathBuf>) {
        *self.var_tmp_dir.borrow_mut() = dir;
    }

    ///
    pub fn var_tmp_dir(&self) -> Option<PathBuf> {
        self.var_tmp_dir.borrow().clone()
    }

    /// forget the scratch directories, the manager removed them
    pub fn tmp_dirs_done(&self) {
        self.set_tmp_dir(None);
        self.set_var_tmp_dir(None);
    }
}

/// per-spawn parameters assembled by the unit right before exec
#[derive(Default)]
pub struct ExecParameters {
    environment: RefCell<HashMap<String, String>>,
    confirm_spawn: RefCell<bool>,
}

impl ExecParameters {
    ///
    pub fn new() -> ExecParameters {
        ExecParameters::default()
    }

    ///
    pub fn add_env(&self, key: &str, value: String) {
        self.environment
            .borrow_mut()
            .insert(key.to_string(), value);
    }

    ///
    pub fn get_env(&self, key: &str) -> Option<String> {
        self.environment.borrow().get(key).cloned()
    }

    /// environment in the NULL-terminated form execve wants
    pub fn envs(&self) -> Vec<CString> {
        self.environment
            .borrow()
            .iter()
            .map(|(k, v)| CString::new(format!("{}={}", k, v)).unwrap())
            .collect()
    }

    ///
    pub fn set_confirm_spawn(&self, v: bool) {
        *self.confirm_spawn.borrow_mut() = v;
    }

    ///
    pub fn confirm_spawn(&self) -> bool {
        *self.confirm_spawn.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_context_scratch_dirs() {
        let ctx = ExecContext::new();
        assert_eq!(ctx.tmp_dir(), None);

        ctx.set_tmp_dir(Some(PathBuf::from("/tmp/unit-xyz")));
        ctx.set_var_tmp_dir(Some(PathBuf::from("/var/tmp/unit-xyz")));
        assert!(ctx.tmp_dir().is_some());

        ctx.tmp_dirs_done();
        assert_eq!(ctx.tmp_dir(), None);
        assert_eq!(ctx.var_tmp_dir(), None);
    }
}
