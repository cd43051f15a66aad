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

//! filesystem helpers
use crate::error::*;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use std::path::{Component, Path, PathBuf};

const PATH_LENGTH_MAX: usize = 4096;
const FILE_LENGTH_MAX: usize = 255;

///
pub fn path_is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// validate an absolute path and normalize repeated slashes
pub fn parse_absolute_path(path: &str) -> Result<String> {
    if path.is_empty() || !path_is_absolute(path) {
        return Err(Error::Invalid {
            what: format!("path is not absolute: {}", path),
        });
    }

    if path.len() > PATH_LENGTH_MAX {
        return Err(Error::Invalid {
            what: "path is too long".to_string(),
        });
    }

    let mut res = String::new();
    for f in path.split('/') {
        if f.is_empty() {
            continue;
        }
        if f.len() > FILE_LENGTH_MAX {
            return Err(Error::Invalid {
                what: "file name is too long".to_string(),
            });
        }
        if f.bytes().any(|c| c.is_ascii_control()) {
            return Err(Error::Invalid {
                what: format!("invalid character in path: {}", path),
            });
        }
        res.push('/');
        res.push_str(f);
    }

    if res.is_empty() {
        res.push('/');
    }

    Ok(res)
}

/// create the missing parent directories of `path` with the given mode
pub fn mkdir_parents(path: &Path, mode: u32) -> Result<()> {
    let parent = match path.parent() {
        None => return Ok(()),
        Some(v) => v,
    };

    let mut cur = PathBuf::new();
    for comp in parent.components() {
        cur.push(comp);
        if matches!(comp, Component::RootDir | Component::CurDir) {
            continue;
        }
        match nix::unistd::mkdir(&cur, Mode::from_bits_truncate(mode)) {
            Ok(_) => {}
            Err(Errno::EEXIST) => {}
            Err(e) => return Err(Error::Nix { source: e }),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_path() {
        assert_eq!(parse_absolute_path("/bin//echo").unwrap(), "/bin/echo");
        assert!(parse_absolute_path("bin/echo").is_err());
        assert!(parse_absolute_path("").is_err());

        let long = "/a/".to_string() + &String::from_iter(vec!['1'; 256]);
        assert!(parse_absolute_path(&long).is_err());
    }

    #[test]
    fn test_mkdir_parents() {
        let path = Path::new("/tmp/basic-mkdir-test/a/b/node");
        mkdir_parents(path, 0o755).unwrap();
        assert!(path.parent().unwrap().is_dir());
        let _ = std::fs::remove_dir_all("/tmp/basic-mkdir-test");
    }
}
