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

//! Common used functions to parse user and group

use crate::error::*;
use nix::unistd::{Gid, Group, Uid, User};

/// Parse a string as UID
pub fn parse_uid(uid_str: &str) -> Result<User> {
    if uid_str.is_empty() {
        return Err(Error::Invalid {
            what: "UID is empty".to_string(),
        });
    }

    if uid_str.eq("0") {
        // This shouldn't fail.
        return Ok(User::from_uid(Uid::from_raw(0)).unwrap().unwrap());
    }

    let mut first = true;
    for c in uid_str.bytes() {
        // uid must only contain 0-9 and must not start with 0
        if !first && c.is_ascii_digit() {
            continue;
        }
        if first && (b'1'..=b'9').contains(&c) {
            first = false;
            continue;
        }
        return Err(Error::Invalid {
            what: "UID must only contain 0-9 and shouldn't start with 0".to_string(),
        });
    }

    let uid = uid_str.parse::<u32>()?;

    match User::from_uid(Uid::from_raw(uid)).context(NixSnafu)? {
        None => Err(Error::Invalid {
            what: "No matched UID".to_string(),
        }),
        Some(v) => Ok(v),
    }
}

/// Parse a string as GID
pub fn parse_gid(gid_str: &str) -> Result<Group> {
    if gid_str.is_empty() {
        return Err(Error::Invalid {
            what: "GID is empty".to_string(),
        });
    }

    if gid_str.eq("0") {
        return Ok(Group::from_gid(Gid::from_raw(0)).unwrap().unwrap());
    }

    let mut first = true;
    for c in gid_str.bytes() {
        if !first && c.is_ascii_digit() {
            continue;
        }
        if first && (b'1'..=b'9').contains(&c) {
            first = false;
            continue;
        }
        return Err(Error::Invalid {
            what: "GID must only contain 0-9 and shouldn't start with 0".to_string(),
        });
    }

    let gid = gid_str.parse::<u32>()?;

    match Group::from_gid(Gid::from_raw(gid)).context(NixSnafu)? {
        None => Err(Error::Invalid {
            what: "No matched GID".to_string(),
        }),
        Some(v) => Ok(v),
    }
}

/// resolve a user by numeric uid or name
pub fn get_user_creds(user: &str) -> Result<User> {
    if let Ok(u) = parse_uid(user) {
        return Ok(u);
    }
    if let Ok(Some(u)) = User::from_name(user) {
        return Ok(u);
    }
    Err(Error::Invalid {
        what: "invalid user name".to_string(),
    })
}

/// resolve a group by numeric gid or name
pub fn get_group_creds(group: &str) -> Result<Group> {
    if let Ok(g) = parse_gid(group) {
        return Ok(g);
    }
    if let Ok(Some(g)) = Group::from_name(group) {
        return Ok(g);
    }
    Err(Error::Invalid {
        what: "invalid group name".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uid() {
        let u = parse_uid("0").unwrap();
        assert_eq!(u.name, "root");

        assert!(parse_uid("").is_err());
        assert!(parse_uid("01").is_err());
        assert!(parse_uid("abc_i").is_err());
    }

    #[test]
    fn test_get_user_creds() {
        let u = get_user_creds("root").unwrap();
        assert_eq!(u.uid.as_raw(), 0);

        let g = get_group_creds("0").unwrap();
        assert_eq!(g.gid.as_raw(), 0);

        assert!(get_user_creds("no-such-user-exists-here").is_err());
    }
}
