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
use basic::fs::parse_absolute_path;
use bitflags::bitflags;
use serde::{
    de::{self, Unexpected},
    Deserialize, Deserializer, Serialize,
};

bitflags! {
    /// ExecCommand Flags
    #[derive(Serialize, Deserialize)]
    pub struct ExecFlag: u8 {
        ///
        const EXEC_COMMAND_EMPTY = 0;
        /// a failing exit status does not fail the phase
        const EXEC_COMMAND_IGNORE_FAILURE   = 1 << 0;
        ///
        const EXEC_COMMAND_FULLY_PRIVILEGED = 1 << 1;
        ///
        const EXEC_COMMAND_NO_SETUID        = 1 << 2;
        ///
        const EXEC_COMMAND_AMBIENT_MAGIC    = 1 << 3;
        ///
        const EXEC_COMMAND_NO_ENV_EXPAND    = 1 << 4;
    }
}

/// one exec step parsed from the unit file
#[derive(PartialEq, Clone, Eq, Debug, Serialize, Deserialize)]
pub struct ExecCommand {
    path: String,
    argv: Vec<String>,
    flags: ExecFlag,
}

impl ExecCommand {
    /// create a new instance of the command
    pub fn new(path: String, argv: Vec<String>) -> ExecCommand {
        ExecCommand {
            path,
            argv,
            flags: ExecFlag::EXEC_COMMAND_EMPTY,
        }
    }

    ///
    pub fn add_exec_flag(&mut self, flag: ExecFlag) {
        self.flags |= flag;
    }

    ///
    pub fn get_exec_flag(&self) -> ExecFlag {
        self.flags
    }

    /// return the path of the command
    pub fn path(&self) -> &String {
        &self.path
    }

    /// return the arguments of the command
    pub fn argv(&self) -> Vec<&String> {
        self.argv.iter().collect::<Vec<_>>()
    }
}

/// parse one configuration string into the commands it describes
pub fn parse_exec_command(s: &str) -> Result<Vec<ExecCommand>> {
    match parse_exec(s) {
        Ok(v) => Ok(v),
        Err(e) => {
            log::error!("Failed to parse ExecCommand '{}': {}", s, e);
            Err(e)
        }
    }
}

fn parse_prefixes(word: &str) -> (ExecFlag, &str) {
    let mut flags = ExecFlag::EXEC_COMMAND_EMPTY;
    let mut separate_argv0 = false;
    let mut rest = word;

    loop {
        rest = match rest.as_bytes().first() {
            Some(b'-') if !flags.intersects(ExecFlag::EXEC_COMMAND_IGNORE_FAILURE) => {
                flags |= ExecFlag::EXEC_COMMAND_IGNORE_FAILURE;
                &rest[1..]
            }
            Some(b'@') if !separate_argv0 => {
                separate_argv0 = true;
                &rest[1..]
            }
            Some(b':') if !flags.intersects(ExecFlag::EXEC_COMMAND_NO_ENV_EXPAND) => {
                flags |= ExecFlag::EXEC_COMMAND_NO_ENV_EXPAND;
                &rest[1..]
            }
            Some(b'+')
                if !flags.intersects(
                    ExecFlag::EXEC_COMMAND_FULLY_PRIVILEGED
                        | ExecFlag::EXEC_COMMAND_NO_SETUID
                        | ExecFlag::EXEC_COMMAND_AMBIENT_MAGIC,
                ) =>
            {
                flags |= ExecFlag::EXEC_COMMAND_FULLY_PRIVILEGED;
                &rest[1..]
            }
            Some(b'!')
                if !flags.intersects(
                    ExecFlag::EXEC_COMMAND_FULLY_PRIVILEGED | ExecFlag::EXEC_COMMAND_AMBIENT_MAGIC,
                ) =>
            {
                if flags.intersects(ExecFlag::EXEC_COMMAND_NO_SETUID) {
                    flags &= !ExecFlag::EXEC_COMMAND_NO_SETUID;
                    flags |= ExecFlag::EXEC_COMMAND_AMBIENT_MAGIC;
                } else {
                    flags |= ExecFlag::EXEC_COMMAND_NO_SETUID;
                }
                &rest[1..]
            }
            _ => break,
        };
    }

    (flags, rest)
}

/// Split one argv string into words. Single quotes group words, a bare
/// " ; " separates commands, "\;" is a literal semicolon argument.
fn split_argv(s: &str) -> Result<(Vec<String>, Option<usize>)> {
    let mut argv = Vec::new();
    let mut cur = String::new();
    let mut in_quote = false;

    let mut consumed = 0;
    for word in s.split(' ') {
        consumed += word.len() + 1;

        if !in_quote && word == ";" {
            return Ok((argv, Some(consumed)));
        }

        let word = if !in_quote && word == "\\;" { ";" } else { word };

        if in_quote {
            cur.push(' ');
            if let Some(stripped) = word.strip_suffix('\'') {
                cur.push_str(stripped);
                argv.push(std::mem::take(&mut cur));
                in_quote = false;
            } else {
                cur.push_str(word);
            }
            continue;
        }

        if let Some(stripped) = word.strip_prefix('\'') {
            if let Some(inner) = stripped.strip_suffix('\'') {
                if !inner.is_empty() || stripped.len() >= 2 {
                    argv.push(inner.to_string());
                    continue;
                }
            }
            cur = stripped.to_string();
            in_quote = true;
            continue;
        }

        if !word.is_empty() {
            argv.push(word.to_string());
        }
    }

    if in_quote {
        return Err(Error::ConfigureError {
            msg: "unterminated single quote in exec command".to_string(),
        });
    }

    Ok((argv, None))
}

fn parse_exec(s: &str) -> Result<Vec<ExecCommand>> {
    let mut res = Vec::new();
    let mut rest = s.trim_start_matches(' ');

    while !rest.is_empty() {
        let (flags, after_prefix) = parse_prefixes(rest);

        let (path_str, args_str) = match after_prefix.split_once(' ') {
            None => (after_prefix, ""),
            Some((p, a)) => (p, a),
        };

        let path = parse_absolute_path(path_str).map_err(|e| Error::ConfigureError {
            msg: format!("invalid exec path '{}': {}", path_str, e),
        })?;

        let (argv, next) = split_argv(args_str)?;

        res.push(ExecCommand { path, argv, flags });

        rest = match next {
            None => "",
            Some(offset) => args_str.get(offset..).unwrap_or("").trim_start_matches(' '),
        };
    }

    if res.is_empty() {
        return Err(Error::ConfigureError {
            msg: "no valid exec command".to_string(),
        });
    }

    Ok(res)
}

impl DeserializeWith for ExecCommand {
    type Item = Vec<Self>;
    fn deserialize_with<'de, D>(de: D) -> std::result::Result<Self::Item, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(de)?;
        match parse_exec(&s) {
            Ok(v) => Ok(v),
            Err(_) => Err(de::Error::invalid_value(Unexpected::Str(&s), &"exec command")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(path: &str, argv: &[&str], flags: ExecFlag) -> ExecCommand {
        ExecCommand {
            path: path.to_string(),
            argv: argv.iter().map(|v| v.to_string()).collect(),
            flags,
        }
    }

    #[test]
    fn test_parse_exec_single() {
        assert_eq!(
            parse_exec("/bin/echo").unwrap(),
            vec![cmd("/bin/echo", &[], ExecFlag::EXEC_COMMAND_EMPTY)]
        );

        assert_eq!(
            parse_exec("/bin/echo good1 good2").unwrap(),
            vec![cmd(
                "/bin/echo",
                &["good1", "good2"],
                ExecFlag::EXEC_COMMAND_EMPTY
            )]
        );
    }

    #[test]
    fn test_parse_exec_prefixes() {
        assert_eq!(
            parse_exec("-/bin/true").unwrap(),
            vec![cmd("/bin/true", &[], ExecFlag::EXEC_COMMAND_IGNORE_FAILURE)]
        );

        assert_eq!(
            parse_exec("!!/bin/echo").unwrap(),
            vec![cmd("/bin/echo", &[], ExecFlag::EXEC_COMMAND_AMBIENT_MAGIC)]
        );

        assert_eq!(
            parse_exec("-!/bin/echo").unwrap(),
            vec![cmd(
                "/bin/echo",
                &[],
                ExecFlag::EXEC_COMMAND_IGNORE_FAILURE | ExecFlag::EXEC_COMMAND_NO_SETUID
            )]
        );
    }

    #[test]
    fn test_parse_exec_quoting() {
        assert_eq!(
            parse_exec("/bin/echo 'good good1' good2").unwrap(),
            vec![cmd(
                "/bin/echo",
                &["good good1", "good2"],
                ExecFlag::EXEC_COMMAND_EMPTY
            )]
        );

        assert!(parse_exec("/bin/echo 'good").is_err());
    }

    #[test]
    fn test_parse_exec_chain() {
        assert_eq!(
            parse_exec("/bin/echo good ; /bin/echo good1 good2 ; /bin/echo").unwrap(),
            vec![
                cmd("/bin/echo", &["good"], ExecFlag::EXEC_COMMAND_EMPTY),
                cmd(
                    "/bin/echo",
                    &["good1", "good2"],
                    ExecFlag::EXEC_COMMAND_EMPTY
                ),
                cmd("/bin/echo", &[], ExecFlag::EXEC_COMMAND_EMPTY),
            ]
        );

        assert_eq!(
            parse_exec("/bin/echo \\;").unwrap(),
            vec![cmd("/bin/echo", &[";"], ExecFlag::EXEC_COMMAND_EMPTY)]
        );
    }

    #[test]
    fn test_parse_exec_errors() {
        assert!(parse_exec("echo good").is_err());
        assert!(parse_exec("").is_err());

        let long = "/a/".to_string() + &String::from_iter(vec!['1'; 256]);
        assert!(parse_exec(&long).is_err());
    }
}
