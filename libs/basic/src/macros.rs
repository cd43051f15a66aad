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

//! common macros

/// IN_SET
#[macro_export]
macro_rules! IN_SET {
    ($ov:expr, $($nv:expr),+) => {
        {
            let mut found = false;
            $(
                if $ov == $nv {
                    found = true;
                }
            )+

            found
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_in_set() {
        assert!(IN_SET!(1, 1, 2, 3));
        assert!(!IN_SET!(4, 1, 2, 3));
    }
}
