// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for VirtualPath parsing and manipulation

#![no_main]

use libfuzzer_sys::fuzz_target;
use cfk_core::path::VirtualPath;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let vpath = VirtualPath::new(input);

        let _ = vpath.to_path_string();
        let _ = vpath.name();
        let _ = vpath.extension();
        let _ = vpath.parent();
        let _ = vpath.is_root();
        let _ = vpath.depth();

        if input.len() > 10 {
            let other = VirtualPath::new(&input[..10]);
            let _ = vpath.is_sub_path_of(&other);
            let _ = vpath.join(&input[..10]);
        }
    }
});
