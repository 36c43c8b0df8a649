// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates `memory.x` for the linker. The flash origin sits past the
//! S140 SoftDevice image and the RAM origin past the SoftDevice's static
//! allocation, so the application never overlaps the stack's memory.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());

    /* S140 7.3.0 occupies flash up to 0x27000. The RAM reservation was
     * read back from sd_ble_enable at our configuration (1 connection,
     * 247-byte ATT MTU). */
    let memory_x_content = r##"
        MEMORY
        {
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            FLASH (rx) : ORIGIN = 0x00027000, LENGTH = 1024K - 0x27000
            RAM : ORIGIN = 0x20004000, LENGTH = 256K - 0x4000
        }
        "##;

    File::create(out.join("./memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();

    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
