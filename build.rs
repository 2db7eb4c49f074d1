// build.rs

use std::env;

fn main() {
    let version = env::var("CHATRELAY_VERSION")
        .unwrap_or_else(|_| env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "dev".to_string()));

    println!("cargo:rustc-env=CHATRELAY_BUILD_VERSION={version}");
    println!("cargo:rerun-if-env-changed=CHATRELAY_VERSION");
}
