// Build script: embeds programs/*.dl into the builtin registry and sets up
// linking for the Node.js N-API addon.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=programs");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let programs_dir = manifest_dir.join("programs");

    let mut programs: Vec<(String, PathBuf)> = Vec::new();
    if let Ok(entries) = fs::read_dir(&programs_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("dl") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                println!("cargo:rerun-if-changed={}", path.display());
                programs.push((stem.to_string(), path.clone()));
            }
        }
    }
    programs.sort();

    let mut table = String::from("pub(crate) const BUILTIN_PROGRAMS: &[(&str, &str)] = &[\n");
    for (name, path) in &programs {
        table.push_str(&format!(
            "    ({:?}, include_str!({:?})),\n",
            name,
            path.display().to_string()
        ));
    }
    table.push_str("];\n");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("builtin_programs.rs"), table).unwrap();

    // napi feature needs special link settings
    #[cfg(feature = "napi")]
    {
        // macOS: allow undefined symbols, Node.js provides them at runtime
        if cfg!(target_os = "macos") {
            println!("cargo:rustc-cdylib-link-arg=-undefined");
            println!("cargo:rustc-cdylib-link-arg=dynamic_lookup");
        }

        if cfg!(target_os = "linux") {
            println!("cargo:rustc-cdylib-link-arg=-Wl,--unresolved-symbols=ignore-all");
        }
    }
}
