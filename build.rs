//! Build script: embeds the git short hash and checks GPU toolkits.
//!
//! whisper-rs-sys fails late and noisily when a GPU toolkit is missing, so the
//! accelerated feature flags are checked up front.

use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") {
        require_tool("nvcc", &["--version"], "CUDA toolkit", "https://developer.nvidia.com/cuda-downloads");
    }
    if cfg!(feature = "vulkan") {
        require_tool("vulkaninfo", &["--summary"], "Vulkan SDK", "https://vulkan.lunarg.com/");
    }
}

fn require_tool(tool: &str, args: &[&str], toolkit: &str, url: &str) {
    let found = Command::new(tool)
        .args(args)
        .output()
        .is_ok_and(|out| out.status.success());

    if !found {
        panic!(
            "\n\n`{tool}` not found: {toolkit} is not installed.\n\
             Install: {url}\n\
             Or build without GPU support: cargo build --release\n"
        );
    }
    println!("cargo::warning={toolkit} detected");
}
