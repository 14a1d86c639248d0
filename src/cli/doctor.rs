//! Environment readiness check.

use crate::feed::chromium::find_chromium;
use anyhow::Result;

/// Check Chromium availability and output-directory writability.
pub async fn run() -> Result<()> {
    println!("Dredge Doctor");
    println!("=============");
    println!();

    // OS and architecture
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    // Check Chromium
    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install google-chrome or set DREDGE_CHROMIUM_PATH."
        ),
    }

    // Check the working directory is writable (default artifact target)
    let out_dir = std::env::current_dir()?;
    let probe = out_dir.join(".dredge-doctor-probe");
    let writable = std::fs::write(&probe, b"ok").is_ok();
    if writable {
        let _ = std::fs::remove_file(&probe);
        println!("[OK] Output directory {} is writable", out_dir.display());
    } else {
        println!("[!!] Output directory {} is NOT writable", out_dir.display());
    }

    println!();
    if chromium_path.is_some() && writable {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        if chromium_path.is_none() {
            println!("  Live harvests need a browser; `dredge simulate` works without one.");
        }
    }

    Ok(())
}
