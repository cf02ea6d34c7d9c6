use std::env;
use std::path::{Path, PathBuf};

const WATCHED_VARIABLES: [&str; 5] = [
    "FFMPEG_DIR",
    "FFMPEG_PKG_CONFIG_PATH",
    "VCPKG_ROOT",
    "VCPKGRS_DYNAMIC",
    "VCPKGRS_TRIPLET",
];

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // ffmpeg-sys-next finds FFmpeg through pkg-config everywhere but
    // Windows, where discovery usually needs FFMPEG_DIR.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    match env::var("VCPKG_ROOT") {
        Ok(vcpkg_root) => report_vcpkg_install(Path::new(&vcpkg_root)),
        Err(_) => println!(
            "cargo:warning=FFMPEG_DIR is not set. Install FFmpeg (for example via vcpkg) and point FFMPEG_DIR at it to build rtsp-timeout-probe on Windows."
        ),
    }
}

fn report_vcpkg_install(vcpkg_root: &Path) {
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let ffmpeg_dir: PathBuf = vcpkg_root.join("installed").join(&triplet);

    if !ffmpeg_dir.exists() {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} does not exist. Run `vcpkg install ffmpeg[core,avformat,avcodec,swscale]:{triplet}`.",
            ffmpeg_dir.display(),
        );
        return;
    }

    println!(
        "cargo:warning=Found vcpkg FFmpeg at {}. Set FFMPEG_DIR to that path to make discovery explicit.",
        ffmpeg_dir.display(),
    );
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!("cargo:warning=Set VCPKGRS_DYNAMIC=1 when linking a dynamic vcpkg FFmpeg build.");
    }
}
