// Build script for the metronome core
//
// flutter_rust_bridge bindings are generated out of band:
//   flutter_rust_bridge_codegen generate
//
// The only thing the build needs to do itself is link the C++ runtime Oboe
// depends on when targeting Android.

fn main() {
    println!("cargo:rerun-if-changed=src/api.rs");

    // Android builds link against libc++_shared so symbols like
    // __cxa_pure_virtual resolve correctly on all ABIs (arm/x86).
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
