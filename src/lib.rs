// Practice Metronome Core - Rust click engine
// Blocking-write paced metronome with swappable audio sinks

// Module declarations
pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;

// Re-exports for convenience
pub use api::*;
pub use engine::MetronomeController;

/// Install the global tracing subscriber. Safe to call more than once.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    match tracing_android::layer("PracticeMetronome") {
        Ok(layer) => {
            let _ = tracing_subscriber::registry().with(layer).try_init();
        }
        Err(err) => eprintln!("PracticeMetronome: logcat unavailable: {}", err),
    }
}

/// Install the global tracing subscriber. Safe to call more than once.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .try_init();
}

/// JNI_OnLoad is called when the native library is loaded by Android
/// This function initializes the Android context required by oboe-rs
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();

    tracing::info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: the runtime keeps the VM alive for the life of the process.
    // Output streams need only the VM, so no application context is passed.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer() as *mut std::ffi::c_void,
            std::ptr::null_mut(),
        );
    }

    tracing::info!("Android context initialized successfully");

    jni::sys::JNI_VERSION_1_6
}

/// Library version as reported to hosts.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
