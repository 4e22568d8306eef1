fn main() {
    println!("cargo:rerun-if-env-changed=OSVR_CLIENTKIT_LIB_DIR");

    if std::env::var_os("CARGO_FEATURE_CLIENTKIT").is_none() {
        return;
    }

    if let Ok(dir) = std::env::var("OSVR_CLIENTKIT_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }
}
