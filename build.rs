fn main() {
    // Only link libiio when the real hardware backend is compiled in
    if std::env::var("CARGO_FEATURE_LIBIIO").is_ok() {
        println!("cargo:rustc-link-lib=iio");
    }
}
