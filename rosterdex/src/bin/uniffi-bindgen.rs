//! UniFFI bindgen entry point for generating foreign-language bindings.
//!
//! Run: cargo run --bin uniffi-bindgen generate --library target/release/librosterdex.dylib --language swift --out-dir generated

fn main() {
    uniffi::uniffi_bindgen_main()
}
