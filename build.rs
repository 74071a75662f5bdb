fn main() {
    // Writes `built.rs` into OUT_DIR with package and git metadata.
    if let Err(err) = built::write_built_file() {
        panic!("Failed to acquire build-time information: {err}");
    }
}
