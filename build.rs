// build.rs

fn main() {
    // Build timestamp, rustc toolchain and git commit for `--version`
    vergen::EmitBuilder::builder()
        .all_build()
        .all_rustc()
        .all_git()
        .emit()
        .expect("Unable to generate build info");
}
