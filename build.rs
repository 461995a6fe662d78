use std::{env, path::PathBuf};

static HEADER_PATH: &str = "include/binding.h";
static CBINDGEN_CONFIG: &str = "cbindgen.toml";

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    println!("cargo:rerun-if-changed=src/wire");
    println!("cargo:rerun-if-changed={}", CBINDGEN_CONFIG);

    // The checked-in header is authoritative; only rewrite it on request.
    #[cfg(feature = "regenerate-header")]
    regenerate_header(&manifest_dir);
    #[cfg(not(feature = "regenerate-header"))]
    assert!(
        manifest_dir.join(HEADER_PATH).is_file(),
        "{} not found; build with --features regenerate-header",
        HEADER_PATH
    );
}

#[cfg(feature = "regenerate-header")]
fn regenerate_header(manifest_dir: &std::path::Path) {
    let config = cbindgen::Config::from_file(manifest_dir.join(CBINDGEN_CONFIG))
        .expect("Reading cbindgen.toml failed");

    cbindgen::Builder::new()
        .with_config(config)
        .with_crate(manifest_dir)
        .generate()
        .expect("Unable to generate C header")
        .write_to_file(manifest_dir.join(HEADER_PATH));
}
