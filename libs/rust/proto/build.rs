use sha2::{Digest, Sha256};
use std::path::PathBuf;
use walkdir::WalkDir;

const PROTO_DIR: &str = "proto";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed={PROTO_DIR}");

    let mut protos: Vec<PathBuf> = WalkDir::new(PROTO_DIR)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "proto"))
        .map(|e| e.into_path())
        .collect();
    // Stable ordering for hashing
    protos.sort();

    // The digest covers exactly the files compiled below, names included.
    let mut digest = Sha256::new();
    for path in &protos {
        digest.update(path.to_string_lossy().as_bytes());
        digest.update(std::fs::read(path)?);
    }
    println!("cargo:rustc-env=PROTO_SCHEMA_VERSION={:x}", digest.finalize());

    // Vendored protoc so builds do not depend on a system install; its include
    // dir provides google/protobuf/wrappers.proto.
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    let mut prost_config = prost_build::Config::new();
    prost_config.btree_map([".tensorflow.serving.ModelConfig.version_labels"]);
    let includes = [PathBuf::from(PROTO_DIR), protoc_bin_vendored::include_path()?];

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_with_config(prost_config, &protos, &includes)?;
    Ok(())
}
