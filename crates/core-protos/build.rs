// Uses protox (pure Rust protobuf compiler) so the workspace never needs an
// external protoc binary on the build machine.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/core.proto");

    let file_descriptors = protox::compile(["proto/core.proto"], ["proto"])?;
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(file_descriptors)?;
    Ok(())
}
