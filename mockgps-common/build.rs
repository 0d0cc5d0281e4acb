fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile proto files
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["../proto/mockgps.proto"], &["../proto"])?;

    println!("cargo:rerun-if-changed=../proto/mockgps.proto");
    Ok(())
}
