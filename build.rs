use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_dir = PathBuf::from("proto");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/");

    // The server and the admin CLI share the generated code
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&[proto_dir.join("authguard/v1/limiter.proto")], &[&proto_dir])?;

    Ok(())
}
