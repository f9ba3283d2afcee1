fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }
    tonic_build::configure()
        .build_client(false)
        .compile_protos(
            &["proto/counter.proto", "proto/stats.proto"],
            &["proto"],
        )?;
    Ok(())
}
