fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::configure().compile_protos(
        &["proto/metric.proto", "proto/health.proto"],
        &["proto"],
    )?;
    Ok(())
}
