/// Builds the gRPC client and server code for `nanabush/v1/translation.proto`
/// using `tonic-prost-build`.
///
/// The generated module is emitted into `OUT_DIR` together with an encoded
/// file descriptor set, which the server registers with `tonic-reflection` so
/// tools like `grpcurl` can discover the service.
///
/// # Files and Paths
///
/// - Proto file: `proto/nanabush/v1/translation.proto`
/// - Includes: `proto/`
///
/// # Panics
///
/// Panics if code generation fails (for example when `protoc` is missing).
///
/// # Output
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("nanabush.v1");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("nanabush_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(
            config,
            &["proto/nanabush/v1/translation.proto"],
            &["proto"],
        )
        .unwrap();
}
