//! Server reflection.
//!
//! Both reflection API versions are served: grpcurl and most current tools
//! speak v1, some older clients only v1alpha. The reflection service always
//! lists itself, so a server without adapters still answers `ListServices`.

use tonic_reflection::server::Builder;

fn builder<'b>(file_descriptor_sets: &[&'b [u8]]) -> Builder<'b> {
    // the reflection service's own descriptor is included by the builder
    let mut builder = Builder::configure();

    for fds in file_descriptor_sets {
        builder = builder.register_encoded_file_descriptor_set(fds);
    }

    builder
}

/// v1 reflection service over the given encoded file descriptor sets.
pub fn reflection_service(
    file_descriptor_sets: &[&[u8]],
) -> Result<
    tonic_reflection::server::ServerReflectionServer<
        impl tonic_reflection::server::ServerReflection,
    >,
    tonic_reflection::server::Error,
> {
    builder(file_descriptor_sets).build_v1()
}

/// v1alpha reflection service for legacy clients.
pub fn reflection_service_v1alpha(
    file_descriptor_sets: &[&[u8]],
) -> Result<
    tonic_reflection::server::v1alpha::ServerReflectionServer<
        impl tonic_reflection::server::v1alpha::ServerReflection,
    >,
    tonic_reflection::server::Error,
> {
    builder(file_descriptor_sets).build_v1alpha()
}
