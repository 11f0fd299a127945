//! Descriptor-source behaviour over the file backend.

mod support;

use grepl_core::descriptor::{DescriptorSource, FileSource, LookupError, Symbol};
use support::descriptor_set_bytes;

fn source() -> DescriptorSource {
    DescriptorSource::Files(FileSource::from_bytes(&descriptor_set_bytes()).unwrap())
}

#[tokio::test]
async fn lists_services_across_packages() {
    let mut source = source();
    let services = source.list_services().await.unwrap();
    assert_eq!(services, ["api.Example", "Standalone"]);
}

#[tokio::test]
async fn finds_services_messages_and_enums() {
    let mut source = source();

    assert!(matches!(
        source.find_symbol("api.Example").await.unwrap(),
        Symbol::Service(_)
    ));
    assert!(matches!(
        source.find_symbol("api.SimpleRequest").await.unwrap(),
        Symbol::Message(_)
    ));
    assert!(matches!(
        source.find_symbol("api.Color").await.unwrap(),
        Symbol::Enum(_)
    ));
    assert!(matches!(
        source.find_symbol("api.Missing").await.unwrap_err(),
        LookupError::SymbolNotFound(_)
    ));
}

#[tokio::test]
async fn resolves_methods_by_service_and_name() {
    let mut source = source();

    let method = source.find_method("api.Example", "BidiStreaming").await.unwrap();
    assert!(method.is_client_streaming());
    assert!(method.is_server_streaming());
    assert_eq!(method.input().full_name(), "api.SimpleRequest");

    assert!(matches!(
        source.find_method("api.Example", "Nope").await.unwrap_err(),
        LookupError::SymbolNotFound(_)
    ));
    assert!(matches!(
        source.find_method("api.Nope", "Unary").await.unwrap_err(),
        LookupError::SymbolNotFound(_)
    ));
}

#[tokio::test]
async fn every_selected_service_resolves_by_full_name() {
    let mut source = source();
    for service in source.list_services().await.unwrap() {
        assert!(
            source.find_symbol(&service).await.is_ok(),
            "service {service} did not resolve"
        );
    }
}

#[tokio::test]
async fn message_listing_covers_all_method_io_types() {
    let mut source = source();
    let messages = source.all_messages().await.unwrap();

    for service in source.list_services().await.unwrap() {
        let Symbol::Service(descriptor) = source.find_symbol(&service).await.unwrap() else {
            panic!("{service} is not a service");
        };
        for method in descriptor.methods() {
            assert!(
                messages.contains(&method.input().full_name().to_string()),
                "missing request type of {}",
                method.full_name()
            );
            assert!(
                messages.contains(&method.output().full_name().to_string()),
                "missing response type of {}",
                method.full_name()
            );
        }
    }
}

#[tokio::test]
async fn message_listing_skips_synthetic_map_entries() {
    let mut source = source();
    let messages = source.all_messages().await.unwrap();
    assert!(messages.iter().all(|m| !m.ends_with("AttrsEntry")));
}
