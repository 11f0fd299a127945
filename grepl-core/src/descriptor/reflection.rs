//! Schema lookup over live server reflection.
//!
//! [`ReflectionSource`] pairs a [`ReflectionClient`] with a [`ResolverCache`]:
//! an append-only mapping from file path to materialized file descriptor,
//! grown as symbols are resolved and shared by every call in the session.
//!
//! The cache is deliberately tolerant. Servers frequently publish proto files
//! whose `import` directives reference annotation libraries absent from the
//! reflection set; those annotations are not needed to invoke methods. Any
//! import that cannot be fetched is materialized as an empty placeholder
//! file, and a file whose own registration still fails (its types reach into
//! a placeholder) is marked partial and skipped. Symbols living in a partial
//! file surface [`LookupError::DependencyUnresolvable`]; everything else
//! keeps working.

use super::{LookupError, Symbol, fully_qualified};
use crate::reflection::client::{FetchedFiles, ReflectionClient};
use crate::BoxError;
use http_body::Body as HttpBody;
use prost_reflect::DescriptorPool;
use prost_types::{DescriptorProto, FileDescriptorProto};
use std::collections::{HashMap, HashSet};
use tonic::client::GrpcService;
use tonic::transport::Channel;
use tracing::debug;

/// A descriptor source backed by the server's reflection service.
pub struct ReflectionSource<S = Channel> {
    client: ReflectionClient<S>,
    cache: ResolverCache,
}

impl<S> ReflectionSource<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(client: ReflectionClient<S>) -> Self {
        Self {
            client,
            cache: ResolverCache::new(),
        }
    }

    /// Lists the services exposed by the server.
    ///
    /// A transport failure whose message indicates a TLS/plaintext mismatch
    /// (in either direction) is surfaced as the distinguished
    /// [`LookupError::TlsHandshakeFailed`] so the operator can fix the
    /// `--tls` flag instead of puzzling over a protocol error.
    pub async fn list_services(&mut self) -> Result<Vec<String>, LookupError> {
        self.client.list_services().await.map_err(|err| {
            if err.status_message().is_some_and(is_tls_mismatch) {
                LookupError::TlsHandshakeFailed
            } else {
                err.into()
            }
        })
    }

    /// Resolves `name` through the cache, fetching its file on a miss.
    ///
    /// When the server cannot answer `FileContainingSymbol` directly (some
    /// implementations fail the request when transitive files are missing),
    /// the fallback walks every listable service, registers whatever resolves,
    /// and re-consults the cache before surfacing the original error.
    pub async fn find_symbol(&mut self, name: &str) -> Result<Symbol, LookupError> {
        if let Some(symbol) = self.cache.lookup(name) {
            return Ok(symbol);
        }

        match self.client.file_containing_symbol(name).await {
            Ok(fetched) => self.cache.merge(fetched),
            Err(original) => {
                debug!(symbol = name, error = %original, "direct fetch failed, walking services");
                let Ok(services) = self.client.list_services().await else {
                    return Err(original.into());
                };
                for service in services {
                    match self.client.file_containing_symbol(&service).await {
                        Ok(fetched) => self.cache.merge(fetched),
                        Err(err) => {
                            debug!(%service, error = %err, "skipping unresolvable service");
                        }
                    }
                }
                if self.cache.lookup(name).is_none() {
                    return Err(original.into());
                }
            }
        }

        self.cache
            .lookup(name)
            .ok_or_else(|| self.cache.unresolved_error(name))
    }

    /// Lists message names across every reachable service: the top-level
    /// messages of each service's file plus the request and response types of
    /// each method. Services whose files cannot be resolved are skipped;
    /// the aggregate is still delivered.
    pub async fn all_messages(&mut self) -> Result<Vec<String>, LookupError> {
        let services = self.list_services().await?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for service in services {
            if !self.cache.has_file_declaring(&service) {
                match self.client.file_containing_symbol(&service).await {
                    Ok(fetched) => self.cache.merge(fetched),
                    Err(err) => {
                        debug!(%service, error = %err, "skipping service in message listing");
                        continue;
                    }
                }
            }
            for name in self.cache.message_listing(&service) {
                if seen.insert(name.clone()) {
                    out.push(name);
                }
            }
        }

        Ok(out)
    }

    /// Clears the resolver cache; subsequent lookups re-fetch from the
    /// server.
    pub fn reset(&mut self) {
        self.cache = ResolverCache::new();
    }
}

/// The append-only descriptor cache behind [`ReflectionSource`].
struct ResolverCache {
    files: HashMap<String, FileDescriptorProto>,
    placeholders: HashSet<String>,
    partial: HashSet<String>,
    registered: HashSet<String>,
    pool: DescriptorPool,
}

impl ResolverCache {
    fn new() -> Self {
        // The global pool ships the google.protobuf well-known types, the
        // standard files servers routinely leave out of their reflection set.
        let pool = DescriptorPool::global();
        let registered = pool.files().map(|f| f.name().to_string()).collect();
        Self {
            files: HashMap::new(),
            placeholders: HashSet::new(),
            partial: HashSet::new(),
            registered,
            pool,
        }
    }

    fn lookup(&self, name: &str) -> Option<Symbol> {
        if let Some(descriptor) = self.pool.get_service_by_name(name) {
            return Some(Symbol::Service(descriptor));
        }
        if let Some(descriptor) = self.pool.get_message_by_name(name) {
            return Some(Symbol::Message(descriptor));
        }
        if let Some(descriptor) = self.pool.get_enum_by_name(name) {
            return Some(Symbol::Enum(descriptor));
        }
        None
    }

    /// Folds fetched files into the cache and registers whatever becomes
    /// registrable, dependencies first.
    fn merge(&mut self, fetched: FetchedFiles) {
        for (name, fd) in fetched.files {
            self.files.entry(name).or_insert(fd);
        }
        for path in fetched.missing {
            self.add_placeholder(path);
        }
        for path in missing_dependencies(&self.files, &self.registered) {
            self.add_placeholder(path);
        }

        for name in registration_order(&self.files) {
            if self.registered.contains(&name) || self.partial.contains(&name) {
                continue;
            }
            let Some(file) = self.files.get(&name) else {
                continue;
            };
            match self.pool.add_file_descriptor_proto(file.clone()) {
                Ok(_) => {
                    self.registered.insert(name);
                }
                Err(err) => {
                    debug!(file = %name, error = %err, "descriptor registration failed");
                    self.partial.insert(name);
                }
            }
        }

        debug!(
            files = self.files.len(),
            registered = self.registered.len(),
            placeholders = self.placeholders.len(),
            partial = self.partial.len(),
            "descriptor cache updated"
        );
    }

    fn add_placeholder(&mut self, path: String) {
        if self.files.contains_key(&path) || self.registered.contains(&path) {
            return;
        }
        debug!(%path, "materializing placeholder for missing import");
        self.files.insert(path.clone(), placeholder_file(&path));
        self.placeholders.insert(path);
    }

    /// The error for a symbol the pool cannot resolve: if some cached file
    /// declares it, its file failed registration and the dependency graph is
    /// to blame; otherwise the symbol simply does not exist.
    fn unresolved_error(&self, name: &str) -> LookupError {
        if self.files.values().any(|fd| declares_symbol(fd, name)) {
            LookupError::DependencyUnresolvable(name.to_string())
        } else {
            LookupError::SymbolNotFound(name.to_string())
        }
    }

    fn has_file_declaring(&self, symbol: &str) -> bool {
        self.files.values().any(|fd| declares_symbol(fd, symbol))
    }

    /// Message names contributed by the file declaring `service`: its
    /// top-level messages plus the service's method input/output types.
    fn message_listing(&self, service: &str) -> Vec<String> {
        let Some(file) = self.files.values().find(|fd| declares_symbol(fd, service)) else {
            return Vec::new();
        };

        let mut names = Vec::new();
        for message in &file.message_type {
            names.push(fully_qualified(file.package(), message.name()));
        }
        for svc in &file.service {
            if fully_qualified(file.package(), svc.name()) != service {
                continue;
            }
            for method in &svc.method {
                names.push(method.input_type().trim_start_matches('.').to_string());
                names.push(method.output_type().trim_start_matches('.').to_string());
            }
        }
        names
    }
}

fn placeholder_file(path: &str) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(path.to_string()),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// Import paths referenced by cached files but neither cached nor already
/// registered.
fn missing_dependencies(
    files: &HashMap<String, FileDescriptorProto>,
    available: &HashSet<String>,
) -> Vec<String> {
    let mut missing = Vec::new();
    for fd in files.values() {
        for dep in &fd.dependency {
            if !files.contains_key(dep) && !available.contains(dep) && !missing.contains(dep) {
                missing.push(dep.clone());
            }
        }
    }
    missing
}

/// File names in dependency-first order, deterministically.
fn registration_order(files: &HashMap<String, FileDescriptorProto>) -> Vec<String> {
    fn visit(
        name: &str,
        files: &HashMap<String, FileDescriptorProto>,
        seen: &mut HashSet<String>,
        out: &mut Vec<String>,
    ) {
        if !seen.insert(name.to_string()) {
            return;
        }
        if let Some(fd) = files.get(name) {
            for dep in &fd.dependency {
                visit(dep, files, seen, out);
            }
            out.push(name.to_string());
        }
    }

    let mut names: Vec<&String> = files.keys().collect();
    names.sort();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        visit(name, files, &mut seen, &mut out);
    }
    out
}

/// Whether `fd` declares `symbol`: one of its services (or their methods),
/// enums, or (possibly nested) messages.
fn declares_symbol(fd: &FileDescriptorProto, symbol: &str) -> bool {
    let Some(rest) = strip_package(symbol, fd.package()) else {
        return false;
    };

    let in_service = fd.service.iter().any(|s| {
        rest == s.name()
            || rest
                .strip_prefix(s.name())
                .is_some_and(|r| r.starts_with('.'))
    });

    in_service
        || fd.enum_type.iter().any(|e| e.name() == rest)
        || message_declares(&fd.message_type, rest)
}

fn strip_package<'a>(symbol: &'a str, package: &str) -> Option<&'a str> {
    if package.is_empty() {
        Some(symbol)
    } else {
        symbol.strip_prefix(package)?.strip_prefix('.')
    }
}

fn message_declares(messages: &[DescriptorProto], rest: &str) -> bool {
    for m in messages {
        if rest == m.name() {
            return true;
        }
        if let Some(sub) = rest.strip_prefix(m.name()).and_then(|r| r.strip_prefix('.'))
            && (m.enum_type.iter().any(|e| e.name() == sub) || message_declares(&m.nested_type, sub))
        {
            return true;
        }
    }
    false
}

/// Detects the two directions of a TLS misconfiguration from a transport
/// error message: a plaintext server answering a TLS-enabled client, or a
/// TLS server answering a plaintext client.
fn is_tls_mismatch(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        // plaintext reply on a channel that expected TLS
        "first record does not look like a tls handshake",
        "received corrupt message",
        "invalid content type",
        // TLS reply on a plaintext channel
        "frame with invalid size",
        "tls handshake eof",
    ];
    let lower = message.to_ascii_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{
        FieldDescriptorProto, ServiceDescriptorProto,
        field_descriptor_proto::{Label, Type},
    };

    fn string_field(name: &str, number: i32) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            r#type: Some(Type::String as i32),
            ..Default::default()
        }
    }

    fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            r#type: Some(Type::Message as i32),
            type_name: Some(type_name.to_string()),
            ..Default::default()
        }
    }

    fn demo_file(dependency: Vec<String>, messages: Vec<DescriptorProto>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("demo/demo.proto".to_string()),
            package: Some("demo".to_string()),
            syntax: Some("proto3".to_string()),
            dependency,
            message_type: messages,
            service: vec![ServiceDescriptorProto {
                name: Some("Demo".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn fetched(files: Vec<FileDescriptorProto>, missing: Vec<&str>) -> FetchedFiles {
        FetchedFiles {
            files: files
                .into_iter()
                .map(|f| (f.name().to_string(), f))
                .collect(),
            missing: missing.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn missing_imports_become_placeholders() {
        let file = demo_file(
            vec!["annotations/options.proto".to_string()],
            vec![DescriptorProto {
                name: Some("Plain".to_string()),
                field: vec![string_field("x", 1)],
                ..Default::default()
            }],
        );

        let mut cache = ResolverCache::new();
        cache.merge(fetched(vec![file], vec![]));

        assert!(cache.placeholders.contains("annotations/options.proto"));
        assert!(cache.lookup("demo.Plain").is_some());
        assert!(cache.lookup("demo.Demo").is_some());
    }

    #[test]
    fn files_reaching_into_placeholders_are_partial() {
        let file = demo_file(
            vec!["ghost/ghost.proto".to_string()],
            vec![DescriptorProto {
                name: Some("Haunted".to_string()),
                field: vec![message_field("spirit", 1, ".ghost.Spirit")],
                ..Default::default()
            }],
        );

        let mut cache = ResolverCache::new();
        cache.merge(fetched(vec![file], vec!["ghost/ghost.proto"]));

        assert!(cache.partial.contains("demo/demo.proto"));
        assert!(cache.lookup("demo.Haunted").is_none());
        assert!(matches!(
            cache.unresolved_error("demo.Haunted"),
            LookupError::DependencyUnresolvable(_)
        ));
        assert!(matches!(
            cache.unresolved_error("demo.NoSuchThing"),
            LookupError::SymbolNotFound(_)
        ));
    }

    #[test]
    fn registration_orders_dependencies_first() {
        let leaf = FileDescriptorProto {
            name: Some("a/leaf.proto".to_string()),
            package: Some("a".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Leaf".to_string()),
                field: vec![string_field("x", 1)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let root = demo_file(
            vec!["a/leaf.proto".to_string()],
            vec![DescriptorProto {
                name: Some("Root".to_string()),
                field: vec![message_field("leaf", 1, ".a.Leaf")],
                ..Default::default()
            }],
        );

        let mut cache = ResolverCache::new();
        // Merge in one batch; registration must sort the dependency first.
        cache.merge(fetched(vec![root, leaf], vec![]));

        assert!(cache.lookup("demo.Root").is_some());
        assert!(cache.lookup("a.Leaf").is_some());
        assert!(cache.partial.is_empty());
    }

    #[test]
    fn declares_symbol_sees_services_methods_and_nested_types() {
        let file = demo_file(
            vec![],
            vec![DescriptorProto {
                name: Some("Outer".to_string()),
                nested_type: vec![DescriptorProto {
                    name: Some("Inner".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        );

        assert!(declares_symbol(&file, "demo.Demo"));
        assert!(declares_symbol(&file, "demo.Demo.SomeMethod"));
        assert!(declares_symbol(&file, "demo.Outer"));
        assert!(declares_symbol(&file, "demo.Outer.Inner"));
        assert!(!declares_symbol(&file, "demo.Absent"));
        assert!(!declares_symbol(&file, "other.Demo"));
    }

    #[test]
    fn tls_mismatch_markers() {
        assert!(is_tls_mismatch(
            "transport error: first record does not look like a TLS handshake"
        ));
        assert!(is_tls_mismatch("received corrupt message of type Handshake"));
        assert!(is_tls_mismatch("http2 error: frame with invalid size"));
        assert!(!is_tls_mismatch("connection refused"));
        assert!(!is_tls_mismatch("deadline exceeded"));
    }
}
