//! REPL session state.
//!
//! A [`Session`] is a plain owned value threaded through the command
//! handlers: the selected package and service, the metadata header bag, and
//! the presenter choice. It never talks to the network; callers pass in the
//! current service list when selections need validating.

use crate::descriptor::fully_qualified;

/// The header every session starts with, identifying this client to servers.
pub const CLIENT_HEADER_KEY: &str = "grpc-client";
const CLIENT_HEADER_VALUE: &str = "grepl";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no loaded service belongs to package '{0}'")]
    PackageUnknown(String),

    #[error("service '{0}' is unknown in the current scope")]
    ServiceUnknown(String),

    #[error("header key '{0}' is invalid: keys may contain only [A-Za-z0-9._-]")]
    HeaderKeyInvalid(String),

    #[error("header value '{0}' is invalid: values must be printable ASCII")]
    HeaderValueInvalid(String),
}

/// How call responses are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentFormat {
    /// Response body only.
    #[default]
    Plain,
    /// Response body plus received headers and trailers.
    Enriched,
}

/// Mutable state of one REPL run.
#[derive(Debug)]
pub struct Session {
    selected_package: Option<String>,
    selected_service: Option<String>,
    headers: Vec<(String, Vec<String>)>,
    present: PresentFormat,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            selected_package: None,
            selected_service: None,
            headers: vec![(
                CLIENT_HEADER_KEY.to_string(),
                vec![CLIENT_HEADER_VALUE.to_string()],
            )],
            present: PresentFormat::default(),
        }
    }

    pub fn selected_package(&self) -> Option<&str> {
        self.selected_package.as_deref()
    }

    pub fn selected_service(&self) -> Option<&str> {
        self.selected_service.as_deref()
    }

    /// The fully-qualified name of the selected service, if any.
    pub fn service_full_name(&self) -> Option<String> {
        let service = self.selected_service.as_deref()?;
        let package = self.selected_package.as_deref().unwrap_or("");
        Some(fully_qualified(package, service))
    }

    pub fn present(&self) -> PresentFormat {
        self.present
    }

    pub fn set_present(&mut self, format: PresentFormat) {
        self.present = format;
    }

    /// Selects the default package.
    ///
    /// Fails unless at least one service in `services` resides in `name`
    /// (the empty package is legal). The selected service survives the
    /// change if the new scope still contains it, and is cleared otherwise.
    pub fn use_package(&mut self, name: &str, services: &[String]) -> Result<(), SessionError> {
        let known = services
            .iter()
            .any(|s| package_of(s) == name);
        if !known {
            return Err(SessionError::PackageUnknown(name.to_string()));
        }

        if let Some(service) = &self.selected_service {
            let qualified = fully_qualified(name, service);
            if !services.contains(&qualified) {
                self.selected_service = None;
            }
        }
        self.selected_package = Some(name.to_string());
        Ok(())
    }

    /// Selects the default service.
    ///
    /// `name` may be fully-qualified (which also selects its package) or
    /// simple. A simple name is first qualified with the selected package;
    /// failing that, it is accepted when it is unambiguous across all
    /// packages.
    pub fn use_service(&mut self, name: &str, services: &[String]) -> Result<(), SessionError> {
        if name.contains('.') {
            if !services.iter().any(|s| s == name) {
                return Err(SessionError::ServiceUnknown(name.to_string()));
            }
            let (package, simple) = name.rsplit_once('.').unwrap_or(("", name));
            self.selected_package = Some(package.to_string());
            self.selected_service = Some(simple.to_string());
            return Ok(());
        }

        let package = self.selected_package.as_deref().unwrap_or("");
        let qualified = fully_qualified(package, name);
        if services.contains(&qualified) {
            self.selected_service = Some(name.to_string());
            return Ok(());
        }

        let mut matches = services.iter().filter(|s| simple_name(s) == name);
        match (matches.next(), matches.next()) {
            (Some(full), None) => {
                self.selected_package = Some(package_of(full).to_string());
                self.selected_service = Some(name.to_string());
                Ok(())
            }
            _ => Err(SessionError::ServiceUnknown(name.to_string())),
        }
    }

    /// Adds or removes metadata headers.
    ///
    /// Each token is `key=value` (values split on commas unless `raw`) or a
    /// bare `key`, which removes the key entirely. Keys are
    /// case-insensitive. Nothing is applied unless every token validates.
    pub fn add_headers(&mut self, tokens: &[String], raw: bool) -> Result<(), SessionError> {
        enum Op {
            Append(String, Vec<String>),
            Remove(String),
        }

        let mut ops = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) => {
                    let key = validate_key(key)?;
                    let values: Vec<String> = if raw {
                        vec![value.to_string()]
                    } else {
                        value.split(',').map(str::to_string).collect()
                    };
                    for v in &values {
                        if !v.chars().all(|c| (' '..='~').contains(&c)) {
                            return Err(SessionError::HeaderValueInvalid(v.clone()));
                        }
                    }
                    ops.push(Op::Append(key, values));
                }
                None => {
                    ops.push(Op::Remove(validate_key(token)?));
                }
            }
        }

        for op in ops {
            match op {
                Op::Append(key, values) => match self.headers.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => existing.extend(values),
                    None => self.headers.push((key, values)),
                },
                Op::Remove(key) => self.headers.retain(|(k, _)| *k != key),
            }
        }
        Ok(())
    }

    /// The header bag, in insertion order.
    pub fn headers(&self) -> &[(String, Vec<String>)] {
        &self.headers
    }

    /// A flat snapshot of the header bag taken at dispatch time; later
    /// mutations do not affect an in-flight call.
    pub fn headers_for_call(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.clone(), v.clone())))
            .collect()
    }
}

fn validate_key(key: &str) -> Result<String, SessionError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(SessionError::HeaderKeyInvalid(key.to_string()));
    }
    Ok(key.to_ascii_lowercase())
}

/// The package part of a fully-qualified service name (may be empty).
pub fn package_of(full_name: &str) -> &str {
    full_name.rsplit_once('.').map(|(p, _)| p).unwrap_or("")
}

fn simple_name(full_name: &str) -> &str {
    full_name.rsplit_once('.').map(|(_, n)| n).unwrap_or(full_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> Vec<String> {
        vec![
            "api.Example".to_string(),
            "api.Other".to_string(),
            "internal.Example".to_string(),
            "Standalone".to_string(),
        ]
    }

    #[test]
    fn use_package_validates_scope() {
        let mut session = Session::new();
        assert!(session.use_package("api", &services()).is_ok());
        assert_eq!(session.selected_package(), Some("api"));

        let err = session.use_package("nope", &services()).unwrap_err();
        assert!(matches!(err, SessionError::PackageUnknown(_)));
    }

    #[test]
    fn use_package_keeps_service_when_still_in_scope() {
        let mut session = Session::new();
        session.use_package("api", &services()).unwrap();
        session.use_service("Example", &services()).unwrap();

        session.use_package("internal", &services()).unwrap();
        assert_eq!(session.selected_service(), Some("Example"));

        session.use_package("api", &services()).unwrap();
        session.use_service("Other", &services()).unwrap();
        session.use_package("internal", &services()).unwrap();
        assert_eq!(session.selected_service(), None);
    }

    #[test]
    fn use_service_accepts_fully_qualified_names() {
        let mut session = Session::new();
        session.use_service("internal.Example", &services()).unwrap();
        assert_eq!(session.selected_package(), Some("internal"));
        assert_eq!(session.service_full_name().unwrap(), "internal.Example");
    }

    #[test]
    fn use_service_resolves_unambiguous_simple_names() {
        let mut session = Session::new();
        session.use_service("Other", &services()).unwrap();
        assert_eq!(session.service_full_name().unwrap(), "api.Other");

        // "Example" exists in two packages.
        let mut session = Session::new();
        let err = session.use_service("Example", &services()).unwrap_err();
        assert!(matches!(err, SessionError::ServiceUnknown(_)));
    }

    #[test]
    fn use_service_supports_the_empty_package() {
        let mut session = Session::new();
        session.use_service("Standalone", &services()).unwrap();
        assert_eq!(session.service_full_name().unwrap(), "Standalone");
    }

    #[test]
    fn headers_append_and_remove() {
        let mut session = Session::new();
        session
            .add_headers(&["touma=youko".to_string()], false)
            .unwrap();
        session
            .add_headers(&["touma=kazusa".to_string()], false)
            .unwrap();
        let bag = session.headers();
        let touma = bag.iter().find(|(k, _)| k == "touma").unwrap();
        assert_eq!(touma.1, vec!["youko", "kazusa"]);

        session.add_headers(&["touma".to_string()], false).unwrap();
        assert!(session.headers().iter().all(|(k, _)| k != "touma"));
    }

    #[test]
    fn headers_split_commas_unless_raw() {
        let mut session = Session::new();
        session
            .add_headers(&["touma=youko,kazusa".to_string()], false)
            .unwrap();
        assert_eq!(
            session.headers().iter().find(|(k, _)| k == "touma").unwrap().1,
            vec!["youko", "kazusa"]
        );

        let mut session = Session::new();
        session
            .add_headers(&["touma=youko,kazusa".to_string()], true)
            .unwrap();
        assert_eq!(
            session.headers().iter().find(|(k, _)| k == "touma").unwrap().1,
            vec!["youko,kazusa"]
        );
    }

    #[test]
    fn invalid_keys_leave_the_bag_unchanged() {
        let mut session = Session::new();
        let before = session.headers().to_vec();
        let err = session
            .add_headers(&["ok=fine".to_string(), "sh!nonome=nano".to_string()], false)
            .unwrap_err();
        assert!(matches!(err, SessionError::HeaderKeyInvalid(_)));
        assert_eq!(session.headers(), before.as_slice());

        let err = session
            .add_headers(&["sh!nonome=nano".to_string()], true)
            .unwrap_err();
        assert!(matches!(err, SessionError::HeaderKeyInvalid(_)));
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let mut session = Session::new();
        session
            .add_headers(&["mizore=yoroizuka".to_string()], false)
            .unwrap();
        let snapshot = session.headers_for_call();
        session.add_headers(&["mizore".to_string()], false).unwrap();
        assert!(snapshot.iter().any(|(k, _)| k == "mizore"));
        assert!(session.headers_for_call().iter().all(|(k, _)| k != "mizore"));
    }
}
