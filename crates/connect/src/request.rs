//! Logical and signed request representations for REST dispatch.

use hermes_core::VenueId;

/// HTTP method of a REST call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Whether an endpoint requires request signing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Public,
    Private,
}

/// A logical REST call before signing. Created per call, consumed once.
///
/// Path construction and parameter naming are the venue glue's job;
/// the core only carries them to the signer and transport.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub venue: VenueId,
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub auth: AuthKind,
}

impl RequestDescriptor {
    pub fn public(venue: impl Into<VenueId>, method: HttpMethod, path: impl Into<String>) -> Self {
        RequestDescriptor {
            venue: venue.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: AuthKind::Public,
        }
    }

    pub fn private(venue: impl Into<VenueId>, method: HttpMethod, path: impl Into<String>) -> Self {
        RequestDescriptor {
            auth: AuthKind::Private,
            ..RequestDescriptor::public(venue, method, path)
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_private(&self) -> bool {
        self.auth == AuthKind::Private
    }
}

/// A fully signed request, valid for a single dispatch attempt
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}
