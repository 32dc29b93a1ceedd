//! Explicit route descriptors: each handler declares its method, path
//! template, and schemas up front; dispatch is a table lookup that fails
//! closed on an unknown route. Path captures are an ordered vector of
//! typed values — arity is data, not a family of generic handler types.

use axum::http::Method;

/// One segment of a route's path template. `{any...}` is only legal as
/// the final segment; reuses the same placeholder grammar as policy
/// actions but is deliberately a separate, minimal parser — this layer
/// captures ordered path *values* for a handler, it does not decide
/// authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateSegment {
    Literal(String),
    Capture,
    OpenEnd,
}

fn parse_template(path: &str) -> Vec<TemplateSegment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if segment == "{any...}" {
                TemplateSegment::OpenEnd
            } else if segment.starts_with('{') && segment.ends_with('}') {
                TemplateSegment::Capture
            } else {
                TemplateSegment::Literal(segment.to_string())
            }
        })
        .collect()
}

pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
    segments: Vec<TemplateSegment>,
    pub input_schema: Option<schemars::Schema>,
    pub output_schema: Option<schemars::Schema>,
}

impl RouteDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let segments = parse_template(&path);
        Self {
            method,
            path,
            segments,
            input_schema: None,
            output_schema: None,
        }
    }

    pub fn with_input<I: schemars::JsonSchema>(mut self) -> Self {
        self.input_schema = Some(schemars::schema_for!(I));
        self
    }

    pub fn with_output<O: schemars::JsonSchema>(mut self) -> Self {
        self.output_schema = Some(schemars::schema_for!(O));
        self
    }

    fn matches(&self, request_segments: &[&str]) -> Option<Vec<String>> {
        let mut captures = Vec::new();
        let mut request = request_segments.iter();

        for template in &self.segments {
            match template {
                TemplateSegment::Literal(expected) => match request.next() {
                    Some(actual) if actual == expected => {}
                    _ => return None,
                },
                TemplateSegment::Capture => match request.next() {
                    Some(actual) => captures.push(actual.to_string()),
                    None => return None,
                },
                TemplateSegment::OpenEnd => {
                    captures.push(request.clone().copied().collect::<Vec<_>>().join("/"));
                    return Some(captures);
                }
            }
        }

        if request.next().is_some() {
            None
        } else {
            Some(captures)
        }
    }
}

/// A table of registered routes, searched in registration order.
/// Registering two descriptors with the same method and path template is
/// a construction-time mistake and panics immediately.
pub struct RouteTable(Vec<RouteDescriptor>);

impl RouteTable {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn register(mut self, descriptor: RouteDescriptor) -> Self {
        if self.0.iter().any(|d| d.method == descriptor.method && d.path == descriptor.path) {
            panic!("a route for {} {} is already registered", descriptor.method, descriptor.path);
        }
        self.0.push(descriptor);
        self
    }

    /// Returns the first matching descriptor and the ordered path
    /// captures, or `None` if no route matches (fail closed).
    pub fn resolve(&self, method: &Method, path: &str) -> Option<(&RouteDescriptor, Vec<String>)> {
        let request_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.0
            .iter()
            .filter(|d| &d.method == method)
            .find_map(|d| d.matches(&request_segments).map(|captures| (d, captures)))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segments_must_match_exactly() {
        let table = RouteTable::new().register(RouteDescriptor::new(Method::GET, "/a/b"));
        assert!(table.resolve(&Method::GET, "/a/b").is_some());
        assert!(table.resolve(&Method::GET, "/a/c").is_none());
    }

    #[test]
    fn capture_segments_bind_ordered_values() {
        let table = RouteTable::new().register(RouteDescriptor::new(Method::GET, "/a/{tenant}/b/{id}"));
        let (_descriptor, captures) = table.resolve(&Method::GET, "/a/t1/b/m1").unwrap();
        assert_eq!(captures, vec!["t1".to_string(), "m1".to_string()]);
    }

    #[test]
    fn open_end_captures_the_remainder_joined_by_slash() {
        let table = RouteTable::new().register(RouteDescriptor::new(Method::GET, "/a/{any...}"));
        let (_descriptor, captures) = table.resolve(&Method::GET, "/a/b/c/d").unwrap();
        assert_eq!(captures, vec!["b/c/d".to_string()]);
    }

    #[test]
    fn unknown_route_resolves_to_none() {
        let table = RouteTable::new().register(RouteDescriptor::new(Method::GET, "/a"));
        assert!(table.resolve(&Method::POST, "/a").is_none());
        assert!(table.resolve(&Method::GET, "/z").is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        RouteTable::new()
            .register(RouteDescriptor::new(Method::GET, "/a"))
            .register(RouteDescriptor::new(Method::GET, "/a"));
    }
}
