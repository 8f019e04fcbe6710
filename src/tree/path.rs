use url::Url;

/// A resource location split into the levels of the scope tree.
///
/// The first level is the origin (`scheme://host[:port]`), each following
/// level is one non-empty path segment. Queries and fragments are not part
/// of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    origin: String,
    segments: Vec<String>,
}

impl ResourcePath {
    pub fn parse(uri: &str) -> Result<Self, String> {
        let url = Url::parse(uri).map_err(|e| format!("unparseable uri '{}': {}", uri, e))?;
        let host = url
            .host_str()
            .ok_or_else(|| format!("uri '{}' has no host", uri))?;

        let origin = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let segments = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self { origin, segments })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Hierarchic name of the deepest node this path resolves to.
    pub fn hierarchic_name(&self) -> String {
        let mut name = self.origin.clone();
        for seg in &self.segments {
            name.push('/');
            name.push_str(seg);
        }
        name
    }
}
