//! Same-origin proxy rewriting for object-storage URLs.
//!
//! Result URLs handed to browser clients must never expose the raw storage
//! origin (cross-origin and credential-hiding requirement). The rewriter
//! turns `<storage_base>/<key>` into `/api/storage/<kind>/<key>` and leaves
//! everything else alone, so applying it twice is the same as applying it
//! once.

/// URL path prefix under which the API serves proxied storage objects.
pub const PROXY_PREFIX: &str = "/api/storage";

/// What kind of object a proxied URL points at. Becomes the path segment
/// after [`PROXY_PREFIX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Image,
    Model,
    Preview,
    Gcode,
}

impl ProxyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyKind::Image => "image",
            ProxyKind::Model => "model",
            ProxyKind::Preview => "preview",
            ProxyKind::Gcode => "gcode",
        }
    }
}

/// Rewrites storage URLs to same-origin proxy paths.
#[derive(Debug, Clone)]
pub struct ProxyRewriter {
    /// Public base of the object store, e.g. `https://s3.example.com/meshgen`.
    /// Stored without a trailing slash.
    storage_base: String,
}

impl ProxyRewriter {
    pub fn new(storage_base: impl Into<String>) -> Self {
        let mut storage_base = storage_base.into();
        while storage_base.ends_with('/') {
            storage_base.pop();
        }
        Self { storage_base }
    }

    /// Rewrite `url` to its proxied form.
    ///
    /// Already-proxied URLs and URLs outside the configured storage base
    /// pass through unchanged, which makes the function idempotent.
    pub fn to_proxy_url(&self, url: &str, kind: ProxyKind) -> String {
        if url.starts_with(PROXY_PREFIX) {
            return url.to_string();
        }
        match url.strip_prefix(&self.storage_base) {
            Some(key) => {
                let key = key.trim_start_matches('/');
                format!("{}/{}/{}", PROXY_PREFIX, kind.as_str(), key)
            }
            None => url.to_string(),
        }
    }

    /// Recover the storage object key from a URL in either form.
    ///
    /// Returns `None` for URLs that belong to neither the storage base nor
    /// the proxy prefix.
    pub fn object_key(&self, url: &str) -> Option<String> {
        if let Some(rest) = url.strip_prefix(PROXY_PREFIX) {
            // Skip the kind segment.
            let rest = rest.trim_start_matches('/');
            return rest.split_once('/').map(|(_, key)| key.to_string());
        }
        url.strip_prefix(&self.storage_base)
            .map(|key| key.trim_start_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> ProxyRewriter {
        ProxyRewriter::new("https://s3.example.com/meshgen/")
    }

    #[test]
    fn rewrites_storage_urls() {
        let out = rewriter().to_proxy_url(
            "https://s3.example.com/meshgen/models/42/model.obj",
            ProxyKind::Model,
        );
        assert_eq!(out, "/api/storage/model/models/42/model.obj");
    }

    #[test]
    fn is_idempotent() {
        let r = rewriter();
        let once = r.to_proxy_url(
            "https://s3.example.com/meshgen/images/7.png",
            ProxyKind::Image,
        );
        let twice = r.to_proxy_url(&once, ProxyKind::Image);
        assert_eq!(once, twice);
    }

    #[test]
    fn foreign_urls_pass_through() {
        let r = rewriter();
        let url = "https://upstream-vendor.example/files/model.zip";
        assert_eq!(r.to_proxy_url(url, ProxyKind::Model), url);
    }

    #[test]
    fn recovers_object_key_from_both_forms() {
        let r = rewriter();
        assert_eq!(
            r.object_key("https://s3.example.com/meshgen/previews/9.png"),
            Some("previews/9.png".to_string())
        );
        assert_eq!(
            r.object_key("/api/storage/preview/previews/9.png"),
            Some("previews/9.png".to_string())
        );
        assert_eq!(r.object_key("https://elsewhere.example/x"), None);
    }
}
