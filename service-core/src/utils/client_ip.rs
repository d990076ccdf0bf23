use axum::{extract::ConnectInfo, http::HeaderMap, http::Request};
use std::net::{IpAddr, SocketAddr};

/// Raw client address as reported by the edge: first `x-forwarded-for` hop,
/// then `x-real-ip`. The value is not parsed; callers decide what an
/// unparseable address means.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Client address from forwarding headers, falling back to the socket peer.
pub fn client_ip<B>(request: &Request<B>) -> Option<String> {
    forwarded_ip(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

/// Client address when `trusted_hops` proxies each append their peer to
/// `x-forwarded-for`. Entries left of those are client supplied and ignored.
/// Zero trusted hops behaves like [`client_ip`].
pub fn client_ip_behind_proxies<B>(request: &Request<B>, trusted_hops: usize) -> Option<String> {
    if trusted_hops == 0 {
        return client_ip(request);
    }

    let hops: Vec<&str> = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match hops.len().checked_sub(trusted_hops) {
        Some(index) => Some(hops[index].to_string()),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}

/// Parsed variant of [`client_ip`].
pub fn client_ip_addr<B>(request: &Request<B>) -> Option<IpAddr> {
    client_ip(request).and_then(|ip| ip.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn prefers_first_forwarded_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let req = Request::builder()
            .header("x-real-ip", "198.51.100.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req).as_deref(), Some("198.51.100.1"));

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_ip(&req).as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn trusted_hops_skip_client_supplied_entries() {
        let req = Request::builder()
            .header("x-forwarded-for", "198.51.100.10, 203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip_behind_proxies(&req, 0).as_deref(), Some("198.51.100.10"));
        assert_eq!(client_ip_behind_proxies(&req, 1).as_deref(), Some("10.0.0.1"));
        assert_eq!(client_ip_behind_proxies(&req, 2).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn short_forwarded_chain_falls_back_to_peer() {
        let mut req = Request::builder()
            .header("x-forwarded-for", "198.51.100.10")
            .header("x-real-ip", "198.51.100.10")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip_behind_proxies(&req, 2), None);

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip_behind_proxies(&req, 2).as_deref(), Some("192.0.2.1"));
    }
}
