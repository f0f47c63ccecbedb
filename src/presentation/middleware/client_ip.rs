use axum::extract::{ConnectInfo, Request};
use std::net::{IpAddr, SocketAddr};

/// Extract the client IP address for logging and rate limiting.
///
/// Precedence: first entry of `x-forwarded-for`, then `x-real-ip`, then the
/// transport peer address (port dropped). The forwarded headers are
/// advisory trust only; deployments that cannot trust their edge should
/// strip them upstream.
pub fn extract_client_ip(request: &Request) -> IpAddr {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    if let Some(ConnectInfo(socket_addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return socket_addr.ip();
    }

    IpAddr::from([127, 0, 0, 1])
}
