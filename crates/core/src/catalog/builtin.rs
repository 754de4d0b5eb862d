use crate::model::ApiFamily::{self, CSocket, ObjcFoundation, SwiftNetwork, TlsLibrary};
use crate::model::NetworkCategory::{
    self, DnsResolution, HttpClient, SocketRaw, TlsHandshake, UnknownNetworkApi, WebSocket,
};
use crate::model::SocketTransport::{self, Tcp, Udp};
use crate::model::SymbolSignature;

/// Version tag of the built-in table. Bump on any change to `BUILTIN`.
pub const BUILTIN_CATALOG_VERSION: &str = "2025.1";

type Row = (&'static str, NetworkCategory, ApiFamily, f64, Option<SocketTransport>);

#[rustfmt::skip]
const BUILTIN: &[Row] = &[
    // BSD sockets
    ("socket",              SocketRaw, CSocket, 0.90, None),
    ("socketpair",          SocketRaw, CSocket, 0.50, None),
    ("connect",             SocketRaw, CSocket, 0.90, None),
    ("bind",                SocketRaw, CSocket, 0.80, None),
    ("listen",              SocketRaw, CSocket, 0.85, Some(Tcp)),
    ("accept",              SocketRaw, CSocket, 0.85, Some(Tcp)),
    ("accept4",             SocketRaw, CSocket, 0.85, Some(Tcp)),
    ("send",                SocketRaw, CSocket, 0.85, None),
    ("recv",                SocketRaw, CSocket, 0.85, None),
    ("sendto",              SocketRaw, CSocket, 0.85, Some(Udp)),
    ("recvfrom",            SocketRaw, CSocket, 0.85, Some(Udp)),
    ("sendmsg",             SocketRaw, CSocket, 0.80, None),
    ("recvmsg",             SocketRaw, CSocket, 0.80, None),
    ("setsockopt",          SocketRaw, CSocket, 0.60, None),
    ("getsockopt",          SocketRaw, CSocket, 0.60, None),
    ("getpeername",         SocketRaw, CSocket, 0.60, None),
    ("getsockname",         SocketRaw, CSocket, 0.60, None),
    ("inet_pton",           SocketRaw, CSocket, 0.50, None),
    ("inet_ntop",           SocketRaw, CSocket, 0.50, None),
    ("inet_addr",           SocketRaw, CSocket, 0.50, None),
    ("htons",               SocketRaw, CSocket, 0.30, None),
    ("ntohs",               SocketRaw, CSocket, 0.30, None),
    // libc / libresolv resolvers
    ("getaddrinfo",         DnsResolution, CSocket, 0.90, None),
    ("freeaddrinfo",        DnsResolution, CSocket, 0.60, None),
    ("gethostbyname",       DnsResolution, CSocket, 0.90, None),
    ("gethostbyname2",      DnsResolution, CSocket, 0.90, None),
    ("gethostbyaddr",       DnsResolution, CSocket, 0.80, None),
    ("getnameinfo",         DnsResolution, CSocket, 0.70, None),
    ("res_query",           DnsResolution, CSocket, 0.85, None),
    ("res_search",          DnsResolution, CSocket, 0.85, None),
    ("DNSServiceQueryRecord", DnsResolution, CSocket, 0.85, None),
    // libcurl; as CSocket family these also back SocketRaw.
    ("curl_easy_init",      HttpClient, CSocket, 0.80, None),
    ("curl_easy_perform",   HttpClient, CSocket, 0.90, None),
    ("curl_easy_setopt",    HttpClient, CSocket, 0.70, None),
    // Foundation / CFNetwork
    ("NSURLSession",        HttpClient, ObjcFoundation, 0.90, None),
    ("NSURLConnection",     HttpClient, ObjcFoundation, 0.90, None),
    ("NSURLRequest",        HttpClient, ObjcFoundation, 0.70, None),
    ("NSMutableURLRequest", HttpClient, ObjcFoundation, 0.75, None),
    ("CFHTTPMessageCreateRequest",       HttpClient, ObjcFoundation, 0.85, None),
    ("CFReadStreamCreateForHTTPRequest", HttpClient, ObjcFoundation, 0.85, None),
    ("CFURLCreateWithString",            HttpClient, ObjcFoundation, 0.50, None),
    ("NSURLSessionWebSocketTask",        WebSocket,  ObjcFoundation, 0.90, None),
    ("CFSocketCreate",                   SocketRaw,  ObjcFoundation, 0.85, None),
    ("CFSocketConnectToAddress",         SocketRaw,  ObjcFoundation, 0.85, None),
    ("CFStreamCreatePairWithSocketToHost", SocketRaw, ObjcFoundation, 0.85, Some(Tcp)),
    ("NSStream",            SocketRaw, ObjcFoundation, 0.50, None),
    ("NSInputStream",       SocketRaw, ObjcFoundation, 0.40, None),
    ("NSOutputStream",      SocketRaw, ObjcFoundation, 0.40, None),
    ("CFHostCreateWithName",      DnsResolution, ObjcFoundation, 0.80, None),
    ("CFHostStartInfoResolution", DnsResolution, ObjcFoundation, 0.90, None),
    ("SCNetworkReachabilityCreateWithName", UnknownNetworkApi, ObjcFoundation, 0.50, None),
    ("SCNetworkReachabilityGetFlags",       UnknownNetworkApi, ObjcFoundation, 0.40, None),
    // Swift Foundation / Network.framework
    ("URLSession",               HttpClient, SwiftNetwork, 0.90, None),
    ("URLRequest",               HttpClient, SwiftNetwork, 0.70, None),
    ("URLSessionWebSocketTask",  WebSocket,  SwiftNetwork, 0.90, None),
    ("NWProtocolWebSocket",      WebSocket,  SwiftNetwork, 0.90, None),
    ("NWConnection",             SocketRaw,  SwiftNetwork, 0.85, None),
    ("NWListener",               SocketRaw,  SwiftNetwork, 0.85, None),
    ("NWEndpoint",               SocketRaw,  SwiftNetwork, 0.60, None),
    ("nw_connection_create",     SocketRaw,  SwiftNetwork, 0.85, None),
    ("nw_listener_create",       SocketRaw,  SwiftNetwork, 0.85, None),
    ("nw_parameters_create_secure_tcp", SocketRaw, SwiftNetwork, 0.80, Some(Tcp)),
    ("nw_parameters_create_secure_udp", SocketRaw, SwiftNetwork, 0.80, Some(Udp)),
    // SecureTransport / Security / OpenSSL / BoringSSL
    ("SSLHandshake",          TlsHandshake, TlsLibrary, 0.95, None),
    ("SSLCreateContext",      TlsHandshake, TlsLibrary, 0.90, None),
    ("SSLSetIOFuncs",         TlsHandshake, TlsLibrary, 0.85, None),
    ("SSLRead",               TlsHandshake, TlsLibrary, 0.85, None),
    ("SSLWrite",              TlsHandshake, TlsLibrary, 0.85, None),
    ("SSL_connect",           TlsHandshake, TlsLibrary, 0.95, None),
    ("SSL_accept",            TlsHandshake, TlsLibrary, 0.95, None),
    ("SSL_read",              TlsHandshake, TlsLibrary, 0.85, None),
    ("SSL_write",             TlsHandshake, TlsLibrary, 0.85, None),
    ("SSL_CTX_new",           TlsHandshake, TlsLibrary, 0.90, None),
    ("SSL_new",               TlsHandshake, TlsLibrary, 0.85, None),
    ("TLS_client_method",     TlsHandshake, TlsLibrary, 0.90, None),
    ("SSLv23_client_method",  TlsHandshake, TlsLibrary, 0.90, None),
    ("SecTrustEvaluate",          TlsHandshake, TlsLibrary, 0.70, None),
    ("SecTrustEvaluateWithError", TlsHandshake, TlsLibrary, 0.70, None),
    ("sec_protocol_options_set_verify_block", TlsHandshake, TlsLibrary, 0.80, None),
    ("nw_tls_create_options",     TlsHandshake, TlsLibrary, 0.85, None),
];

/// Built-in signatures in registration order.
pub fn builtin_signatures() -> impl Iterator<Item = SymbolSignature> {
    BUILTIN.iter().map(|(symbol, category, family, confidence, transport)| SymbolSignature {
        symbol: (*symbol).to_string(),
        category: *category,
        family: *family,
        confidence: *confidence,
        transport: *transport,
    })
}
