//! Squid access-log parser for Frontier request lines.
//!
//! One record per line, no cross-line correlation and no windowing. The
//! access log format is
//!
//! ```text
//! <ip> <ident> <user> [<local time>] "<method> <url> HTTP/<ver>" \
//!     <status> <size> <req-status>:<hierarchy> <resp-msecs> \
//!     "<X-Frontier-Id>" "<If-Modified-Since>"
//! ```
//!
//! The URL is dissected into server, servlet, query name and query string;
//! the `X-Frontier-Id` header into software release/version and, when
//! present, process id, user id and user DN.

use crate::util::time::now_usecs;

/// One parsed squid access-log line.
#[derive(Debug, Clone, PartialEq)]
pub struct SquidRecord {
    /// Wall clock at ingestion, microseconds.
    pub timestamp_usecs: i64,
    pub client_ip: String,
    pub user_ident: String,
    pub user_name: String,
    pub method: String,
    pub server: String,
    pub servlet: String,
    pub query_name: String,
    pub query: String,
    pub proto_version: String,
    pub code: u32,
    pub size: u64,
    pub req_status: String,
    pub hierarchy_status: String,
    pub resp_time_msecs: u64,
    pub fid_sw_release: String,
    pub fid_sw_version: String,
    pub fid_pid: Option<String>,
    pub fid_uid: Option<String>,
    pub fid_userdn: Option<String>,
    pub if_modified_since: Option<String>,
}

/// Parses one access-log line. Returns `None` when the line does not fit
/// the format; the caller reports and moves on.
pub fn parse_line(line: &str) -> Option<SquidRecord> {
    let line = line.trim();

    let (client_ip, rest) = next_token(line)?;
    let (user_ident, rest) = next_token(rest)?;
    let (user_name, rest) = next_token(rest)?;

    // Bracketed local time; the ingestion clock is used instead.
    let rest = rest.strip_prefix('[')?;
    let (_local_time, rest) = rest.split_once("] ")?;

    let rest = rest.strip_prefix('"')?;
    let (request, rest) = rest.split_once('"')?;
    let (method, url, proto_version) = split_request(request)?;
    let (server, servlet, query_name, query) = dissect_url(url)?;

    let rest = rest.strip_prefix(' ')?;
    let (code, rest) = next_token(rest)?;
    let code = code.parse().ok()?;
    let (size, rest) = next_token(rest)?;
    let size = size.parse().ok()?;

    let (status_pair, rest) = next_token(rest)?;
    let (req_status, hierarchy_status) = status_pair.split_once(':')?;
    if req_status.is_empty() || hierarchy_status.is_empty() {
        return None;
    }

    let (resp_time, rest) = next_token(rest)?;
    let resp_time_msecs = resp_time.parse().ok()?;

    let rest = rest.strip_prefix('"')?;
    let (frontier_id, rest) = rest.split_once('"')?;
    let (fid_sw_release, fid_sw_version, fid_pid, fid_uid, fid_userdn) =
        split_frontier_id_header(frontier_id)?;

    let rest = rest.strip_prefix(' ')?;
    let rest = rest.strip_prefix('"')?;
    let (ims, rest) = rest.split_once('"')?;
    if !rest.is_empty() {
        return None;
    }

    Some(SquidRecord {
        timestamp_usecs: now_usecs(),
        client_ip: client_ip.to_string(),
        user_ident: user_ident.to_string(),
        user_name: user_name.to_string(),
        method: method.to_string(),
        server,
        servlet,
        query_name,
        query,
        proto_version: proto_version.to_string(),
        code,
        size,
        req_status: req_status.to_string(),
        hierarchy_status: hierarchy_status.to_string(),
        resp_time_msecs,
        fid_sw_release,
        fid_sw_version,
        fid_pid,
        fid_uid,
        fid_userdn,
        if_modified_since: if ims.is_empty() {
            None
        } else {
            Some(ims.to_string())
        },
    })
}

/// Takes the next space-delimited token. Fails on an empty token.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let (token, rest) = s.split_once(' ')?;
    if token.is_empty() {
        return None;
    }
    Some((token, rest))
}

/// Splits the quoted request into method, URL and protocol version.
fn split_request(request: &str) -> Option<(&str, &str, &str)> {
    let (method, rest) = request.split_once(' ')?;
    let (url, proto) = rest.rsplit_once(' ')?;
    let version = proto.strip_prefix("HTTP/")?;
    if method.is_empty() || url.is_empty() || version.is_empty() {
        return None;
    }
    Some((method, url, version))
}

/// Dissects `scheme://server/servlet/query_name[/?]query`.
fn dissect_url(url: &str) -> Option<(String, String, String, String)> {
    let slash = url.find('/')?;
    let scheme = &url[..slash];
    if scheme.is_empty() {
        return None;
    }
    let rest = url[slash..].trim_start_matches('/');

    let (server, rest) = rest.split_once('/')?;
    let (servlet, rest) = rest.split_once('/')?;
    let boundary = rest.find(['/', '?'])?;
    let query_name = &rest[..boundary];
    let query = &rest[boundary + 1..];

    if server.is_empty() || servlet.is_empty() || query_name.is_empty() || query.is_empty() {
        return None;
    }
    Some((
        server.to_string(),
        servlet.to_string(),
        query_name.to_string(),
        query.to_string(),
    ))
}

/// Splits the `X-Frontier-Id` header: release and version are required;
/// process id, user id and the remaining user DN are optional.
fn split_frontier_id_header(
    header: &str,
) -> Option<(String, String, Option<String>, Option<String>, Option<String>)> {
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }

    let release = parts[0].to_string();
    let version = parts[1].to_string();
    let pid = parts.get(2).map(|p| p.to_string());
    let uid = parts.get(3).map(|p| p.to_string());
    let userdn = if parts.len() > 4 {
        Some(parts[4..].join(" "))
    } else {
        None
    };

    Some((release, version, pid, uid, userdn))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "128.146.38.254 - - [05/Aug/2013:19:34:35 +0200] \"GET http://cmsfrontier.cern.ch:8000/FrontierProd/Frontier?type=frontier_request:1:DEFAULT&encoding=BLOBzip5&p1=abc HTTP/1.0\" 200 8192 TCP_MISS:DIRECT 53 \"CMSSW_5_3_8 2.8.5 5258 puigh(524) Darren Puigh\" \"-\"";

    #[test]
    fn parses_a_full_line() {
        let record = parse_line(LINE).unwrap();
        assert_eq!(record.client_ip, "128.146.38.254");
        assert_eq!(record.user_ident, "-");
        assert_eq!(record.user_name, "-");
        assert_eq!(record.method, "GET");
        assert_eq!(record.server, "cmsfrontier.cern.ch:8000");
        assert_eq!(record.servlet, "FrontierProd");
        assert_eq!(record.query_name, "Frontier");
        assert_eq!(
            record.query,
            "type=frontier_request:1:DEFAULT&encoding=BLOBzip5&p1=abc"
        );
        assert_eq!(record.proto_version, "1.0");
        assert_eq!(record.code, 200);
        assert_eq!(record.size, 8192);
        assert_eq!(record.req_status, "TCP_MISS");
        assert_eq!(record.hierarchy_status, "DIRECT");
        assert_eq!(record.resp_time_msecs, 53);
        assert_eq!(record.fid_sw_release, "CMSSW_5_3_8");
        assert_eq!(record.fid_sw_version, "2.8.5");
        assert_eq!(record.fid_pid.as_deref(), Some("5258"));
        assert_eq!(record.fid_uid.as_deref(), Some("puigh(524)"));
        assert_eq!(record.fid_userdn.as_deref(), Some("Darren Puigh"));
        assert_eq!(record.if_modified_since.as_deref(), Some("-"));
        assert!(record.timestamp_usecs > 0);
    }

    #[test]
    fn short_frontier_id_leaves_optionals_empty() {
        let line = "10.0.0.1 - - [05/Aug/2013:19:34:35 +0200] \"GET http://host:8000/FrontierProd/Frontier?type=x HTTP/1.1\" 200 10 TCP_HIT:NONE 1 \"CMSSW_7_1_0 2.8.5\" \"\"";
        let record = parse_line(line).unwrap();
        assert_eq!(record.fid_sw_release, "CMSSW_7_1_0");
        assert_eq!(record.fid_pid, None);
        assert_eq!(record.fid_uid, None);
        assert_eq!(record.fid_userdn, None);
        assert_eq!(record.if_modified_since, None);
    }

    #[test]
    fn url_with_slash_before_query_dissects() {
        let line = "10.0.0.1 - - [05/Aug/2013:19:34:35 +0200] \"GET http://host:8000/smallfiles/Frontier/type=file HTTP/1.0\" 200 10 TCP_MISS:DIRECT 1 \"CMSSW_7_1_0 2.8.5\" \"\"";
        let record = parse_line(line).unwrap();
        assert_eq!(record.servlet, "smallfiles");
        assert_eq!(record.query_name, "Frontier");
        assert_eq!(record.query, "type=file");
    }

    #[test]
    fn rejects_lines_that_do_not_fit() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("not an access log line"), None);
        // Missing the frontier-id version token.
        let line = "10.0.0.1 - - [05/Aug/2013:19:34:35 +0200] \"GET http://host:8000/FrontierProd/Frontier?type=x HTTP/1.0\" 200 10 TCP_MISS:DIRECT 1 \"CMSSW_7_1_0\" \"\"";
        assert_eq!(parse_line(line), None);
        // Non-numeric status code.
        let line = "10.0.0.1 - - [05/Aug/2013:19:34:35 +0200] \"GET http://host:8000/FrontierProd/Frontier?type=x HTTP/1.0\" OK 10 TCP_MISS:DIRECT 1 \"CMSSW_7_1_0 2.8.5\" \"\"";
        assert_eq!(parse_line(line), None);
    }

    #[test]
    fn rejects_url_without_servlet_path() {
        let line = "10.0.0.1 - - [05/Aug/2013:19:34:35 +0200] \"GET http://host:8000/ping HTTP/1.0\" 200 10 TCP_MISS:DIRECT 1 \"CMSSW_7_1_0 2.8.5\" \"\"";
        assert_eq!(parse_line(line), None);
    }
}
